//! Scan node contract.

use arrow_schema::SchemaRef;
use flowq_common::Result;

use crate::context::SharedTaskContext;
use crate::stream::SendableRecordBatchStream;

/// A source operator instance that can produce RecordBatches.
/// Operators are pull-based: the consumer polls the stream.
pub trait ExecNode: Send + Sync {
    /// Operator name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Schema of every batch the stream yields.
    fn schema(&self) -> SchemaRef;

    /// Start producing batches.
    fn execute(&self, ctx: SharedTaskContext) -> Result<SendableRecordBatchStream>;
}
