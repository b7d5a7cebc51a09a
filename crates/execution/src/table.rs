//! Load/store seams between execution and the storage substrate.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use flowq_common::Result;

use crate::exec_node::ExecNode;

/// Resolves `LOAD` sources to scan nodes.
pub trait TableSource: Send + Sync {
    /// Scan node over the raw rows of `name`.
    ///
    /// # Errors
    /// Returns an error when `name` is not registered.
    fn scan(&self, name: &str) -> Result<Arc<dyn ExecNode>>;
}

/// Accepts `STORE` outputs.
pub trait TableSink: Send + Sync {
    /// Replace the contents of `name` with `batches`; returns rows written.
    fn write(&self, name: &str, schema: SchemaRef, batches: &[RecordBatch]) -> Result<u64>;
}
