#![deny(missing_docs)]

//! Execution of flowq physical units.
//!
//! Architecture role:
//! - task context, load/store seams and scan node contracts
//! - expression compilation/evaluation, including bound scalar placeholders
//! - per-operator evaluation and the single-row side-input broadcast runtime
//!
//! Key modules:
//! - [`scalar_broadcast`]
//! - [`executor`]
//! - [`runner`]
//! - [`expressions`]

pub mod aggregate;
pub mod context;
pub mod exec_node;
pub mod executor;
pub mod expressions;
pub mod join;
pub mod runner;
pub mod scalar;
pub mod scalar_broadcast;
pub mod stream;
pub mod table;

pub use context::{SharedTaskContext, TaskContext};
pub use exec_node::ExecNode;
pub use executor::{execute_plan, ExecOutput};
pub use expressions::{cast_value, compile_expr, PhysicalExpr};
pub use runner::{execute_unit, OutputResult};
pub use scalar::{scalar_from_array, scalars_to_array, ScalarValue};
pub use scalar_broadcast::{
    side_input_channel, BindFailure, BindFailureReason, ScalarBinding, ScalarBindings,
    SideInputHandle, SideInputState, SideInputWriter,
};
pub use stream::{
    batches_stream, collect_stream, empty_stream, RecordBatchStream, SendableRecordBatchStream,
    StreamAdapter,
};
pub use table::{TableSink, TableSource};
