use std::fmt::Debug;

use flowq_common::Result;
use flowq_execution::{execute_unit, OutputResult, TaskContext};
use flowq_planner::PhysicalUnit;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Runtime = something that can execute a physical unit and report every output.
pub trait Runtime: Send + Sync + Debug {
    fn execute(
        &self,
        unit: PhysicalUnit,
        ctx: TaskContext,
    ) -> BoxFuture<'static, Result<Vec<OutputResult>>>;

    fn shutdown(&self) -> BoxFuture<'static, Result<()>> {
        async { Ok(()) }.boxed()
    }
}

/// Runs side inputs and outputs as tasks on the current tokio runtime.
#[derive(Debug, Default)]
pub struct EmbeddedRuntime;

impl EmbeddedRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl Runtime for EmbeddedRuntime {
    fn execute(
        &self,
        unit: PhysicalUnit,
        ctx: TaskContext,
    ) -> BoxFuture<'static, Result<Vec<OutputResult>>> {
        async move { execute_unit(&unit, ctx).await }.boxed()
    }
}
