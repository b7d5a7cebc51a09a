//! Execution of one physical unit.
//!
//! Every side input runs once, as its own tokio task, concurrently with the
//! other side inputs and with the outputs. Consumers block at their
//! `ScalarBroadcast` until the slot is terminal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use flowq_common::{FlowqError, Result};
use flowq_planner::{OutputTarget, PhysicalPlan, PhysicalUnit, SideInputPlan};
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};

use crate::context::{SharedTaskContext, TaskContext};
use crate::executor::execute_plan;
use crate::scalar_broadcast::{side_input_channel, ScalarBindings, SideInputWriter};

/// Result of one statement of a unit.
#[derive(Debug, Clone)]
pub struct OutputResult {
    /// Alias of the statement.
    pub alias: String,
    /// Where the rows went.
    pub target: OutputTarget,
    /// Output schema.
    pub schema: SchemaRef,
    /// Rows produced.
    pub rows: u64,
    /// Collected rows; empty for stored outputs.
    pub batches: Vec<RecordBatch>,
}

/// Run `unit` to completion.
///
/// Outputs are independent: all of them run even if one fails, and the first
/// failing output (in statement order) decides the returned error.
pub async fn execute_unit(unit: &PhysicalUnit, ctx: TaskContext) -> Result<Vec<OutputResult>> {
    let started = Instant::now();
    let mut writers = Vec::with_capacity(unit.side_inputs.len());
    let mut handles = HashMap::with_capacity(unit.side_inputs.len());
    for si in &unit.side_inputs {
        let (writer, handle) = side_input_channel(si.id, &si.alias, ctx.max_scalar_row_bytes);
        writers.push((si.clone(), writer));
        handles.insert(si.id, handle);
    }
    let ctx: SharedTaskContext = Arc::new(ctx.with_side_inputs(handles));
    info!(
        query_id = %ctx.query_id,
        side_inputs = unit.side_inputs.len(),
        outputs = unit.outputs.len(),
        "executing unit"
    );

    let mut materializers = JoinSet::new();
    for (si, writer) in writers {
        let ctx = Arc::clone(&ctx);
        let span = info_span!("materialize_side_input", side_input = %si.id, alias = %si.alias);
        materializers.spawn(materialize(si, writer, ctx).instrument(span));
    }

    let mut outputs = Vec::with_capacity(unit.outputs.len());
    for out in &unit.outputs {
        let ctx = Arc::clone(&ctx);
        let plan: PhysicalPlan = out.plan.clone();
        outputs.push(tokio::spawn(async move {
            execute_plan(&plan, &ctx, &ScalarBindings::new()).await
        }));
    }

    let mut results = Vec::with_capacity(outputs.len());
    let mut first_err: Option<FlowqError> = None;
    for (out, task) in unit.outputs.iter().zip(outputs) {
        let res = task
            .await
            .map_err(|e| FlowqError::Execution(format!("output task '{}' failed: {e}", out.alias)))
            .and_then(|r| r);
        match res {
            Ok(exec) => {
                let rows = exec.num_rows() as u64;
                let batches = match out.target {
                    OutputTarget::Collect => exec.batches,
                    OutputTarget::Store(_) => Vec::new(),
                };
                results.push(OutputResult {
                    alias: out.alias.clone(),
                    target: out.target.clone(),
                    schema: exec.schema,
                    rows,
                    batches,
                });
            }
            Err(err) => {
                warn!(query_id = %ctx.query_id, alias = %out.alias, error = %err, "output failed");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }

    // Side inputs nobody waits on any more are cancelled.
    materializers.abort_all();
    while let Some(joined) = materializers.join_next().await {
        if let Err(e) = joined {
            if !e.is_cancelled() {
                warn!(query_id = %ctx.query_id, error = %e, "side input task panicked");
            }
        }
    }

    info!(
        query_id = %ctx.query_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        ok = first_err.is_none(),
        "unit finished"
    );
    match first_err {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

async fn materialize(si: SideInputPlan, writer: SideInputWriter, ctx: SharedTaskContext) {
    let query_id = ctx.query_id.to_string();
    let started = Instant::now();
    writer.begin();
    let outcome = execute_plan(&si.plan, &ctx, &ScalarBindings::new()).await;
    ctx.metrics.record_scalar_materialization(
        &query_id,
        &si.alias,
        started.elapsed().as_secs_f64(),
    );
    match outcome {
        Ok(out) => {
            if let Err(failure) = writer.complete(&out.batches) {
                ctx.metrics
                    .record_scalar_failure(&query_id, &si.alias, failure.reason.label());
            }
        }
        Err(err) => {
            let reason = match err {
                FlowqError::Cancelled { .. } => "upstream",
                _ => "subtree",
            };
            ctx.metrics.record_scalar_failure(&query_id, &si.alias, reason);
            writer.fail(err);
        }
    }
}
