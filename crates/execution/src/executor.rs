//! Physical plan evaluation.
//!
//! Operators materialize their output as a list of batches. Per-record
//! operators (filter, projection) split their input into
//! `task_parallelism` row ranges and run one tokio task per range; every task
//! compiles its expressions against the same frozen scalar bindings, and
//! results are reassembled in input order.

use std::sync::Arc;
use std::time::Instant;

use arrow::array::{Array, ArrayRef, BooleanArray};
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use arrow_schema::{Field, Schema, SchemaRef};
use flowq_common::{FlowqError, Result, SideInputId};
use flowq_planner::{Expr, PhysicalPlan, ScanExec};
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info_span, Instrument};

use crate::aggregate::run_hash_aggregate;
use crate::context::SharedTaskContext;
use crate::expressions::{cast_value, compile_expr};
use crate::join::run_hash_join;
use crate::scalar_broadcast::ScalarBindings;
use crate::stream::collect_stream;

/// Materialized operator output.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Schema of every batch.
    pub schema: SchemaRef,
    /// Output batches in order.
    pub batches: Vec<RecordBatch>,
}

impl ExecOutput {
    /// Total row count.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }
}

/// Evaluate `plan` with the scalar bindings of enclosing broadcasts.
///
/// A `ScalarBroadcast` waits until each of its side inputs reached a terminal
/// state before its input subtree starts; a failed side input fails the
/// subtree without running it.
pub fn execute_plan<'a>(
    plan: &'a PhysicalPlan,
    ctx: &'a SharedTaskContext,
    bindings: &'a ScalarBindings,
) -> BoxFuture<'a, Result<ExecOutput>> {
    let span = info_span!(
        "operator_execute",
        query_id = %ctx.query_id,
        operator = plan.name()
    );
    async move {
        let started = Instant::now();
        let out = match plan {
            PhysicalPlan::Scan(scan) => run_scan(scan, ctx).await?,

            PhysicalPlan::Filter(filter) => {
                let child = execute_plan(&filter.input, ctx, bindings).await?;
                let predicate = filter.predicate.clone();
                run_partitioned(ctx, child, bindings, move |batch, bindings| {
                    apply_filter(&predicate, batch, bindings)
                })
                .await?
            }

            PhysicalPlan::Project(project) => {
                let child = execute_plan(&project.input, ctx, bindings).await?;
                let schema = projection_schema(&project.exprs, &child.schema, bindings)?;
                let exprs = project.exprs.clone();
                let out_schema = schema.clone();
                let projected = run_partitioned(ctx, child, bindings, move |batch, bindings| {
                    apply_projection(&exprs, &out_schema, batch, bindings)
                })
                .await?;
                ExecOutput {
                    schema,
                    batches: projected.batches,
                }
            }

            PhysicalPlan::HashAggregate(agg) => {
                let child = execute_plan(&agg.input, ctx, bindings).await?;
                run_hash_aggregate(&child, &agg.group_exprs, &agg.aggr_exprs, bindings)?
            }

            PhysicalPlan::HashJoin(join) => {
                let left = execute_plan(&join.left, ctx, bindings).await?;
                let right = execute_plan(&join.right, ctx, bindings).await?;
                run_hash_join(&left, &right, &join.on, bindings)?
            }

            PhysicalPlan::Limit(limit) => {
                let child = execute_plan(&limit.input, ctx, bindings).await?;
                run_limit(child, limit.n)
            }

            PhysicalPlan::Store(store) => {
                let child = execute_plan(&store.input, ctx, bindings).await?;
                let rows = ctx.sink.write(&store.target, child.schema.clone(), &child.batches)?;
                debug!(sink = %store.target, rows, "stored output");
                child
            }

            PhysicalPlan::ScalarBroadcast(broadcast) => {
                let bound = bind_side_inputs(&broadcast.side_inputs, ctx, bindings).await?;
                execute_plan(&broadcast.input, ctx, &bound).await?
            }
        };
        ctx.metrics.record_operator(
            &ctx.query_id.to_string(),
            plan.name(),
            out.num_rows() as u64,
        );
        debug!(
            operator = plan.name(),
            rows = out.num_rows(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "operator finished"
        );
        Ok(out)
    }
    .instrument(span)
    .boxed()
}

async fn bind_side_inputs(
    ids: &[SideInputId],
    ctx: &SharedTaskContext,
    outer: &ScalarBindings,
) -> Result<ScalarBindings> {
    let mut bound = outer.clone();
    for id in ids {
        let handle = ctx.side_inputs.get(id).ok_or_else(|| {
            FlowqError::Execution(format!("side input {id} has no slot in this execution"))
        })?;
        let binding = handle.resolve().await?;
        debug!(side_input = %id, alias = handle.alias(), "scalar bound for consumer");
        bound = bound.with(*id, binding);
    }
    Ok(bound)
}

async fn run_scan(scan: &ScanExec, ctx: &SharedTaskContext) -> Result<ExecOutput> {
    let node = ctx.source.scan(&scan.source)?;
    let (raw_schema, raw) = collect_stream(node.execute(Arc::clone(ctx))?).await?;
    let Some(declared) = &scan.schema else {
        return Ok(ExecOutput {
            schema: raw_schema,
            batches: raw,
        });
    };
    // Raw columns are cast to the declared types; missing columns read as null.
    let mut batches = Vec::with_capacity(raw.len());
    for batch in raw {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(declared.fields().len());
        for (idx, field) in declared.fields().iter().enumerate() {
            let col = if idx < batch.num_columns() {
                cast_value(batch.column(idx), field.data_type())?
            } else {
                arrow::array::new_null_array(field.data_type(), batch.num_rows())
            };
            columns.push(col);
        }
        let cast = RecordBatch::try_new(declared.clone(), columns).map_err(|e| {
            FlowqError::Execution(format!("scan of '{}' failed: {e}", scan.source))
        })?;
        batches.push(cast);
    }
    Ok(ExecOutput {
        schema: declared.clone(),
        batches,
    })
}

/// Run `op` over `task_parallelism` contiguous row ranges of `input` and
/// concatenate the results in range order.
async fn run_partitioned<F>(
    ctx: &SharedTaskContext,
    input: ExecOutput,
    bindings: &ScalarBindings,
    op: F,
) -> Result<ExecOutput>
where
    F: Fn(&RecordBatch, &ScalarBindings) -> Result<RecordBatch> + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let parts = partition_rows(&input.batches, ctx.task_parallelism);
    let mut tasks = Vec::with_capacity(parts.len());
    for part in parts {
        let op = Arc::clone(&op);
        let bindings = bindings.clone();
        let ctx = Arc::clone(ctx);
        tasks.push(tokio::spawn(async move {
            record_reads(&ctx, &bindings);
            part.iter()
                .map(|batch| op(batch, &bindings))
                .collect::<Result<Vec<_>>>()
        }));
    }
    let mut batches = Vec::new();
    for task in tasks {
        let out = task
            .await
            .map_err(|e| FlowqError::Execution(format!("operator task failed: {e}")))??;
        batches.extend(out);
    }
    Ok(ExecOutput {
        schema: input.schema,
        batches,
    })
}

/// One broadcast read per bound scalar per task.
fn record_reads(ctx: &SharedTaskContext, bindings: &ScalarBindings) {
    let query_id = ctx.query_id.to_string();
    for (id, handle) in ctx.side_inputs.iter() {
        if bindings.get(*id).is_some() {
            ctx.metrics.record_scalar_read(&query_id, handle.alias());
        }
    }
}

/// Split batches into at most `n` contiguous, similarly sized row ranges.
fn partition_rows(batches: &[RecordBatch], n: usize) -> Vec<Vec<RecordBatch>> {
    let total = batches.iter().map(RecordBatch::num_rows).sum::<usize>();
    if total == 0 {
        return vec![Vec::new()];
    }
    let per_part = total.div_ceil(n.max(1));
    let mut parts = Vec::new();
    let mut current = Vec::new();
    let mut filled = 0usize;
    for batch in batches {
        let mut offset = 0usize;
        while offset < batch.num_rows() {
            let take = (per_part - filled).min(batch.num_rows() - offset);
            current.push(batch.slice(offset, take));
            offset += take;
            filled += take;
            if filled == per_part {
                parts.push(std::mem::take(&mut current));
                filled = 0;
            }
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn apply_filter(
    predicate: &Expr,
    batch: &RecordBatch,
    bindings: &ScalarBindings,
) -> Result<RecordBatch> {
    let mask = compile_expr(predicate, batch.schema_ref(), bindings)?.evaluate(batch)?;
    let mask = mask
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| FlowqError::Execution("filter predicate must be boolean".to_string()))?;
    // Null predicate values drop the row.
    filter_record_batch(batch, mask)
        .map_err(|e| FlowqError::Execution(format!("filter batch failed: {e}")))
}

fn projection_schema(
    exprs: &[(Expr, String)],
    input: &SchemaRef,
    bindings: &ScalarBindings,
) -> Result<SchemaRef> {
    let fields = exprs
        .iter()
        .map(|(e, name)| {
            let compiled = compile_expr(e, input, bindings)?;
            Ok(Field::new(name, compiled.data_type(), true))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(Schema::new(fields)))
}

fn apply_projection(
    exprs: &[(Expr, String)],
    out_schema: &SchemaRef,
    batch: &RecordBatch,
    bindings: &ScalarBindings,
) -> Result<RecordBatch> {
    let columns = exprs
        .iter()
        .map(|(e, _)| compile_expr(e, batch.schema_ref(), bindings)?.evaluate(batch))
        .collect::<Result<Vec<_>>>()?;
    RecordBatch::try_new(out_schema.clone(), columns)
        .map_err(|e| FlowqError::Execution(format!("projection batch failed: {e}")))
}

fn run_limit(child: ExecOutput, n: usize) -> ExecOutput {
    let mut remaining = n;
    let mut batches = Vec::new();
    for batch in child.batches {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.num_rows());
        batches.push(batch.slice(0, take));
        remaining -= take;
    }
    ExecOutput {
        schema: child.schema,
        batches,
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::Int64Array;
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;

    use super::partition_rows;

    fn batch(values: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).expect("batch")
    }

    #[test]
    fn partitions_are_contiguous_and_cover_every_row() {
        let parts = partition_rows(&[batch(vec![1, 2, 3]), batch(vec![4, 5])], 2);
        assert_eq!(parts.len(), 2);
        let rows = parts
            .iter()
            .map(|p| p.iter().map(RecordBatch::num_rows).sum::<usize>())
            .collect::<Vec<_>>();
        assert_eq!(rows, vec![3, 2]);

        let single = partition_rows(&[batch(vec![1, 2])], 8);
        assert_eq!(single.len(), 2);
        assert!(partition_rows(&[], 4).len() == 1);
    }
}
