use flowq_common::{FlowqError, Result};
use tracing::debug;

use crate::logical_plan::LogicalPlan;
use crate::physical_plan::{
    FilterExec, HashAggregateExec, HashJoinExec, LimitExec, OutputPlan, PhysicalPlan,
    PhysicalUnit, ProjectExec, ScalarBroadcastExec, ScanExec, SideInputPlan, StoreExec,
};
use crate::unit::CompiledUnit;

#[derive(Debug, Clone)]
pub struct PhysicalPlannerConfig {
    /// Target row count for batches produced by scans.
    pub batch_size_rows: usize,
}

impl Default for PhysicalPlannerConfig {
    fn default() -> Self {
        Self {
            batch_size_rows: 8192,
        }
    }
}

/// Lower an analyzed logical plan to executable physical operators.
///
/// Contracts:
/// - logical semantics are preserved;
/// - `SideInputs` lowers to a `ScalarBroadcast` barrier over its input;
/// - `Split` branches lower to filters;
/// - `Relation` nodes must have been inlined by analysis.
pub fn create_physical_plan(
    logical: &LogicalPlan,
    cfg: &PhysicalPlannerConfig,
) -> Result<PhysicalPlan> {
    match logical {
        LogicalPlan::Load { source, schema } => Ok(PhysicalPlan::Scan(ScanExec {
            source: source.clone(),
            schema: schema.clone(),
            batch_size_rows: cfg.batch_size_rows,
        })),

        LogicalPlan::Relation { alias } => Err(FlowqError::Planning(format!(
            "relation '{alias}' reached physical planning without being inlined"
        ))),

        LogicalPlan::Filter { predicate, input } | LogicalPlan::Split { predicate, input, .. } => {
            let child = create_physical_plan(input, cfg)?;
            Ok(PhysicalPlan::Filter(FilterExec {
                predicate: predicate.clone(),
                input: Box::new(child),
            }))
        }

        LogicalPlan::Projection { exprs, input } => {
            let child = create_physical_plan(input, cfg)?;
            Ok(PhysicalPlan::Project(ProjectExec {
                exprs: exprs.clone(),
                input: Box::new(child),
            }))
        }

        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => {
            let child = create_physical_plan(input, cfg)?;
            Ok(PhysicalPlan::HashAggregate(HashAggregateExec {
                group_exprs: group_exprs.clone(),
                aggr_exprs: aggr_exprs.clone(),
                input: Box::new(child),
            }))
        }

        LogicalPlan::Join { left, right, on } => {
            let l = create_physical_plan(left, cfg)?;
            let r = create_physical_plan(right, cfg)?;
            Ok(PhysicalPlan::HashJoin(HashJoinExec {
                left: Box::new(l),
                right: Box::new(r),
                on: on.clone(),
            }))
        }

        LogicalPlan::Limit { n, input } => {
            let child = create_physical_plan(input, cfg)?;
            Ok(PhysicalPlan::Limit(LimitExec {
                n: *n,
                input: Box::new(child),
            }))
        }

        LogicalPlan::Store { target, input } => {
            let child = create_physical_plan(input, cfg)?;
            Ok(PhysicalPlan::Store(StoreExec {
                target: target.clone(),
                input: Box::new(child),
            }))
        }

        LogicalPlan::SideInputs { side_inputs, input } => {
            let child = create_physical_plan(input, cfg)?;
            Ok(PhysicalPlan::ScalarBroadcast(ScalarBroadcastExec {
                side_inputs: side_inputs.clone(),
                input: Box::new(child),
            }))
        }
    }
}

/// Lower every side input and statement of a compiled unit.
pub fn create_physical_unit(
    unit: &CompiledUnit,
    cfg: &PhysicalPlannerConfig,
) -> Result<PhysicalUnit> {
    let mut side_inputs = Vec::with_capacity(unit.side_inputs.len());
    for entry in &unit.side_inputs {
        let plan = create_physical_plan(&entry.plan, cfg)?;
        if let Some(bad) = plan.side_inputs().into_iter().find(|dep| *dep >= entry.id) {
            return Err(FlowqError::Planning(format!(
                "side input {} depends on {bad}, which is not registered before it",
                entry.id
            )));
        }
        debug!(side_input = %entry.id, alias = entry.alias(), "planned side input");
        side_inputs.push(SideInputPlan {
            id: entry.id,
            alias: entry.alias().to_string(),
            plan,
            schema: entry.schema.clone(),
            consumers: entry.consumers.clone(),
        });
    }

    let outputs = unit
        .statements
        .iter()
        .map(|stmt| {
            Ok(OutputPlan {
                alias: stmt.alias.clone(),
                target: stmt.target.clone(),
                plan: create_physical_plan(&stmt.plan, cfg)?,
                schema: stmt.schema.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PhysicalUnit {
        side_inputs,
        outputs,
    })
}
