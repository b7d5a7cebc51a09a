//! Rewrites scalar references (`alias.field`, `alias.$N`) into placeholders.
//!
//! Each consuming node gains an explicit [`LogicalPlan::SideInputs`] parent so
//! that the scalar subtree is an ordinary data dependency for every planner
//! stage that follows.

use std::collections::HashSet;

use arrow_schema::DataType;
use flowq_common::{FlowqError, Result, SideInputId};
use tracing::debug;

use crate::logical_plan::{Expr, FieldSelector, LogicalPlan, PlaceholderBinding};
use crate::schema_resolver::{is_untyped, RelationSchema, SchemaResolver};

/// What the rewriter needs from the enclosing compilation.
pub trait ScalarBindingContext: SchemaResolver {
    /// Side-input id for `alias` within the current unit, registering it on first use.
    fn bind_side_input(&mut self, alias: &str) -> Result<SideInputId>;
}

/// Replace every [`Expr::ScalarRef`] in `plan` with a typed placeholder.
///
/// Errors:
/// - name selector on a relation without schema, unknown name, or `$N` past the
///   end of a known schema: `UnresolvedScalarField`
/// - [`Expr::RelationRef`]: `ScalarProjectionOnly`
pub fn rewrite_scalar_references(
    plan: LogicalPlan,
    ctx: &mut dyn ScalarBindingContext,
) -> Result<LogicalPlan> {
    let mut used = Vec::new();
    let node = match plan {
        LogicalPlan::Load { .. } | LogicalPlan::Relation { .. } => plan,
        LogicalPlan::Projection { exprs, input } => {
            let input = rewrite_scalar_references(*input, ctx)?;
            let exprs = exprs
                .into_iter()
                .map(|(e, name)| Ok((rewrite_expr(e, ctx, &mut used)?, name)))
                .collect::<Result<Vec<_>>>()?;
            LogicalPlan::Projection {
                exprs,
                input: Box::new(input),
            }
        }
        LogicalPlan::Filter { predicate, input } => {
            let input = rewrite_scalar_references(*input, ctx)?;
            LogicalPlan::Filter {
                predicate: rewrite_expr(predicate, ctx, &mut used)?,
                input: Box::new(input),
            }
        }
        LogicalPlan::Split {
            branch,
            predicate,
            input,
        } => {
            let input = rewrite_scalar_references(*input, ctx)?;
            LogicalPlan::Split {
                branch,
                predicate: rewrite_expr(predicate, ctx, &mut used)?,
                input: Box::new(input),
            }
        }
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => {
            let input = rewrite_scalar_references(*input, ctx)?;
            let group_exprs = group_exprs
                .into_iter()
                .map(|e| rewrite_expr(e, ctx, &mut used))
                .collect::<Result<Vec<_>>>()?;
            let aggr_exprs = aggr_exprs
                .into_iter()
                .map(|(agg, name)| Ok((agg.map_input(|e| rewrite_expr(e, ctx, &mut used))?, name)))
                .collect::<Result<Vec<_>>>()?;
            LogicalPlan::Aggregate {
                group_exprs,
                aggr_exprs,
                input: Box::new(input),
            }
        }
        LogicalPlan::Join { left, right, on } => {
            let left = rewrite_scalar_references(*left, ctx)?;
            let right = rewrite_scalar_references(*right, ctx)?;
            let on = on
                .into_iter()
                .map(|(l, r)| {
                    Ok((
                        rewrite_expr(l, ctx, &mut used)?,
                        rewrite_expr(r, ctx, &mut used)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            LogicalPlan::Join {
                left: Box::new(left),
                right: Box::new(right),
                on,
            }
        }
        LogicalPlan::Limit { n, input } => LogicalPlan::Limit {
            n,
            input: Box::new(rewrite_scalar_references(*input, ctx)?),
        },
        LogicalPlan::Store { target, input } => LogicalPlan::Store {
            target,
            input: Box::new(rewrite_scalar_references(*input, ctx)?),
        },
        LogicalPlan::SideInputs { side_inputs, input } => LogicalPlan::SideInputs {
            side_inputs,
            input: Box::new(rewrite_scalar_references(*input, ctx)?),
        },
    };

    if used.is_empty() {
        return Ok(node);
    }
    used.sort();
    used.dedup();
    Ok(LogicalPlan::SideInputs {
        side_inputs: used,
        input: Box::new(node),
    })
}

fn rewrite_expr(
    expr: Expr,
    ctx: &mut dyn ScalarBindingContext,
    used: &mut Vec<SideInputId>,
) -> Result<Expr> {
    Ok(match expr {
        Expr::ScalarRef { alias, field } => {
            let binding = bind_placeholder(&alias, &field, ctx)?;
            used.push(binding.side_input);
            Expr::Placeholder(binding)
        }
        Expr::RelationRef(alias) => return Err(FlowqError::scalar_projection_only(&alias)),
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: Box::new(rewrite_expr(*left, ctx, used)?),
            op,
            right: Box::new(rewrite_expr(*right, ctx, used)?),
        },
        Expr::Cast { expr, to_type } => Expr::Cast {
            expr: Box::new(rewrite_expr(*expr, ctx, used)?),
            to_type,
        },
        Expr::And(l, r) => Expr::And(
            Box::new(rewrite_expr(*l, ctx, used)?),
            Box::new(rewrite_expr(*r, ctx, used)?),
        ),
        Expr::Or(l, r) => Expr::Or(
            Box::new(rewrite_expr(*l, ctx, used)?),
            Box::new(rewrite_expr(*r, ctx, used)?),
        ),
        Expr::Not(e) => Expr::Not(Box::new(rewrite_expr(*e, ctx, used)?)),
        other @ (Expr::Column(_)
        | Expr::Position(_)
        | Expr::ColumnRef { .. }
        | Expr::Literal(_)
        | Expr::Placeholder(_)) => other,
    })
}

fn bind_placeholder(
    alias: &str,
    field: &FieldSelector,
    ctx: &mut dyn ScalarBindingContext,
) -> Result<PlaceholderBinding> {
    let schema = ctx.relation_schema(alias)?;
    let (index, data_type) = match (field, &schema) {
        (FieldSelector::Name(name), RelationSchema::Unknown) => {
            return Err(FlowqError::unresolved_scalar_field(format!(
                "cannot resolve field '{name}' of scalar '{alias}': relation has no schema"
            )));
        }
        (FieldSelector::Name(name), RelationSchema::Known(_)) => {
            let index = schema.field_index(name).ok_or_else(|| {
                FlowqError::unresolved_scalar_field(format!(
                    "scalar '{alias}' has no field named '{name}'"
                ))
            })?;
            (index, schema.field_type(index).unwrap_or(DataType::Binary))
        }
        (FieldSelector::Position(p), RelationSchema::Known(s)) => {
            let dt = schema.field_type(*p).ok_or_else(|| {
                FlowqError::unresolved_scalar_field(format!(
                    "position ${p} is out of range for scalar '{alias}' with {} fields",
                    s.fields().len()
                ))
            })?;
            (*p, dt)
        }
        (FieldSelector::Position(p), RelationSchema::Unknown) => (*p, DataType::Binary),
    };
    let side_input = ctx.bind_side_input(alias)?;
    let typed = !is_untyped(&data_type);
    debug!(alias, field = %field, side_input = %side_input, index, typed, "rewrote scalar reference");
    Ok(PlaceholderBinding {
        side_input,
        alias: alias.to_string(),
        index,
        data_type,
        typed,
    })
}

/// Aliases `plan` depends on, through relation inputs or scalar references.
pub fn alias_dependencies(plan: &LogicalPlan) -> Vec<String> {
    let mut deps = plan.relation_aliases();
    for a in plan.scalar_aliases() {
        if !deps.contains(&a) {
            deps.push(a);
        }
    }
    deps
}

/// Reject aliases that reach themselves through relation inputs or scalar uses.
///
/// The error carries the alias chain, e.g. `["C", "D", "C"]`. Aliases that
/// `lookup` does not know are skipped; compilation reports them.
pub fn check_scalar_cycles<'a>(
    root: &str,
    lookup: &dyn Fn(&str) -> Option<&'a LogicalPlan>,
) -> Result<()> {
    let mut stack = Vec::new();
    let mut done = HashSet::new();
    visit(root, lookup, &mut stack, &mut done)
}

fn visit<'a>(
    alias: &str,
    lookup: &dyn Fn(&str) -> Option<&'a LogicalPlan>,
    stack: &mut Vec<String>,
    done: &mut HashSet<String>,
) -> Result<()> {
    if done.contains(alias) {
        return Ok(());
    }
    if let Some(pos) = stack.iter().position(|a| a == alias) {
        let mut chain = stack[pos..].to_vec();
        chain.push(alias.to_string());
        return Err(FlowqError::scalar_cycle(chain));
    }
    let Some(plan) = lookup(alias) else {
        return Ok(());
    };
    stack.push(alias.to_string());
    for dep in alias_dependencies(plan) {
        visit(&dep, lookup, stack, done)?;
    }
    stack.pop();
    done.insert(alias.to_string());
    Ok(())
}
