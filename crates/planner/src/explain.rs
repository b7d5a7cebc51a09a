use crate::logical_plan::{Expr, LiteralValue, LogicalPlan};
use crate::physical_plan::{PhysicalPlan, PhysicalUnit};
use crate::schema_resolver::type_display;
use crate::stage::{StageDag, StageKind};

/// Render logical plan as human-readable multiline text.
pub fn explain_logical(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

/// Render a physical unit: side inputs first, then every output.
pub fn explain_unit(unit: &PhysicalUnit) -> String {
    let mut s = String::new();
    for si in &unit.side_inputs {
        s.push_str(&format!(
            "SideInput {} alias={} consumers={:?}\n",
            si.id, si.alias, si.consumers
        ));
        fmt_physical(&si.plan, 1, &mut s);
    }
    for out in &unit.outputs {
        s.push_str(&format!("Output alias={} target={:?}\n", out.alias, out.target));
        fmt_physical(&out.plan, 1, &mut s);
    }
    s
}

/// Render the stage DAG: one line per stage with the stages it waits on.
pub fn explain_stages(dag: &StageDag) -> String {
    let ids = |v: &[flowq_common::StageId]| {
        v.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    };
    let mut s = format!("roots [{}]\n", ids(&dag.roots()));
    for stage in &dag.stages {
        let kind = match &stage.kind {
            StageKind::SideInput(id) => format!("side input {id}"),
            StageKind::Output(alias) => format!("output {alias}"),
        };
        s.push_str(&format!(
            "stage {} {kind} after [{}]: {}\n",
            stage.id,
            ids(&stage.parents),
            stage.operators.join(" <- ")
        ));
    }
    s
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        LogicalPlan::Load { source, schema } => {
            let fields = match schema {
                Some(s) => s
                    .fields()
                    .iter()
                    .map(|f| format!("{}:{}", f.name(), type_display(f.data_type())))
                    .collect::<Vec<_>>()
                    .join(", "),
                None => "<none>".to_string(),
            };
            out.push_str(&format!("{pad}Load source={source} schema=({fields})\n"));
        }
        LogicalPlan::Relation { alias } => {
            out.push_str(&format!("{pad}Relation {alias}\n"));
        }
        LogicalPlan::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter {}\n", fmt_expr(predicate)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Split {
            branch,
            predicate,
            input,
        } => {
            out.push_str(&format!("{pad}Split branch={branch} if {}\n", fmt_expr(predicate)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Projection { exprs, input } => {
            out.push_str(&format!("{pad}Projection\n"));
            for (e, name) in exprs {
                out.push_str(&format!("{pad}  {name} := {}\n", fmt_expr(e)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => {
            out.push_str(&format!("{pad}Aggregate\n"));
            if group_exprs.is_empty() {
                out.push_str(&format!("{pad}  group_by=ALL\n"));
            } else {
                out.push_str(&format!("{pad}  group_by={}\n", group_exprs.len()));
                for g in group_exprs {
                    out.push_str(&format!("{pad}    {}\n", fmt_expr(g)));
                }
            }
            out.push_str(&format!("{pad}  aggs={}\n", aggr_exprs.len()));
            for (a, name) in aggr_exprs {
                out.push_str(&format!("{pad}    {name} := {:?}\n", a));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Join { on, left, right } => {
            out.push_str(&format!("{pad}Join\n"));
            for (l, r) in on {
                out.push_str(&format!("{pad}  on {} = {}\n", fmt_expr(l), fmt_expr(r)));
            }
            out.push_str(&format!("{pad}  left:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_plan(right, indent + 2, out);
        }
        LogicalPlan::Limit { n, input } => {
            out.push_str(&format!("{pad}Limit n={n}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Store { target, input } => {
            out.push_str(&format!("{pad}Store into={target}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::SideInputs { side_inputs, input } => {
            let ids = side_inputs
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("{pad}SideInputs [{ids}]\n"));
            fmt_plan(input, indent + 1, out);
        }
    }
}

fn fmt_physical(plan: &PhysicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    let detail = match plan {
        PhysicalPlan::Scan(x) => format!(" source={}", x.source),
        PhysicalPlan::Filter(x) => format!(" {}", fmt_expr(&x.predicate)),
        PhysicalPlan::Project(x) => format!(
            " [{}]",
            x.exprs
                .iter()
                .map(|(e, n)| format!("{n} := {}", fmt_expr(e)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        PhysicalPlan::HashAggregate(x) => format!(" groups={}", x.group_exprs.len()),
        PhysicalPlan::HashJoin(x) => format!(" keys={}", x.on.len()),
        PhysicalPlan::Limit(x) => format!(" n={}", x.n),
        PhysicalPlan::Store(x) => format!(" into={}", x.target),
        PhysicalPlan::ScalarBroadcast(x) => format!(
            " [{}]",
            x.side_inputs
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    out.push_str(&format!("{pad}{}{detail}\n", plan.name()));
    for child in plan.children() {
        fmt_physical(child, indent + 1, out);
    }
}

fn fmt_expr(e: &Expr) -> String {
    match e {
        Expr::Column(c) => c.clone(),
        Expr::Position(i) => format!("${i}"),
        Expr::ColumnRef { name, index } => format!("{name}#{index}"),
        Expr::Literal(LiteralValue::Utf8(s)) => format!("'{s}'"),
        Expr::Literal(v) => format!("{v:?}"),
        Expr::Cast { expr, to_type } => {
            format!("({}){}", type_display(to_type), fmt_expr(expr))
        }
        Expr::Not(x) => format!("NOT ({})", fmt_expr(x)),
        Expr::And(a, b) => format!("({}) AND ({})", fmt_expr(a), fmt_expr(b)),
        Expr::Or(a, b) => format!("({}) OR ({})", fmt_expr(a), fmt_expr(b)),
        Expr::BinaryOp { left, op, right } => {
            format!("({}) {} ({})", fmt_expr(left), op.symbol(), fmt_expr(right))
        }
        Expr::ScalarRef { alias, field } => format!("{alias}.{field}"),
        Expr::RelationRef(alias) => alias.clone(),
        Expr::Placeholder(p) => format!(
            "scalar({}.${} via {}: {})",
            p.alias,
            p.index,
            p.side_input,
            type_display(&p.data_type)
        ),
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use flowq_common::SideInputId;

    use super::{explain_logical, explain_stages};
    use crate::logical_plan::{Expr, LogicalPlan, PlaceholderBinding};
    use crate::physical_plan::{
        OutputPlan, PhysicalPlan, PhysicalUnit, ScalarBroadcastExec, ScanExec, SideInputPlan,
    };
    use crate::schema_resolver::RelationSchema;
    use crate::stage::build_stage_dag;
    use crate::unit::OutputTarget;

    #[test]
    fn stages_list_their_parents_and_roots() {
        let scan = || {
            PhysicalPlan::Scan(ScanExec {
                source: "a".to_string(),
                schema: None,
                batch_size_rows: 8192,
            })
        };
        let unit = PhysicalUnit {
            side_inputs: vec![SideInputPlan {
                id: SideInputId(0),
                alias: "C".to_string(),
                plan: scan(),
                schema: RelationSchema::Unknown,
                consumers: vec!["Y".to_string()],
            }],
            outputs: vec![OutputPlan {
                alias: "Y".to_string(),
                target: OutputTarget::Collect,
                plan: PhysicalPlan::ScalarBroadcast(ScalarBroadcastExec {
                    side_inputs: vec![SideInputId(0)],
                    input: Box::new(scan()),
                }),
                schema: RelationSchema::Unknown,
            }],
        };
        let text = explain_stages(&build_stage_dag(&unit));
        assert_eq!(
            text,
            "roots [0]\n\
             stage 0 side input si0 after []: Scan\n\
             stage 1 output Y after [0]: ScalarBroadcast <- Scan\n"
        );
    }

    #[test]
    fn placeholder_and_side_inputs_are_visible() {
        let plan = LogicalPlan::SideInputs {
            side_inputs: vec![SideInputId(0)],
            input: Box::new(LogicalPlan::Projection {
                exprs: vec![(
                    Expr::Placeholder(PlaceholderBinding {
                        side_input: SideInputId(0),
                        alias: "C".to_string(),
                        index: 1,
                        data_type: DataType::Float64,
                        typed: true,
                    }),
                    "m".to_string(),
                )],
                input: Box::new(LogicalPlan::Load {
                    source: "a".to_string(),
                    schema: None,
                }),
            }),
        };
        let text = explain_logical(&plan);
        assert!(text.contains("SideInputs [si0]"), "{text}");
        assert!(text.contains("scalar(C.$1 via si0: double)"), "{text}");
        assert!(text.contains("schema=(<none>)"), "{text}");
    }
}
