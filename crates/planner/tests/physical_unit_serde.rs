use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};
use flowq_planner::{
    compile_unit, create_physical_unit, AggExpr, BinaryOp, Expr, FieldSelector, LogicalPlan,
    PhysicalPlannerConfig, PhysicalUnit, ScriptDefinitions, Statement,
};

fn defs() -> ScriptDefinitions {
    let mut defs = ScriptDefinitions::new();
    defs.define(
        "A",
        LogicalPlan::Load {
            source: "t".to_string(),
            schema: Some(Arc::new(Schema::new(vec![
                Field::new("a0", DataType::Int64, true),
                Field::new("a1", DataType::Float64, true),
            ]))),
        },
    );
    defs.define(
        "C",
        LogicalPlan::Aggregate {
            group_exprs: vec![],
            aggr_exprs: vec![(AggExpr::Count(Expr::Position(0)), "count".to_string())],
            input: Box::new(LogicalPlan::Relation {
                alias: "A".to_string(),
            }),
        },
    );
    defs.define(
        "Y",
        LogicalPlan::Projection {
            exprs: vec![(
                Expr::BinaryOp {
                    left: Box::new(Expr::Column("a0".to_string())),
                    op: BinaryOp::Multiply,
                    right: Box::new(Expr::ScalarRef {
                        alias: "C".to_string(),
                        field: FieldSelector::Name("count".to_string()),
                    }),
                },
                "x".to_string(),
            )],
            input: Box::new(LogicalPlan::Relation {
                alias: "A".to_string(),
            }),
        },
    );
    defs
}

#[test]
fn physical_unit_is_serializable() {
    let compiled = compile_unit(&defs(), &[Statement::store("Y", "out")]).expect("compile");
    let unit =
        create_physical_unit(&compiled, &PhysicalPlannerConfig::default()).expect("lower");
    assert_eq!(unit.side_inputs.len(), 1);
    assert_eq!(unit.side_inputs[0].consumers, vec!["Y".to_string()]);

    let s = serde_json::to_string(&unit).expect("serialize");
    let back: PhysicalUnit = serde_json::from_str(&s).expect("deserialize");
    assert_eq!(back.outputs.len(), 1);
    assert_eq!(back.outputs[0].plan.side_inputs(), unit.outputs[0].plan.side_inputs());
}
