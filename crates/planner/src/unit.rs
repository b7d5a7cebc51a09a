//! Compilation of a set of statements into one unit.
//!
//! Every alias reachable from the unit's statements is compiled once:
//! dependencies first, then scalar rewrite, then analysis. Scalar side inputs
//! are registered in a single [`SideInputRegistry`], so all statements of the
//! unit share one side input per distinct scalar subtree.

use std::collections::HashMap;

use flowq_common::{FlowqError, Result, SideInputId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analyzer::{Analyzer, RelationProvider};
use crate::logical_plan::LogicalPlan;
use crate::scalar_dedup::{SideInputEntry, SideInputRegistry};
use crate::scalar_rewriter::{
    alias_dependencies, check_scalar_cycles, rewrite_scalar_references, ScalarBindingContext,
};
use crate::schema_resolver::{RelationSchema, SchemaResolver};

/// Alias definitions of a script, as produced by the parser.
#[derive(Debug, Clone, Default)]
pub struct ScriptDefinitions {
    order: Vec<String>,
    plans: HashMap<String, LogicalPlan>,
}

impl ScriptDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine `alias`. Redefinition keeps the original position.
    pub fn define(&mut self, alias: impl Into<String>, plan: LogicalPlan) {
        let alias = alias.into();
        if !self.plans.contains_key(&alias) {
            self.order.push(alias.clone());
        }
        self.plans.insert(alias, plan);
    }

    pub fn get(&self, alias: &str) -> Option<&LogicalPlan> {
        self.plans.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.plans.contains_key(alias)
    }

    /// Aliases in definition order.
    pub fn aliases(&self) -> &[String] {
        &self.order
    }
}

/// Where a statement's rows go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputTarget {
    /// Write to a named sink.
    Store(String),
    /// Return the rows to the caller.
    Collect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub alias: String,
    pub target: OutputTarget,
}

impl Statement {
    pub fn store(alias: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            target: OutputTarget::Store(target.into()),
        }
    }

    pub fn collect(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            target: OutputTarget::Collect,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledStatement {
    pub alias: String,
    pub target: OutputTarget,
    /// Analyzed plan; `Store` targets are wrapped in [`LogicalPlan::Store`].
    pub plan: LogicalPlan,
    pub schema: RelationSchema,
}

/// Statements compiled together plus the side inputs they share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub statements: Vec<CompiledStatement>,
    /// Side inputs in dependency order.
    pub side_inputs: Vec<SideInputEntry>,
}

/// Compile `statements` against `defs` as a single unit.
///
/// Any compile-time error aborts the whole unit.
pub fn compile_unit(defs: &ScriptDefinitions, statements: &[Statement]) -> Result<CompiledUnit> {
    let mut compiler = UnitCompiler::new(defs);
    let mut compiled = Vec::with_capacity(statements.len());
    for stmt in statements {
        let (plan, schema) = compiler.compile_root(&stmt.alias)?;
        let plan = match &stmt.target {
            OutputTarget::Store(target) => LogicalPlan::Store {
                target: target.clone(),
                input: Box::new(plan),
            },
            OutputTarget::Collect => plan,
        };
        compiled.push(CompiledStatement {
            alias: stmt.alias.clone(),
            target: stmt.target.clone(),
            plan,
            schema,
        });
    }
    let side_inputs = compiler.registry.into_entries();
    info!(
        statements = compiled.len(),
        side_inputs = side_inputs.len(),
        "compiled unit"
    );
    Ok(CompiledUnit {
        statements: compiled,
        side_inputs,
    })
}

struct UnitCompiler<'a> {
    defs: &'a ScriptDefinitions,
    registry: SideInputRegistry,
    compiled: HashMap<String, (LogicalPlan, RelationSchema)>,
    /// Alias whose expressions are being rewritten.
    consumer: String,
}

impl<'a> UnitCompiler<'a> {
    fn new(defs: &'a ScriptDefinitions) -> Self {
        Self {
            defs,
            registry: SideInputRegistry::new(),
            compiled: HashMap::new(),
            consumer: String::new(),
        }
    }

    fn compile_root(&mut self, alias: &str) -> Result<(LogicalPlan, RelationSchema)> {
        let defs = self.defs;
        check_scalar_cycles(alias, &|a: &str| defs.get(a))?;
        self.compile_alias(alias)?;
        self.compiled
            .get(alias)
            .cloned()
            .ok_or_else(|| FlowqError::Planning(format!("alias '{alias}' was not compiled")))
    }

    fn compile_alias(&mut self, alias: &str) -> Result<()> {
        if self.compiled.contains_key(alias) {
            return Ok(());
        }
        let defs = self.defs;
        let raw = defs
            .get(alias)
            .ok_or_else(|| FlowqError::Planning(format!("unknown alias: {alias}")))?;
        for dep in alias_dependencies(raw) {
            self.compile_alias(&dep)?;
        }

        self.consumer = alias.to_string();
        let rewritten = rewrite_scalar_references(raw.clone(), self)?;
        let (plan, schema) = Analyzer::new().analyze(rewritten, &*self)?;
        debug!(alias, known_schema = schema.is_known(), "compiled alias");
        self.compiled.insert(alias.to_string(), (plan, schema));
        Ok(())
    }
}

impl SchemaResolver for UnitCompiler<'_> {
    fn relation_schema(&self, alias: &str) -> Result<RelationSchema> {
        self.compiled
            .get(alias)
            .map(|(_, s)| s.clone())
            .ok_or_else(|| FlowqError::Planning(format!("unknown alias: {alias}")))
    }
}

impl ScalarBindingContext for UnitCompiler<'_> {
    fn bind_side_input(&mut self, alias: &str) -> Result<SideInputId> {
        let (plan, schema) = self
            .compiled
            .get(alias)
            .ok_or_else(|| FlowqError::Planning(format!("unknown alias: {alias}")))?;
        let id = self.registry.register(alias, plan, schema)?;
        let consumer = self.consumer.clone();
        self.registry.add_consumer(id, &consumer);
        Ok(id)
    }
}

impl RelationProvider for UnitCompiler<'_> {
    fn compiled_plan(&self, alias: &str) -> Result<LogicalPlan> {
        self.compiled
            .get(alias)
            .map(|(p, _)| p.clone())
            .ok_or_else(|| FlowqError::Planning(format!("unknown alias: {alias}")))
    }

    fn defines(&self, name: &str) -> bool {
        self.defs.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema};
    use flowq_common::{ErrorCode, FlowqError};

    use super::{compile_unit, ScriptDefinitions, Statement};
    use crate::logical_plan::{AggExpr, BinaryOp, Expr, FieldSelector, LiteralValue, LogicalPlan};

    fn load(source: &str) -> LogicalPlan {
        LogicalPlan::Load {
            source: source.to_string(),
            schema: Some(Arc::new(Schema::new(vec![
                Field::new("a0", DataType::Int64, true),
                Field::new("a1", DataType::Float64, true),
            ]))),
        }
    }

    fn rel(alias: &str) -> Box<LogicalPlan> {
        Box::new(LogicalPlan::Relation {
            alias: alias.to_string(),
        })
    }

    fn count_max(input: &str) -> LogicalPlan {
        LogicalPlan::Aggregate {
            group_exprs: vec![],
            aggr_exprs: vec![
                (
                    AggExpr::Count(Expr::Literal(LiteralValue::Int64(1))),
                    "count".to_string(),
                ),
                (AggExpr::Max(Expr::Position(1)), "max".to_string()),
            ],
            input: rel(input),
        }
    }

    fn scaled(scalar: &str) -> LogicalPlan {
        LogicalPlan::Projection {
            exprs: vec![(
                Expr::BinaryOp {
                    left: Box::new(Expr::Column("a0".to_string())),
                    op: BinaryOp::Multiply,
                    right: Box::new(Expr::ScalarRef {
                        alias: scalar.to_string(),
                        field: FieldSelector::Name("count".to_string()),
                    }),
                },
                "x".to_string(),
            )],
            input: rel("A"),
        }
    }

    fn script() -> ScriptDefinitions {
        let mut defs = ScriptDefinitions::new();
        defs.define("A", load("a"));
        defs.define("C", count_max("A"));
        defs.define("C2", count_max("A"));
        defs.define("Y", scaled("C"));
        defs.define("Z", scaled("C2"));
        defs
    }

    #[test]
    fn statements_in_one_unit_share_side_inputs() {
        let defs = script();
        let unit = compile_unit(
            &defs,
            &[Statement::store("Y", "out_y"), Statement::store("Z", "out_z")],
        )
        .expect("compile");
        assert_eq!(unit.statements.len(), 2);
        assert_eq!(unit.side_inputs.len(), 1);
        let entry = &unit.side_inputs[0];
        assert_eq!(entry.aliases, vec!["C".to_string(), "C2".to_string()]);
        assert_eq!(entry.consumers, vec!["Y".to_string(), "Z".to_string()]);
        assert!(matches!(unit.statements[0].plan, LogicalPlan::Store { .. }));
    }

    #[test]
    fn unknown_alias_is_planning_error() {
        let defs = script();
        let err = compile_unit(&defs, &[Statement::collect("nope")]).expect_err("must fail");
        assert!(matches!(err, FlowqError::Planning(_)));
    }

    #[test]
    fn scalar_cycle_aborts_unit() {
        let mut defs = script();
        defs.define(
            "C",
            LogicalPlan::Projection {
                exprs: vec![(
                    Expr::ScalarRef {
                        alias: "D".to_string(),
                        field: FieldSelector::Position(0),
                    },
                    "x".to_string(),
                )],
                input: rel("A"),
            },
        );
        defs.define(
            "D",
            LogicalPlan::Filter {
                predicate: Expr::BinaryOp {
                    left: Box::new(Expr::Column("a0".to_string())),
                    op: BinaryOp::Gt,
                    right: Box::new(Expr::ScalarRef {
                        alias: "C".to_string(),
                        field: FieldSelector::Position(0),
                    }),
                },
                input: rel("A"),
            },
        );
        let err = compile_unit(&defs, &[Statement::collect("Y")]).expect_err("must fail");
        assert_eq!(err.code(), Some(ErrorCode::CyclicScalarDependency));
        match err {
            FlowqError::Cycle { chain, .. } => {
                assert_eq!(chain, vec!["C".to_string(), "D".to_string(), "C".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn redefinition_keeps_order() {
        let mut defs = ScriptDefinitions::new();
        defs.define("A", load("a"));
        defs.define("B", load("b"));
        defs.define("A", load("c"));
        assert_eq!(defs.aliases(), &["A".to_string(), "B".to_string()]);
    }
}
