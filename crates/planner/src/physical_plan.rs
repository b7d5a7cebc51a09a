use arrow_schema::SchemaRef;
use flowq_common::SideInputId;
use serde::{Deserialize, Serialize};

use crate::logical_plan::{AggExpr, Expr};
use crate::schema_resolver::RelationSchema;
use crate::unit::OutputTarget;

/// The physical operator graph.
///
/// Still carries analyzed logical `Expr`s; execution compiles them against the
/// runtime input schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PhysicalPlan {
    /// Source scan.
    Scan(ScanExec),
    /// Row filter (also used for split branches).
    Filter(FilterExec),
    /// Projection.
    Project(ProjectExec),
    /// Single-phase hash aggregate.
    HashAggregate(HashAggregateExec),
    /// Inner hash join on key expressions.
    HashJoin(HashJoinExec),
    /// Limit.
    Limit(LimitExec),
    /// Sink write.
    Store(StoreExec),
    /// Barrier that binds scalar side inputs before `input` processes records.
    ScalarBroadcast(ScalarBroadcastExec),
}

impl PhysicalPlan {
    /// Returns direct child operators.
    pub fn children(&self) -> Vec<&PhysicalPlan> {
        match self {
            PhysicalPlan::Scan(_) => vec![],
            PhysicalPlan::Filter(x) => vec![x.input.as_ref()],
            PhysicalPlan::Project(x) => vec![x.input.as_ref()],
            PhysicalPlan::HashAggregate(x) => vec![x.input.as_ref()],
            PhysicalPlan::HashJoin(x) => vec![x.left.as_ref(), x.right.as_ref()],
            PhysicalPlan::Limit(x) => vec![x.input.as_ref()],
            PhysicalPlan::Store(x) => vec![x.input.as_ref()],
            PhysicalPlan::ScalarBroadcast(x) => vec![x.input.as_ref()],
        }
    }

    /// Operator name used by explain output, stage DAGs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalPlan::Scan(_) => "Scan",
            PhysicalPlan::Filter(_) => "Filter",
            PhysicalPlan::Project(_) => "Project",
            PhysicalPlan::HashAggregate(_) => "HashAggregate",
            PhysicalPlan::HashJoin(_) => "HashJoin",
            PhysicalPlan::Limit(_) => "Limit",
            PhysicalPlan::Store(_) => "Store",
            PhysicalPlan::ScalarBroadcast(_) => "ScalarBroadcast",
        }
    }

    /// Every side input this subtree waits on, sorted.
    pub fn side_inputs(&self) -> Vec<SideInputId> {
        let mut out = Vec::new();
        collect_side_inputs(self, &mut out);
        out.sort();
        out.dedup();
        out
    }
}

fn collect_side_inputs(plan: &PhysicalPlan, out: &mut Vec<SideInputId>) {
    if let PhysicalPlan::ScalarBroadcast(b) = plan {
        out.extend(b.side_inputs.iter().copied());
    }
    for child in plan.children() {
        collect_side_inputs(child, out);
    }
}

/// Source scan operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanExec {
    /// Source name resolved through the runtime's table source.
    pub source: String,
    /// Declared schema; raw columns are cast to it. `None` keeps raw columns.
    pub schema: Option<SchemaRef>,
    /// Target rows per produced batch.
    pub batch_size_rows: usize,
}

/// Row filter operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterExec {
    /// Predicate.
    pub predicate: Expr,
    /// Input plan.
    pub input: Box<PhysicalPlan>,
}

/// Projection operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectExec {
    /// (expr, output_name)
    pub exprs: Vec<(Expr, String)>,
    /// Input plan.
    pub input: Box<PhysicalPlan>,
}

/// Hash aggregate; empty `group_exprs` aggregates the whole input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashAggregateExec {
    /// Grouping expressions.
    pub group_exprs: Vec<Expr>,
    /// Aggregate expressions and aliases.
    pub aggr_exprs: Vec<(AggExpr, String)>,
    /// Input plan.
    pub input: Box<PhysicalPlan>,
}

/// Hash join physical operator.
///
/// Contract:
/// - `on` is positional key mapping `(left_key, right_key)` evaluated per row;
/// - the right input builds the hash table and the left input probes it, so
///   output rows follow left order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashJoinExec {
    /// Left input.
    pub left: Box<PhysicalPlan>,
    /// Right input.
    pub right: Box<PhysicalPlan>,
    /// Join key pairs `(left_key, right_key)`.
    pub on: Vec<(Expr, Expr)>,
}

/// Limit operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitExec {
    /// Maximum number of rows.
    pub n: usize,
    /// Input plan.
    pub input: Box<PhysicalPlan>,
}

/// Sink write operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreExec {
    /// Target name resolved through the runtime's table sink.
    pub target: String,
    /// Input plan.
    pub input: Box<PhysicalPlan>,
}

/// Scalar broadcast edge.
///
/// Execution of `input` must not start before every listed side input reached
/// a terminal state; all parallel tasks of `input` read the same frozen rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarBroadcastExec {
    pub side_inputs: Vec<SideInputId>,
    pub input: Box<PhysicalPlan>,
}

/// Physical plan of one scalar side input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideInputPlan {
    pub id: SideInputId,
    /// Alias used in logs and diagnostics.
    pub alias: String,
    pub plan: PhysicalPlan,
    pub schema: RelationSchema,
    /// Aliases reading this side input.
    pub consumers: Vec<String>,
}

/// Physical plan of one statement of a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPlan {
    pub alias: String,
    pub target: OutputTarget,
    pub plan: PhysicalPlan,
    pub schema: RelationSchema,
}

/// Executable form of a compiled unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalUnit {
    /// Side inputs in dependency order; each runs exactly once per execution.
    pub side_inputs: Vec<SideInputPlan>,
    pub outputs: Vec<OutputPlan>,
}
