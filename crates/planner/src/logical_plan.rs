use arrow_schema::{DataType, SchemaRef};
use flowq_common::{Result, SideInputId};
use serde::{Deserialize, Serialize};

/// Selects one field of a scalar relation's row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSelector {
    /// `alias.field`; needs the relation schema to resolve an index.
    Name(String),
    /// `alias.$N`; resolvable without a schema.
    Position(usize),
}

impl std::fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldSelector::Name(n) => write!(f, "{n}"),
            FieldSelector::Position(p) => write!(f, "${p}"),
        }
    }
}

/// Rewritten form of a scalar reference.
///
/// `side_input` is shared by every placeholder reading the same scalar subtree
/// within one compiled unit. `typed == false` marks an untyped (bytearray)
/// field that must be cast before it can meet a typed operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderBinding {
    pub side_input: SideInputId,
    pub alias: String,
    pub index: usize,
    pub data_type: DataType,
    pub typed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// Field of the current relation by name (`a0`, `A.a0` after a join).
    Column(String),
    /// Field of the current relation by position (`$1`).
    Position(usize),
    /// Resolved field of the current relation.
    ColumnRef {
        name: String,
        index: usize,
    },
    Literal(LiteralValue),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        to_type: DataType,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// `alias.field` / `alias.$N` as produced by the parser.
    ScalarRef {
        alias: String,
        field: FieldSelector,
    },
    /// Another relation used as a whole tuple; never valid.
    RelationRef(String),
    /// Scalar reference after rewrite.
    Placeholder(PlaceholderBinding),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LiteralValue {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Concat,
}

impl BinaryOp {
    /// Operator name used in diagnostics.
    pub fn display_name(self) -> &'static str {
        match self {
            BinaryOp::Eq => "Equal",
            BinaryOp::NotEq => "NotEqual",
            BinaryOp::Lt => "LessThan",
            BinaryOp::LtEq => "LessThanEqual",
            BinaryOp::Gt => "GreaterThan",
            BinaryOp::GtEq => "GreaterThanEqual",
            BinaryOp::Plus => "Add",
            BinaryOp::Minus => "Subtract",
            BinaryOp::Multiply => "Multiply",
            BinaryOp::Divide => "Division",
            BinaryOp::Concat => "Concat",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Concat => "CONCAT",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogicalPlan {
    /// Raw input; `schema == None` means the relation has no declared schema.
    Load {
        source: String,
        schema: Option<SchemaRef>,
    },
    /// Reference to another alias of the same script.
    Relation {
        alias: String,
    },
    Projection {
        exprs: Vec<(Expr, String)>,
        input: Box<LogicalPlan>,
    },
    Filter {
        predicate: Expr,
        input: Box<LogicalPlan>,
    },
    /// One output branch of a `SPLIT ... INTO b IF pred`.
    Split {
        branch: String,
        predicate: Expr,
        input: Box<LogicalPlan>,
    },
    /// Empty `group_exprs` groups the whole input (`GROUP ... ALL`).
    Aggregate {
        group_exprs: Vec<Expr>,
        aggr_exprs: Vec<(AggExpr, String)>,
        input: Box<LogicalPlan>,
    },
    /// Inner equi-join on key expressions `(left_key, right_key)`.
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        on: Vec<(Expr, Expr)>,
    },
    Limit {
        n: usize,
        input: Box<LogicalPlan>,
    },
    Store {
        target: String,
        input: Box<LogicalPlan>,
    },
    /// `input` evaluates expressions reading the listed scalar side-inputs.
    SideInputs {
        side_inputs: Vec<SideInputId>,
        input: Box<LogicalPlan>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AggExpr {
    Count(Expr),
    Sum(Expr),
    Min(Expr),
    Max(Expr),
    Avg(Expr),
}

impl AggExpr {
    pub fn input(&self) -> &Expr {
        match self {
            AggExpr::Count(e)
            | AggExpr::Sum(e)
            | AggExpr::Min(e)
            | AggExpr::Max(e)
            | AggExpr::Avg(e) => e,
        }
    }

    pub fn map_input(self, f: impl FnOnce(Expr) -> Result<Expr>) -> Result<AggExpr> {
        Ok(match self {
            AggExpr::Count(e) => AggExpr::Count(f(e)?),
            AggExpr::Sum(e) => AggExpr::Sum(f(e)?),
            AggExpr::Min(e) => AggExpr::Min(f(e)?),
            AggExpr::Max(e) => AggExpr::Max(f(e)?),
            AggExpr::Avg(e) => AggExpr::Avg(f(e)?),
        })
    }
}

impl LogicalPlan {
    /// Direct child plans.
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Load { .. } | LogicalPlan::Relation { .. } => vec![],
            LogicalPlan::Projection { input, .. }
            | LogicalPlan::Filter { input, .. }
            | LogicalPlan::Split { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Store { input, .. }
            | LogicalPlan::SideInputs { input, .. } => vec![input.as_ref()],
            LogicalPlan::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        }
    }

    /// Expressions evaluated per record by this node (not its children).
    pub fn node_exprs(&self) -> Vec<&Expr> {
        match self {
            LogicalPlan::Projection { exprs, .. } => exprs.iter().map(|(e, _)| e).collect(),
            LogicalPlan::Filter { predicate, .. } | LogicalPlan::Split { predicate, .. } => {
                vec![predicate]
            }
            LogicalPlan::Aggregate {
                group_exprs,
                aggr_exprs,
                ..
            } => group_exprs
                .iter()
                .chain(aggr_exprs.iter().map(|(a, _)| a.input()))
                .collect(),
            LogicalPlan::Join { on, .. } => on.iter().flat_map(|(l, r)| [l, r]).collect(),
            _ => vec![],
        }
    }

    /// Aliases referenced through `Relation` nodes anywhere in this plan.
    pub fn relation_aliases(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_relation_aliases(self, &mut out);
        out
    }

    /// Aliases referenced through scalar expressions anywhere in this plan.
    pub fn scalar_aliases(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_scalar_aliases(self, &mut out);
        out
    }
}

fn collect_relation_aliases(plan: &LogicalPlan, out: &mut Vec<String>) {
    if let LogicalPlan::Relation { alias } = plan {
        if !out.contains(alias) {
            out.push(alias.clone());
        }
    }
    for child in plan.children() {
        collect_relation_aliases(child, out);
    }
}

fn collect_scalar_aliases(plan: &LogicalPlan, out: &mut Vec<String>) {
    for e in plan.node_exprs() {
        e.visit(&mut |x| {
            if let Expr::ScalarRef { alias, .. } = x {
                if !out.contains(alias) {
                    out.push(alias.clone());
                }
            }
        });
    }
    for child in plan.children() {
        collect_scalar_aliases(child, out);
    }
}

impl Expr {
    /// Pre-order visit of this expression tree.
    pub fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::BinaryOp { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.visit(f);
                right.visit(f);
            }
            Expr::Cast { expr, .. } | Expr::Not(expr) => expr.visit(f),
            Expr::Column(_)
            | Expr::Position(_)
            | Expr::ColumnRef { .. }
            | Expr::Literal(_)
            | Expr::ScalarRef { .. }
            | Expr::RelationRef(_)
            | Expr::Placeholder(_) => {}
        }
    }

    /// Side-inputs read by this expression, in first-seen order.
    pub fn side_inputs(&self) -> Vec<SideInputId> {
        let mut out = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Placeholder(p) = e {
                if !out.contains(&p.side_input) {
                    out.push(p.side_input);
                }
            }
        });
        out
    }
}
