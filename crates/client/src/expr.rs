use arrow_schema::DataType;
use flowq_planner::{AggExpr, BinaryOp, Expr, FieldSelector, LiteralValue};

/// Builds a column-reference expression (`a0`, or `A::a0` after a join).
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

/// Builds a positional column reference (`$N`).
pub fn pos(index: usize) -> Expr {
    Expr::Position(index)
}

/// Builds an `Int64` literal expression.
pub fn lit_i64(v: i64) -> Expr {
    Expr::Literal(LiteralValue::Int64(v))
}

/// Builds a `Float64` literal expression.
pub fn lit_f64(v: f64) -> Expr {
    Expr::Literal(LiteralValue::Float64(v))
}

/// Builds a boolean literal expression.
pub fn lit_bool(v: bool) -> Expr {
    Expr::Literal(LiteralValue::Boolean(v))
}

/// Builds a UTF-8 string literal expression.
pub fn lit_str(v: &str) -> Expr {
    Expr::Literal(LiteralValue::Utf8(v.to_string()))
}

/// `alias.field`: a field of a single-row relation, by name.
pub fn scalar(alias: &str, field: &str) -> Expr {
    Expr::ScalarRef {
        alias: alias.to_string(),
        field: FieldSelector::Name(field.to_string()),
    }
}

/// `alias.$N`: a field of a single-row relation, by position.
pub fn scalar_pos(alias: &str, index: usize) -> Expr {
    Expr::ScalarRef {
        alias: alias.to_string(),
        field: FieldSelector::Position(index),
    }
}

/// A relation used as a value. Never valid; kept so callers can reproduce
/// what a parser hands over for `foreach A generate C`.
pub fn relation(alias: &str) -> Expr {
    Expr::RelationRef(alias.to_string())
}

/// Builds an explicit cast (`(int)expr`).
pub fn cast(expr: Expr, to_type: DataType) -> Expr {
    Expr::Cast {
        expr: Box::new(expr),
        to_type,
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Builds an equality expression (`left = right`).
pub fn eq(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Eq, right)
}

pub fn lt(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Lt, right)
}

pub fn gt(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Gt, right)
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Plus, right)
}

pub fn sub(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Minus, right)
}

pub fn mul(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Multiply, right)
}

pub fn div(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Divide, right)
}

/// `CONCAT(left, right)`.
pub fn concat(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Concat, right)
}

/// Builds a boolean AND expression.
pub fn and(left: Expr, right: Expr) -> Expr {
    Expr::And(Box::new(left), Box::new(right))
}

/// Builds a boolean OR expression.
pub fn or(left: Expr, right: Expr) -> Expr {
    Expr::Or(Box::new(left), Box::new(right))
}

pub fn count(e: Expr) -> AggExpr {
    AggExpr::Count(e)
}

pub fn sum(e: Expr) -> AggExpr {
    AggExpr::Sum(e)
}

pub fn min(e: Expr) -> AggExpr {
    AggExpr::Min(e)
}

pub fn max(e: Expr) -> AggExpr {
    AggExpr::Max(e)
}

pub fn avg(e: Expr) -> AggExpr {
    AggExpr::Avg(e)
}
