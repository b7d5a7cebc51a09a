use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use flowq_common::{FlowqError, Result};
use serde::{Deserialize, Serialize};

use crate::logical_plan::{AggExpr, BinaryOp, Expr, LiteralValue, LogicalPlan};

/// Schema knowledge about a relation.
///
/// `Unknown` (no declared schema) is distinct from `Known` with zero fields.
/// Untyped fields of a known schema carry [`DataType::Binary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationSchema {
    Unknown,
    Known(SchemaRef),
}

impl RelationSchema {
    pub fn known(&self) -> Option<&SchemaRef> {
        match self {
            RelationSchema::Known(s) => Some(s),
            RelationSchema::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, RelationSchema::Known(_))
    }

    /// Index of a field by name; `None` when absent or the schema is unknown.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.known()
            .and_then(|s| s.fields().iter().position(|f| f.name() == name))
    }

    /// Declared type at `index`; `None` when out of range or unknown.
    pub fn field_type(&self, index: usize) -> Option<DataType> {
        self.known()
            .and_then(|s| s.fields().get(index).map(|f| f.data_type().clone()))
    }
}

/// Pure lookup of the schema of a named relation.
pub trait SchemaResolver {
    /// Schema of `alias`; `Unknown` is a valid answer, an undefined alias is an error.
    fn relation_schema(&self, alias: &str) -> Result<RelationSchema>;
}

/// `true` when values of this type still need a cast before typed use.
pub fn is_untyped(dt: &DataType) -> bool {
    matches!(dt, DataType::Binary | DataType::LargeBinary)
}

/// Pig-style type name used in diagnostics.
pub fn type_display(dt: &DataType) -> String {
    match dt {
        DataType::Binary | DataType::LargeBinary => "bytearray".to_string(),
        DataType::Int32 => "int".to_string(),
        DataType::Int64 => "long".to_string(),
        DataType::Float32 => "float".to_string(),
        DataType::Float64 => "double".to_string(),
        DataType::Utf8 | DataType::LargeUtf8 => "chararray".to_string(),
        DataType::Boolean => "boolean".to_string(),
        other => format!("{other:?}"),
    }
}

/// Derive the output schema of an analyzed plan.
///
/// `Relation` nodes must already be inlined; encountering one is a planning error.
pub fn plan_schema(plan: &LogicalPlan) -> Result<RelationSchema> {
    match plan {
        LogicalPlan::Load { schema, .. } => Ok(match schema {
            Some(s) => RelationSchema::Known(s.clone()),
            None => RelationSchema::Unknown,
        }),
        LogicalPlan::Relation { alias } => Err(FlowqError::Planning(format!(
            "relation '{alias}' was not inlined before schema derivation"
        ))),
        LogicalPlan::Filter { input, .. }
        | LogicalPlan::Split { input, .. }
        | LogicalPlan::Limit { input, .. }
        | LogicalPlan::Store { input, .. }
        | LogicalPlan::SideInputs { input, .. } => plan_schema(input),
        LogicalPlan::Projection { exprs, input } => {
            let in_schema = plan_schema(input)?;
            let fields = exprs
                .iter()
                .map(|(e, name)| Ok(Field::new(name, expr_type(e, &in_schema)?, true)))
                .collect::<Result<Vec<_>>>()?;
            Ok(RelationSchema::Known(Arc::new(Schema::new(fields))))
        }
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => {
            let in_schema = plan_schema(input)?;
            let mut fields = Vec::with_capacity(group_exprs.len() + aggr_exprs.len());
            for g in group_exprs {
                fields.push(Field::new(expr_name(g), expr_type(g, &in_schema)?, true));
            }
            for (agg, name) in aggr_exprs {
                fields.push(Field::new(name, agg_type(agg, &in_schema)?, true));
            }
            Ok(RelationSchema::Known(Arc::new(Schema::new(fields))))
        }
        LogicalPlan::Join { left, right, .. } => {
            match (plan_schema(left)?, plan_schema(right)?) {
                (RelationSchema::Known(l), RelationSchema::Known(r)) => {
                    let fields = l
                        .fields()
                        .iter()
                        .chain(r.fields().iter())
                        .map(|f| f.as_ref().clone())
                        .collect::<Vec<_>>();
                    Ok(RelationSchema::Known(Arc::new(Schema::new(fields))))
                }
                _ => Ok(RelationSchema::Unknown),
            }
        }
    }
}

/// Type of an analyzed expression evaluated against `input`.
pub fn expr_type(expr: &Expr, input: &RelationSchema) -> Result<DataType> {
    match expr {
        Expr::ColumnRef { index, .. } => Ok(input.field_type(*index).unwrap_or(DataType::Binary)),
        Expr::Position(index) => Ok(input.field_type(*index).unwrap_or(DataType::Binary)),
        Expr::Column(name) => input
            .field_index(name)
            .and_then(|i| input.field_type(i))
            .ok_or_else(|| FlowqError::Planning(format!("unresolved column: {name}"))),
        Expr::Literal(v) => Ok(literal_type(v)),
        Expr::Cast { to_type, .. } => Ok(to_type.clone()),
        Expr::And(..) | Expr::Or(..) | Expr::Not(_) => Ok(DataType::Boolean),
        Expr::BinaryOp { left, op, .. } => {
            if op.is_comparison() {
                Ok(DataType::Boolean)
            } else if *op == BinaryOp::Concat {
                Ok(DataType::Utf8)
            } else {
                expr_type(left, input)
            }
        }
        Expr::Placeholder(p) => Ok(p.data_type.clone()),
        Expr::ScalarRef { alias, field } => Err(FlowqError::Planning(format!(
            "scalar reference {alias}.{field} was not rewritten"
        ))),
        Expr::RelationRef(alias) => Err(FlowqError::scalar_projection_only(alias)),
    }
}

pub(crate) fn agg_type(agg: &AggExpr, input: &RelationSchema) -> Result<DataType> {
    Ok(match agg {
        AggExpr::Count(_) => DataType::Int64,
        AggExpr::Avg(_) => DataType::Float64,
        AggExpr::Sum(e) | AggExpr::Min(e) | AggExpr::Max(e) => expr_type(e, input)?,
    })
}

pub(crate) fn literal_type(v: &LiteralValue) -> DataType {
    match v {
        LiteralValue::Int64(_) => DataType::Int64,
        LiteralValue::Float64(_) => DataType::Float64,
        LiteralValue::Utf8(_) => DataType::Utf8,
        LiteralValue::Boolean(_) => DataType::Boolean,
        LiteralValue::Null => DataType::Null,
    }
}

/// Output field name of a grouping expression.
pub fn expr_name(e: &Expr) -> String {
    match e {
        Expr::Column(name) | Expr::ColumnRef { name, .. } => name.clone(),
        Expr::Position(i) => format!("${i}"),
        _ => "group".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema};

    use super::{plan_schema, RelationSchema};
    use crate::logical_plan::{AggExpr, Expr, LiteralValue, LogicalPlan};

    fn load(schema: Option<Vec<(&str, DataType)>>) -> LogicalPlan {
        LogicalPlan::Load {
            source: "t".to_string(),
            schema: schema.map(|fields| {
                Arc::new(Schema::new(
                    fields
                        .into_iter()
                        .map(|(n, dt)| Field::new(n, dt, true))
                        .collect::<Vec<_>>(),
                ))
            }),
        }
    }

    #[test]
    fn unknown_and_empty_schemas_are_distinct() {
        let unknown = plan_schema(&load(None)).expect("schema");
        let empty = plan_schema(&load(Some(vec![]))).expect("schema");
        assert_eq!(unknown, RelationSchema::Unknown);
        assert!(empty.is_known());
        assert_ne!(unknown, empty);
        assert_eq!(empty.field_index("x"), None);
    }

    #[test]
    fn aggregate_over_unknown_input_is_known() {
        let plan = LogicalPlan::Aggregate {
            group_exprs: vec![],
            aggr_exprs: vec![
                (
                    AggExpr::Count(Expr::Literal(LiteralValue::Int64(1))),
                    "count".to_string(),
                ),
                (
                    AggExpr::Avg(Expr::ColumnRef {
                        name: "$1".to_string(),
                        index: 1,
                    }),
                    "average".to_string(),
                ),
            ],
            input: Box::new(load(None)),
        };
        let schema = plan_schema(&plan).expect("schema");
        assert_eq!(schema.field_index("average"), Some(1));
        assert_eq!(schema.field_type(0), Some(DataType::Int64));
        assert_eq!(schema.field_type(1), Some(DataType::Float64));
    }

    #[test]
    fn join_with_unknown_side_is_unknown() {
        let plan = LogicalPlan::Join {
            left: Box::new(load(Some(vec![("a0", DataType::Binary)]))),
            right: Box::new(load(None)),
            on: vec![],
        };
        assert_eq!(plan_schema(&plan).expect("schema"), RelationSchema::Unknown);
    }

    #[test]
    fn unresolved_relation_is_an_error() {
        let plan = LogicalPlan::Relation {
            alias: "C".to_string(),
        };
        assert!(plan_schema(&plan).is_err());
    }
}
