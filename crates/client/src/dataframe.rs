use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use flowq_planner::{AggExpr, Expr, LogicalPlan};

/// Builder for one alias definition.
///
/// A `DataFrame` only describes a relation; it runs when an engine stores or
/// opens the alias it was defined under.
#[derive(Debug, Clone)]
pub struct DataFrame {
    logical_plan: LogicalPlan,
}

impl DataFrame {
    pub fn new(logical_plan: LogicalPlan) -> Self {
        Self { logical_plan }
    }

    /// `LOAD 'source' [AS (...)]`
    pub fn load(source: &str, schema: Option<SchemaRef>) -> Self {
        Self::new(LogicalPlan::Load {
            source: source.to_string(),
            schema,
        })
    }

    /// Another alias of the script, used as a relation input.
    pub fn relation(alias: &str) -> Self {
        Self::new(LogicalPlan::Relation {
            alias: alias.to_string(),
        })
    }

    pub fn logical_plan(&self) -> &LogicalPlan {
        &self.logical_plan
    }

    pub fn into_plan(self) -> LogicalPlan {
        self.logical_plan
    }

    /// `FILTER df BY predicate`
    pub fn filter(self, predicate: Expr) -> Self {
        Self::new(LogicalPlan::Filter {
            predicate,
            input: Box::new(self.logical_plan),
        })
    }

    /// One branch of `SPLIT df INTO branch IF predicate, ...`
    pub fn split_branch(self, branch: &str, predicate: Expr) -> Self {
        Self::new(LogicalPlan::Split {
            branch: branch.to_string(),
            predicate,
            input: Box::new(self.logical_plan),
        })
    }

    /// `FOREACH df GENERATE expr AS name, ...`
    pub fn project(self, exprs: Vec<(Expr, &str)>) -> Self {
        Self::new(LogicalPlan::Projection {
            exprs: exprs
                .into_iter()
                .map(|(e, name)| (e, name.to_string()))
                .collect(),
            input: Box::new(self.logical_plan),
        })
    }

    /// `GROUP df ALL` followed by aggregates.
    pub fn group_all(self, aggs: Vec<(AggExpr, &str)>) -> Self {
        self.group_by(vec![], aggs)
    }

    /// `GROUP df BY keys` followed by aggregates.
    pub fn group_by(self, keys: Vec<Expr>, aggs: Vec<(AggExpr, &str)>) -> Self {
        Self::new(LogicalPlan::Aggregate {
            group_exprs: keys,
            aggr_exprs: aggs
                .into_iter()
                .map(|(a, name)| (a, name.to_string()))
                .collect(),
            input: Box::new(self.logical_plan),
        })
    }

    /// `JOIN df BY left_key, right BY right_key`
    pub fn join(self, right: DataFrame, on: Vec<(Expr, Expr)>) -> Self {
        Self::new(LogicalPlan::Join {
            left: Box::new(self.logical_plan),
            right: Box::new(right.logical_plan),
            on,
        })
    }

    pub fn limit(self, n: usize) -> Self {
        Self::new(LogicalPlan::Limit {
            n,
            input: Box::new(self.logical_plan),
        })
    }
}

impl From<DataFrame> for LogicalPlan {
    fn from(df: DataFrame) -> Self {
        df.logical_plan
    }
}

/// Schema with declared types, as in `AS (a0: long, a1: double)`.
pub fn typed_schema(fields: &[(&str, DataType)]) -> SchemaRef {
    Arc::new(Schema::new(
        fields
            .iter()
            .map(|(name, dt)| Field::new(*name, dt.clone(), true))
            .collect::<Vec<_>>(),
    ))
}

/// Schema with names only, as in `AS (count, total)`; every field is untyped.
pub fn untyped_schema(names: &[&str]) -> SchemaRef {
    Arc::new(Schema::new(
        names
            .iter()
            .map(|name| Field::new(*name, DataType::Binary, true))
            .collect::<Vec<_>>(),
    ))
}
