use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use flowq_common::{FlowqError, Result};
use tracing::debug;

use crate::logical_plan::{AggExpr, BinaryOp, Expr, LogicalPlan};
use crate::schema_resolver::{
    expr_name, is_untyped, literal_type, type_display, RelationSchema, SchemaResolver,
};

/// The analyzer needs the compiled form of every alias a plan reads.
/// The unit compiler provides this from its cache.
pub trait RelationProvider: SchemaResolver {
    /// Compiled (analyzed) plan of a previously compiled alias.
    fn compiled_plan(&self, alias: &str) -> Result<LogicalPlan>;

    /// `true` when `name` is an alias defined in the script.
    fn defines(&self, name: &str) -> bool;
}

/// Logical-plan semantic analyzer.
#[derive(Debug, Default, Clone, Copy)]
pub struct Analyzer;

impl Analyzer {
    /// Create a new analyzer.
    pub fn new() -> Self {
        Self
    }

    /// Analyze a rewritten logical plan and return it with its output schema.
    ///
    /// Guarantees:
    /// - `Relation` nodes are replaced by the compiled plan of that alias;
    /// - `Expr::Column` / `Expr::Position` become `Expr::ColumnRef`;
    /// - expression/aggregate types are inferred and checked;
    /// - implicit casts are inserted for untyped columns and numeric widening.
    ///
    /// Error taxonomy:
    /// - `TypeCheck(IncompatibleScalarOperand)`: untyped placeholder used by an operator
    /// - `TypeCheck(TypeMismatch)`: any other operand mismatch
    /// - `Resolution(ScalarProjectionOnly)`: an alias used where a field was expected
    /// - `Planning`: unknown columns and other shape errors
    pub fn analyze(
        &self,
        plan: LogicalPlan,
        provider: &dyn RelationProvider,
    ) -> Result<(LogicalPlan, RelationSchema)> {
        let (p, resolver) = self.analyze_plan(plan, provider)?;
        Ok((p, resolver.schema()))
    }

    fn analyze_plan(
        &self,
        plan: LogicalPlan,
        provider: &dyn RelationProvider,
    ) -> Result<(LogicalPlan, Resolver)> {
        match plan {
            LogicalPlan::Load { source, schema } => {
                let resolver = match &schema {
                    Some(s) => Resolver::anonymous(s.clone()),
                    None => Resolver::Unknown,
                };
                Ok((LogicalPlan::Load { source, schema }, resolver))
            }

            LogicalPlan::Relation { alias } => {
                let compiled = provider.compiled_plan(&alias)?;
                let schema = provider.relation_schema(&alias)?;
                debug!(alias = %alias, known = schema.is_known(), "inlined relation");
                Ok((compiled, Resolver::from_relation(&alias, &schema)))
            }

            LogicalPlan::Filter { predicate, input } => {
                let (ain, resolver) = self.analyze_plan(*input, provider)?;
                let pred = self.analyze_predicate("FILTER", predicate, &resolver, provider)?;
                Ok((
                    LogicalPlan::Filter {
                        predicate: pred,
                        input: Box::new(ain),
                    },
                    resolver,
                ))
            }

            LogicalPlan::Split {
                branch,
                predicate,
                input,
            } => {
                let (ain, resolver) = self.analyze_plan(*input, provider)?;
                let pred = self.analyze_predicate("SPLIT", predicate, &resolver, provider)?;
                Ok((
                    LogicalPlan::Split {
                        branch,
                        predicate: pred,
                        input: Box::new(ain),
                    },
                    resolver,
                ))
            }

            LogicalPlan::Projection { exprs, input } => {
                let (ain, in_resolver) = self.analyze_plan(*input, provider)?;

                let mut out_fields: Vec<Field> = vec![];
                let mut out_exprs: Vec<(Expr, String)> = vec![];

                for (e, name) in exprs {
                    let (ae, dt) = self.analyze_expr(e, &in_resolver, provider)?;
                    out_fields.push(Field::new(&name, dt, true));
                    out_exprs.push((ae, name));
                }

                let out_schema = Arc::new(Schema::new(out_fields));
                Ok((
                    LogicalPlan::Projection {
                        exprs: out_exprs,
                        input: Box::new(ain),
                    },
                    Resolver::anonymous(out_schema),
                ))
            }

            LogicalPlan::Aggregate {
                group_exprs,
                aggr_exprs,
                input,
            } => {
                let (ain, in_resolver) = self.analyze_plan(*input, provider)?;

                let mut out_fields: Vec<Field> = vec![];
                let mut out_group: Vec<Expr> = vec![];
                for g in group_exprs {
                    let (ag, dt) = self.analyze_expr(g, &in_resolver, provider)?;
                    out_fields.push(Field::new(expr_name(&ag), dt, true));
                    out_group.push(ag);
                }

                let mut out_aggs: Vec<(AggExpr, String)> = vec![];
                for (agg, name) in aggr_exprs {
                    let (aagg, dt) = self.analyze_agg(agg, &in_resolver, provider)?;
                    out_fields.push(Field::new(&name, dt, true));
                    out_aggs.push((aagg, name));
                }

                let out_schema = Arc::new(Schema::new(out_fields));
                Ok((
                    LogicalPlan::Aggregate {
                        group_exprs: out_group,
                        aggr_exprs: out_aggs,
                        input: Box::new(ain),
                    },
                    Resolver::anonymous(out_schema),
                ))
            }

            LogicalPlan::Join { left, right, on } => {
                let (al, lres) = self.analyze_plan(*left, provider)?;
                let (ar, rres) = self.analyze_plan(*right, provider)?;

                let mut out_on = Vec::with_capacity(on.len());
                for (lk, rk) in on {
                    let (alk, ldt) = self.analyze_expr(lk, &lres, provider)?;
                    let (ark, rdt) = self.analyze_expr(rk, &rres, provider)?;
                    reject_untyped_scalar(BinaryOp::Eq, &alk, &ldt, &ark, &rdt)?;
                    let (cl, cr, _common) = coerce_for_compare(alk, ldt, ark, rdt)?;
                    out_on.push((cl, cr));
                }

                Ok((
                    LogicalPlan::Join {
                        left: Box::new(al),
                        right: Box::new(ar),
                        on: out_on,
                    },
                    Resolver::join(lres, rres),
                ))
            }

            LogicalPlan::Limit { n, input } => {
                let (ain, resolver) = self.analyze_plan(*input, provider)?;
                Ok((
                    LogicalPlan::Limit {
                        n,
                        input: Box::new(ain),
                    },
                    resolver,
                ))
            }

            LogicalPlan::Store { target, input } => {
                let (ain, resolver) = self.analyze_plan(*input, provider)?;
                Ok((
                    LogicalPlan::Store {
                        target,
                        input: Box::new(ain),
                    },
                    resolver,
                ))
            }

            LogicalPlan::SideInputs { side_inputs, input } => {
                let (ain, resolver) = self.analyze_plan(*input, provider)?;
                Ok((
                    LogicalPlan::SideInputs {
                        side_inputs,
                        input: Box::new(ain),
                    },
                    resolver,
                ))
            }
        }
    }

    fn analyze_predicate(
        &self,
        clause: &str,
        predicate: Expr,
        resolver: &Resolver,
        provider: &dyn RelationProvider,
    ) -> Result<Expr> {
        let (pred, t) = self.analyze_expr(predicate, resolver, provider)?;
        if t != DataType::Boolean {
            return Err(FlowqError::type_mismatch(format!(
                "{clause} condition must be boolean, got {}",
                type_display(&t)
            )));
        }
        Ok(pred)
    }

    fn analyze_agg(
        &self,
        agg: AggExpr,
        resolver: &Resolver,
        provider: &dyn RelationProvider,
    ) -> Result<(AggExpr, DataType)> {
        match agg {
            AggExpr::Count(e) => {
                let (ae, _dt) = self.analyze_expr(e, resolver, provider)?;
                Ok((AggExpr::Count(ae), DataType::Int64))
            }
            AggExpr::Sum(e) => {
                let (ae, dt) = self.analyze_expr(e, resolver, provider)?;
                let (ae, dt) = accumulator_input("SUM", ae, dt, false)?;
                Ok((AggExpr::Sum(ae), dt))
            }
            AggExpr::Min(e) => {
                let (ae, dt) = self.analyze_expr(e, resolver, provider)?;
                let (ae, dt) = accumulator_input("MIN", ae, dt, true)?;
                Ok((AggExpr::Min(ae), dt))
            }
            AggExpr::Max(e) => {
                let (ae, dt) = self.analyze_expr(e, resolver, provider)?;
                let (ae, dt) = accumulator_input("MAX", ae, dt, true)?;
                Ok((AggExpr::Max(ae), dt))
            }
            AggExpr::Avg(e) => {
                let (ae, dt) = self.analyze_expr(e, resolver, provider)?;
                let (ae, acc_dt) = accumulator_input("AVG", ae, dt, false)?;
                let target = DataType::Float64;
                Ok((AggExpr::Avg(cast_if_needed(ae, &acc_dt, &target)), target))
            }
        }
    }

    fn analyze_expr(
        &self,
        expr: Expr,
        resolver: &Resolver,
        provider: &dyn RelationProvider,
    ) -> Result<(Expr, DataType)> {
        match expr {
            Expr::Column(name) => match resolver.resolve(&name) {
                Ok((idx, dt)) => Ok((Expr::ColumnRef { name, index: idx }, dt)),
                Err(_) if provider.defines(&name) => {
                    Err(FlowqError::scalar_projection_only(&name))
                }
                Err(e) => Err(e),
            },
            Expr::Position(index) => {
                let (name, dt) = resolver.position(index)?;
                Ok((Expr::ColumnRef { name, index }, dt))
            }
            Expr::ColumnRef { name, index } => {
                let (_, dt) = resolver.position(index)?;
                Ok((Expr::ColumnRef { name, index }, dt))
            }
            Expr::Literal(v) => {
                let dt = literal_type(&v);
                Ok((Expr::Literal(v), dt))
            }
            Expr::Cast { expr, to_type } => {
                let (ae, _dt) = self.analyze_expr(*expr, resolver, provider)?;
                Ok((
                    Expr::Cast {
                        expr: Box::new(ae),
                        to_type: to_type.clone(),
                    },
                    to_type,
                ))
            }
            Expr::And(l, r) => {
                let (al, ldt) = self.analyze_expr(*l, resolver, provider)?;
                let (ar, rdt) = self.analyze_expr(*r, resolver, provider)?;
                if ldt != DataType::Boolean || rdt != DataType::Boolean {
                    return Err(FlowqError::type_mismatch("AND requires boolean operands"));
                }
                Ok((Expr::And(Box::new(al), Box::new(ar)), DataType::Boolean))
            }
            Expr::Or(l, r) => {
                let (al, ldt) = self.analyze_expr(*l, resolver, provider)?;
                let (ar, rdt) = self.analyze_expr(*r, resolver, provider)?;
                if ldt != DataType::Boolean || rdt != DataType::Boolean {
                    return Err(FlowqError::type_mismatch("OR requires boolean operands"));
                }
                Ok((Expr::Or(Box::new(al), Box::new(ar)), DataType::Boolean))
            }
            Expr::Not(e) => {
                let (ae, dt) = self.analyze_expr(*e, resolver, provider)?;
                if dt != DataType::Boolean {
                    return Err(FlowqError::type_mismatch("NOT requires boolean operand"));
                }
                Ok((Expr::Not(Box::new(ae)), DataType::Boolean))
            }
            Expr::BinaryOp { left, op, right } => {
                let (al, ldt) = self.analyze_expr(*left, resolver, provider)?;
                let (ar, rdt) = self.analyze_expr(*right, resolver, provider)?;
                reject_untyped_scalar(op, &al, &ldt, &ar, &rdt)?;

                match op {
                    BinaryOp::Eq
                    | BinaryOp::NotEq
                    | BinaryOp::Lt
                    | BinaryOp::LtEq
                    | BinaryOp::Gt
                    | BinaryOp::GtEq => {
                        let (cl, cr, _common) = coerce_for_compare(al, ldt, ar, rdt)?;
                        Ok((
                            Expr::BinaryOp {
                                left: Box::new(cl),
                                op,
                                right: Box::new(cr),
                            },
                            DataType::Boolean,
                        ))
                    }

                    BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide => {
                        let (cl, cr, out) = coerce_for_arith(op, al, ldt, ar, rdt)?;
                        Ok((
                            Expr::BinaryOp {
                                left: Box::new(cl),
                                op,
                                right: Box::new(cr),
                            },
                            out,
                        ))
                    }

                    BinaryOp::Concat => {
                        let (cl, cr) = coerce_for_concat(al, ldt, ar, rdt)?;
                        Ok((
                            Expr::BinaryOp {
                                left: Box::new(cl),
                                op,
                                right: Box::new(cr),
                            },
                            DataType::Utf8,
                        ))
                    }
                }
            }
            Expr::Placeholder(p) => {
                let dt = p.data_type.clone();
                Ok((Expr::Placeholder(p), dt))
            }
            Expr::ScalarRef { alias, field } => Err(FlowqError::Planning(format!(
                "scalar reference {alias}.{field} must be rewritten before analysis"
            ))),
            Expr::RelationRef(alias) => Err(FlowqError::scalar_projection_only(&alias)),
        }
    }
}

// -------------------------
// Resolver (name -> idx, dt)
// -------------------------

#[derive(Debug, Clone)]
struct Relation {
    name: String,
    fields: Vec<Arc<Field>>,
}

#[derive(Debug, Clone)]
enum Resolver {
    Known(Vec<Relation>),
    /// Input without a declared schema: only positional access is possible.
    Unknown,
}

impl Resolver {
    fn from_relation(alias: &str, schema: &RelationSchema) -> Self {
        match schema {
            RelationSchema::Known(s) => Resolver::Known(vec![Relation {
                name: alias.to_string(),
                fields: s.fields().iter().cloned().collect(),
            }]),
            RelationSchema::Unknown => Resolver::Unknown,
        }
    }

    fn anonymous(schema: SchemaRef) -> Self {
        Resolver::Known(vec![Relation {
            name: "".to_string(),
            fields: schema.fields().iter().cloned().collect(),
        }])
    }

    fn join(left: Resolver, right: Resolver) -> Self {
        match (left, right) {
            (Resolver::Known(mut l), Resolver::Known(r)) => {
                l.extend(r);
                Resolver::Known(l)
            }
            _ => Resolver::Unknown,
        }
    }

    fn schema(&self) -> RelationSchema {
        match self {
            Resolver::Known(relations) => {
                let fields = relations
                    .iter()
                    .flat_map(|r| r.fields.iter().map(|f| f.as_ref().clone()))
                    .collect::<Vec<_>>();
                RelationSchema::Known(Arc::new(Schema::new(fields)))
            }
            Resolver::Unknown => RelationSchema::Unknown,
        }
    }

    fn resolve(&self, col: &str) -> Result<(usize, DataType)> {
        let Resolver::Known(relations) = self else {
            return Err(FlowqError::Planning(format!(
                "cannot resolve field '{col}': relation has no schema, use a positional reference"
            )));
        };
        let (rel_opt, name) = split_qual(col);

        let mut found: Vec<(usize, DataType)> = vec![];
        let mut base = 0usize;

        for r in relations {
            let rel_match = match rel_opt {
                Some(rel) => r.name == rel,
                None => true,
            };

            if rel_match {
                for (i, f) in r.fields.iter().enumerate() {
                    if f.name() == name {
                        found.push((base + i, f.data_type().clone()));
                    }
                }
            }
            base += r.fields.len();
        }

        match found.len() {
            0 => Err(FlowqError::Planning(format!("unknown column: {col}"))),
            1 => Ok(found[0].clone()),
            _ => Err(FlowqError::Planning(format!(
                "ambiguous column reference: {col} (use alias::col)"
            ))),
        }
    }

    /// Name and type at a position; untyped `$N` when the input has no schema.
    fn position(&self, idx: usize) -> Result<(String, DataType)> {
        let Resolver::Known(relations) = self else {
            return Ok((format!("${idx}"), DataType::Binary));
        };
        let mut base = 0usize;
        for r in relations {
            if idx < base + r.fields.len() {
                let f = &r.fields[idx - base];
                return Ok((f.name().clone(), f.data_type().clone()));
            }
            base += r.fields.len();
        }
        Err(FlowqError::Planning(format!(
            "column position ${idx} out of range ({base} fields)"
        )))
    }
}

fn split_qual(s: &str) -> (Option<&str>, &str) {
    if let Some((a, b)) = s.split_once("::") {
        (Some(a), b)
    } else {
        (None, s)
    }
}

// -------------------------
// Type inference + casts
// -------------------------

/// An untyped scalar must be cast before it meets a typed operator.
fn reject_untyped_scalar(
    op: BinaryOp,
    left: &Expr,
    ldt: &DataType,
    right: &Expr,
    rdt: &DataType,
) -> Result<()> {
    let untyped = |e: &Expr| matches!(e, Expr::Placeholder(p) if !p.typed);
    if untyped(left) || untyped(right) {
        return Err(FlowqError::incompatible_scalar_operand(
            op.display_name(),
            &type_display(ldt),
            &type_display(rdt),
        ));
    }
    Ok(())
}

/// Normalize an accumulator input: untyped values become doubles, integers
/// accumulate as `Int64`, floats as `Float64`.
fn accumulator_input(
    func: &str,
    expr: Expr,
    dt: DataType,
    allow_strings: bool,
) -> Result<(Expr, DataType)> {
    let target = if is_untyped(&dt) {
        DataType::Float64
    } else if is_integer(&dt) {
        DataType::Int64
    } else if is_numeric(&dt) {
        DataType::Float64
    } else if allow_strings && matches!(dt, DataType::Utf8 | DataType::LargeUtf8) {
        DataType::Utf8
    } else {
        return Err(FlowqError::type_mismatch(format!(
            "{func}() does not accept {}",
            type_display(&dt)
        )));
    };
    Ok((cast_if_needed(expr, &dt, &target), target))
}

fn is_integer(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn is_numeric(dt: &DataType) -> bool {
    is_integer(dt) || matches!(dt, DataType::Float32 | DataType::Float64)
}

fn numeric_rank(dt: &DataType) -> Option<u8> {
    Some(match dt {
        DataType::Int8 => 1,
        DataType::Int16 => 2,
        DataType::Int32 => 3,
        DataType::Int64 => 4,
        DataType::UInt8 => 1,
        DataType::UInt16 => 2,
        DataType::UInt32 => 3,
        DataType::UInt64 => 4,
        DataType::Float32 => 5,
        DataType::Float64 => 6,
        _ => return None,
    })
}

fn wider_numeric(a: &DataType, b: &DataType) -> Option<DataType> {
    let ra = numeric_rank(a)?;
    let rb = numeric_rank(b)?;
    if ra >= rb {
        Some(a.clone())
    } else {
        Some(b.clone())
    }
}

fn cast_if_needed(expr: Expr, from: &DataType, to: &DataType) -> Expr {
    if from == to {
        expr
    } else {
        Expr::Cast {
            expr: Box::new(expr),
            to_type: to.clone(),
        }
    }
}

fn coerce_for_compare(
    left: Expr,
    ldt: DataType,
    right: Expr,
    rdt: DataType,
) -> Result<(Expr, Expr, DataType)> {
    // Null can be cast to the other side.
    if ldt == DataType::Null {
        return Ok((cast_if_needed(left, &ldt, &rdt), right, rdt));
    }
    if rdt == DataType::Null {
        return Ok((left, cast_if_needed(right, &rdt, &ldt), ldt));
    }

    // Untyped columns take the type of the other side.
    if is_untyped(&ldt) && !is_untyped(&rdt) {
        return Ok((cast_if_needed(left, &ldt, &rdt), right, rdt));
    }
    if is_untyped(&rdt) && !is_untyped(&ldt) {
        return Ok((left, cast_if_needed(right, &rdt, &ldt), ldt));
    }

    if is_numeric(&ldt) && is_numeric(&rdt) {
        let target = wider_numeric(&ldt, &rdt).ok_or_else(|| {
            FlowqError::Planning("failed to determine numeric widening type".to_string())
        })?;
        return Ok((
            cast_if_needed(left, &ldt, &target),
            cast_if_needed(right, &rdt, &target),
            target,
        ));
    }

    if matches!(ldt, DataType::Utf8 | DataType::LargeUtf8)
        && matches!(rdt, DataType::Utf8 | DataType::LargeUtf8)
    {
        let target = if ldt == DataType::LargeUtf8 || rdt == DataType::LargeUtf8 {
            DataType::LargeUtf8
        } else {
            DataType::Utf8
        };
        return Ok((
            cast_if_needed(left, &ldt, &target),
            cast_if_needed(right, &rdt, &target),
            target,
        ));
    }

    if ldt == rdt {
        return Ok((left, right, ldt));
    }

    Err(FlowqError::type_mismatch(format!(
        "cannot compare {} with {}",
        type_display(&ldt),
        type_display(&rdt)
    )))
}

fn coerce_for_arith(
    op: BinaryOp,
    left: Expr,
    ldt: DataType,
    right: Expr,
    rdt: DataType,
) -> Result<(Expr, Expr, DataType)> {
    let target = match (is_untyped(&ldt), is_untyped(&rdt)) {
        (true, true) => Some(DataType::Float64),
        (true, false) if is_numeric(&rdt) => Some(rdt.clone()),
        (false, true) if is_numeric(&ldt) => Some(ldt.clone()),
        // Integer division stays integral.
        (false, false) => wider_numeric(&ldt, &rdt),
        _ => None,
    };
    let Some(target) = target else {
        return Err(FlowqError::type_mismatch(format!(
            "incompatible types in {} operator: left hand side {}, right hand side {}",
            op.display_name(),
            type_display(&ldt),
            type_display(&rdt)
        )));
    };
    Ok((
        cast_if_needed(left, &ldt, &target),
        cast_if_needed(right, &rdt, &target),
        target,
    ))
}

fn coerce_for_concat(
    left: Expr,
    ldt: DataType,
    right: Expr,
    rdt: DataType,
) -> Result<(Expr, Expr)> {
    let stringish = |dt: &DataType| matches!(dt, DataType::Utf8 | DataType::LargeUtf8) || is_untyped(dt);
    if !stringish(&ldt) || !stringish(&rdt) {
        return Err(FlowqError::type_mismatch(format!(
            "incompatible types in {} operator: left hand side {}, right hand side {}",
            BinaryOp::Concat.display_name(),
            type_display(&ldt),
            type_display(&rdt)
        )));
    }
    Ok((
        cast_if_needed(left, &ldt, &DataType::Utf8),
        cast_if_needed(right, &rdt, &DataType::Utf8),
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema};
    use flowq_common::{ErrorCode, FlowqError, Result, SideInputId};

    use super::{Analyzer, RelationProvider};
    use crate::logical_plan::{
        AggExpr, BinaryOp, Expr, LiteralValue, LogicalPlan, PlaceholderBinding,
    };
    use crate::schema_resolver::{plan_schema, RelationSchema, SchemaResolver};

    #[derive(Default)]
    struct TestProvider {
        relations: HashMap<String, (LogicalPlan, RelationSchema)>,
    }

    impl TestProvider {
        fn with_load(mut self, alias: &str, fields: Option<Vec<(&str, DataType)>>) -> Self {
            let schema = fields.map(|f| {
                Arc::new(Schema::new(
                    f.into_iter()
                        .map(|(n, dt)| Field::new(n, dt, true))
                        .collect::<Vec<_>>(),
                ))
            });
            let rel = match &schema {
                Some(s) => RelationSchema::Known(s.clone()),
                None => RelationSchema::Unknown,
            };
            self.relations.insert(
                alias.to_string(),
                (
                    LogicalPlan::Load {
                        source: alias.to_lowercase(),
                        schema,
                    },
                    rel,
                ),
            );
            self
        }
    }

    impl SchemaResolver for TestProvider {
        fn relation_schema(&self, alias: &str) -> Result<RelationSchema> {
            self.relations
                .get(alias)
                .map(|(_, s)| s.clone())
                .ok_or_else(|| FlowqError::Planning(format!("unknown alias: {alias}")))
        }
    }

    impl RelationProvider for TestProvider {
        fn compiled_plan(&self, alias: &str) -> Result<LogicalPlan> {
            self.relations
                .get(alias)
                .map(|(p, _)| p.clone())
                .ok_or_else(|| FlowqError::Planning(format!("unknown alias: {alias}")))
        }

        fn defines(&self, name: &str) -> bool {
            self.relations.contains_key(name)
        }
    }

    fn relation(alias: &str) -> Box<LogicalPlan> {
        Box::new(LogicalPlan::Relation {
            alias: alias.to_string(),
        })
    }

    fn placeholder(index: usize, data_type: DataType) -> Expr {
        Expr::Placeholder(PlaceholderBinding {
            side_input: SideInputId(0),
            alias: "scalar".to_string(),
            index,
            typed: data_type != DataType::Binary,
            data_type,
        })
    }

    fn div(left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp {
            left: Box::new(left),
            op: BinaryOp::Divide,
            right: Box::new(right),
        }
    }

    #[test]
    fn untyped_scalar_in_division_is_incompatible_operand() {
        let provider = TestProvider::default().with_load("A", None);
        let plan = LogicalPlan::Projection {
            exprs: vec![(
                div(
                    Expr::Literal(LiteralValue::Int64(5)),
                    placeholder(1, DataType::Binary),
                ),
                "q".to_string(),
            )],
            input: relation("A"),
        };
        let err = Analyzer::new()
            .analyze(plan, &provider)
            .expect_err("must fail");
        assert_eq!(err.code().map(|c| c.as_u32()), Some(1039));
        let msg = err.to_string();
        assert!(msg.contains("Division"), "msg={msg}");
        assert!(msg.contains("left hand side long"), "msg={msg}");
        assert!(msg.contains("right hand side bytearray"), "msg={msg}");
    }

    #[test]
    fn cast_untyped_scalar_takes_cast_type_and_division_stays_integral() {
        let provider = TestProvider::default().with_load("A", None);
        let plan = LogicalPlan::Projection {
            exprs: vec![(
                div(
                    Expr::Literal(LiteralValue::Int64(5)),
                    Expr::Cast {
                        expr: Box::new(placeholder(1, DataType::Binary)),
                        to_type: DataType::Int32,
                    },
                ),
                "q".to_string(),
            )],
            input: relation("A"),
        };
        let (_plan, schema) = Analyzer::new().analyze(plan, &provider).expect("analyze");
        assert_eq!(schema.field_type(0), Some(DataType::Int64));
    }

    #[test]
    fn typed_scalar_keeps_declared_type_and_promotes() {
        let provider = TestProvider::default()
            .with_load("A", Some(vec![("a0", DataType::Int64), ("a1", DataType::Float64)]));
        let plan = LogicalPlan::Projection {
            exprs: vec![
                (
                    Expr::BinaryOp {
                        left: Box::new(Expr::Column("a0".to_string())),
                        op: BinaryOp::Multiply,
                        right: Box::new(placeholder(0, DataType::Int64)),
                    },
                    "x".to_string(),
                ),
                (
                    Expr::BinaryOp {
                        left: Box::new(Expr::Column("a0".to_string())),
                        op: BinaryOp::Plus,
                        right: Box::new(placeholder(1, DataType::Float64)),
                    },
                    "y".to_string(),
                ),
            ],
            input: relation("A"),
        };
        let (analyzed, schema) = Analyzer::new().analyze(plan, &provider).expect("analyze");
        assert_eq!(schema.field_type(0), Some(DataType::Int64));
        assert_eq!(schema.field_type(1), Some(DataType::Float64));
        assert_eq!(plan_schema(&analyzed).expect("schema"), schema);
    }

    #[test]
    fn untyped_column_is_cast_to_scalar_type() {
        let provider = TestProvider::default()
            .with_load("A", Some(vec![("a0", DataType::Binary), ("a1", DataType::Binary)]));
        let plan = LogicalPlan::Filter {
            predicate: Expr::BinaryOp {
                left: Box::new(Expr::Column("a1".to_string())),
                op: BinaryOp::Gt,
                right: Box::new(placeholder(0, DataType::Float64)),
            },
            input: relation("A"),
        };
        let (analyzed, _schema) = Analyzer::new().analyze(plan, &provider).expect("analyze");
        let LogicalPlan::Filter { predicate, .. } = analyzed else {
            panic!("expected filter");
        };
        let Expr::BinaryOp { left, .. } = predicate else {
            panic!("expected comparison");
        };
        assert!(matches!(
            *left,
            Expr::Cast {
                to_type: DataType::Float64,
                ..
            }
        ));
    }

    #[test]
    fn generic_mismatch_uses_type_mismatch_code() {
        let provider = TestProvider::default()
            .with_load("X", Some(vec![("names", DataType::Utf8)]));
        let plan = LogicalPlan::Projection {
            exprs: vec![(
                Expr::BinaryOp {
                    left: Box::new(Expr::Column("names".to_string())),
                    op: BinaryOp::Plus,
                    right: Box::new(Expr::Literal(LiteralValue::Int64(1))),
                },
                "bad".to_string(),
            )],
            input: relation("X"),
        };
        let err = Analyzer::new()
            .analyze(plan, &provider)
            .expect_err("must fail");
        assert_eq!(err.code(), Some(ErrorCode::TypeMismatch));
    }

    #[test]
    fn bare_alias_as_column_is_projection_only_error() {
        let provider = TestProvider::default()
            .with_load("A", Some(vec![("a0", DataType::Int64)]))
            .with_load("C", Some(vec![("count", DataType::Int64)]));
        let plan = LogicalPlan::Projection {
            exprs: vec![(Expr::Column("C".to_string()), "c".to_string())],
            input: relation("A"),
        };
        let err = Analyzer::new()
            .analyze(plan, &provider)
            .expect_err("must fail");
        assert_eq!(err.code(), Some(ErrorCode::ScalarProjectionOnly));
    }

    #[test]
    fn non_boolean_split_condition_rejected() {
        let provider = TestProvider::default()
            .with_load("A", Some(vec![("a0", DataType::Int64)]));
        let plan = LogicalPlan::Split {
            branch: "Y".to_string(),
            predicate: Expr::Column("a0".to_string()),
            input: relation("A"),
        };
        let err = Analyzer::new()
            .analyze(plan, &provider)
            .expect_err("must fail");
        assert_eq!(err.code(), Some(ErrorCode::TypeMismatch));
    }

    #[test]
    fn aggregates_over_untyped_input_accumulate_as_double() {
        let provider = TestProvider::default()
            .with_load("A", Some(vec![("a0", DataType::Binary), ("a1", DataType::Binary)]));
        let plan = LogicalPlan::Aggregate {
            group_exprs: vec![],
            aggr_exprs: vec![
                (
                    AggExpr::Count(Expr::Literal(LiteralValue::Int64(1))),
                    "count".to_string(),
                ),
                (AggExpr::Avg(Expr::Position(1)), "average".to_string()),
                (AggExpr::Max(Expr::Column("a1".to_string())), "max".to_string()),
            ],
            input: relation("A"),
        };
        let (analyzed, schema) = Analyzer::new().analyze(plan, &provider).expect("analyze");
        assert_eq!(schema.field_type(0), Some(DataType::Int64));
        assert_eq!(schema.field_type(1), Some(DataType::Float64));
        assert_eq!(schema.field_type(2), Some(DataType::Float64));
        assert_eq!(plan_schema(&analyzed).expect("schema"), schema);
    }

    #[test]
    fn names_on_unknown_input_fail_but_positions_resolve() {
        let provider = TestProvider::default().with_load("A", None);
        let by_name = LogicalPlan::Projection {
            exprs: vec![(Expr::Column("a0".to_string()), "a0".to_string())],
            input: relation("A"),
        };
        assert!(Analyzer::new().analyze(by_name, &provider).is_err());

        let by_pos = LogicalPlan::Projection {
            exprs: vec![(Expr::Position(3), "p".to_string())],
            input: relation("A"),
        };
        let (_p, schema) = Analyzer::new().analyze(by_pos, &provider).expect("analyze");
        assert_eq!(schema.field_type(0), Some(DataType::Binary));
    }
}
