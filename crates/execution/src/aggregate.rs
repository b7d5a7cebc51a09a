//! Single-phase hash aggregation.
//!
//! Groups appear in first-seen order. An empty `group_exprs` list aggregates
//! the whole input into one group; an empty input produces no group at all,
//! so a scalar built from `GROUP ... ALL` over nothing binds empty.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema};
use flowq_common::{FlowqError, Result};
use flowq_planner::{expr_name, AggExpr, Expr};

use crate::executor::ExecOutput;
use crate::expressions::{compile_expr, PhysicalExpr};
use crate::scalar::{scalar_from_array, scalars_to_array, ScalarValue};
use crate::scalar_broadcast::ScalarBindings;

#[derive(Debug, Clone)]
enum AggState {
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Min(Option<ScalarValue>),
    Max(Option<ScalarValue>),
    Avg { sum: f64, count: i64 },
}

struct AggSpec {
    expr: AggExpr,
    name: String,
    input: Arc<dyn PhysicalExpr>,
    out_type: DataType,
}

struct GroupEntry {
    key: Vec<ScalarValue>,
    states: Vec<AggState>,
}

/// Aggregate `child` by `group_exprs`; output columns are the group keys
/// followed by the aggregates.
pub fn run_hash_aggregate(
    child: &ExecOutput,
    group_exprs: &[Expr],
    aggr_exprs: &[(AggExpr, String)],
    bindings: &ScalarBindings,
) -> Result<ExecOutput> {
    let input_schema = &child.schema;
    let groups_compiled = group_exprs
        .iter()
        .map(|g| compile_expr(g, input_schema, bindings))
        .collect::<Result<Vec<_>>>()?;
    let specs = aggr_exprs
        .iter()
        .map(|(agg, name)| {
            let input = compile_expr(agg.input(), input_schema, bindings)?;
            let out_type = match agg {
                AggExpr::Count(_) => DataType::Int64,
                AggExpr::Avg(_) => DataType::Float64,
                AggExpr::Sum(_) | AggExpr::Min(_) | AggExpr::Max(_) => input.data_type(),
            };
            Ok(AggSpec {
                expr: agg.clone(),
                name: name.clone(),
                input,
                out_type,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut order: Vec<GroupEntry> = Vec::new();
    let mut index: HashMap<Vec<ScalarValue>, usize> = HashMap::new();

    for batch in &child.batches {
        let keys = groups_compiled
            .iter()
            .map(|g| g.evaluate(batch))
            .collect::<Result<Vec<ArrayRef>>>()?;
        let inputs = specs
            .iter()
            .map(|s| s.input.evaluate(batch))
            .collect::<Result<Vec<ArrayRef>>>()?;

        for row in 0..batch.num_rows() {
            let key = keys
                .iter()
                .map(|k| scalar_from_array(k, row))
                .collect::<Result<Vec<_>>>()?;
            let slot = match index.get(&key) {
                Some(slot) => *slot,
                None => {
                    order.push(GroupEntry {
                        key: key.clone(),
                        states: init_states(&specs),
                    });
                    index.insert(key, order.len() - 1);
                    order.len() - 1
                }
            };
            let entry = &mut order[slot];
            for (aidx, input) in inputs.iter().enumerate() {
                let value = scalar_from_array(input, row)?;
                update_state(&mut entry.states[aidx], value)?;
            }
        }
    }

    build_output(order, &specs, group_exprs, &groups_compiled)
}

fn init_states(specs: &[AggSpec]) -> Vec<AggState> {
    specs
        .iter()
        .map(|s| match s.expr {
            AggExpr::Count(_) => AggState::Count(0),
            AggExpr::Sum(_) => match s.out_type {
                DataType::Int64 => AggState::SumInt(None),
                _ => AggState::SumFloat(None),
            },
            AggExpr::Min(_) => AggState::Min(None),
            AggExpr::Max(_) => AggState::Max(None),
            AggExpr::Avg(_) => AggState::Avg { sum: 0.0, count: 0 },
        })
        .collect()
}

fn update_state(state: &mut AggState, value: ScalarValue) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    match state {
        AggState::Count(acc) => {
            *acc = acc
                .checked_add(1)
                .ok_or_else(|| FlowqError::Execution("count overflow".to_string()))?;
        }
        AggState::SumInt(acc) => {
            if let ScalarValue::Int64(v) = value {
                let next = acc.unwrap_or(0).checked_add(v).ok_or_else(|| {
                    FlowqError::Execution("integer overflow in SUM".to_string())
                })?;
                *acc = Some(next);
            }
        }
        AggState::SumFloat(acc) => {
            if let Some(v) = value.as_f64() {
                *acc = Some(acc.unwrap_or(0.0) + v);
            }
        }
        AggState::Min(cur) => {
            let replace = match cur {
                Some(existing) => value.compare(existing)?.is_lt(),
                None => true,
            };
            if replace {
                *cur = Some(value);
            }
        }
        AggState::Max(cur) => {
            let replace = match cur {
                Some(existing) => value.compare(existing)?.is_gt(),
                None => true,
            };
            if replace {
                *cur = Some(value);
            }
        }
        AggState::Avg { sum, count } => {
            if let Some(v) = value.as_f64() {
                *sum += v;
                *count += 1;
            }
        }
    }
    Ok(())
}

fn state_to_scalar(state: &AggState) -> ScalarValue {
    match state {
        AggState::Count(v) => ScalarValue::Int64(*v),
        AggState::SumInt(v) => v.map(ScalarValue::Int64).unwrap_or(ScalarValue::Null),
        AggState::SumFloat(v) => v
            .map(|x| ScalarValue::Float64Bits(x.to_bits()))
            .unwrap_or(ScalarValue::Null),
        AggState::Min(v) | AggState::Max(v) => v.clone().unwrap_or(ScalarValue::Null),
        AggState::Avg { sum, count } => {
            if *count == 0 {
                ScalarValue::Null
            } else {
                ScalarValue::Float64Bits((sum / (*count as f64)).to_bits())
            }
        }
    }
}

fn build_output(
    groups: Vec<GroupEntry>,
    specs: &[AggSpec],
    group_exprs: &[Expr],
    groups_compiled: &[Arc<dyn PhysicalExpr>],
) -> Result<ExecOutput> {
    let mut fields = Vec::<Field>::new();
    let mut cols = Vec::<Vec<ScalarValue>>::new();

    for (gidx, g) in group_exprs.iter().enumerate() {
        fields.push(Field::new(
            expr_name(g),
            groups_compiled[gidx].data_type(),
            true,
        ));
        cols.push(groups.iter().map(|e| e.key[gidx].clone()).collect());
    }
    for (aidx, spec) in specs.iter().enumerate() {
        fields.push(Field::new(&spec.name, spec.out_type.clone(), true));
        cols.push(
            groups
                .iter()
                .map(|e| state_to_scalar(&e.states[aidx]))
                .collect(),
        );
    }

    let schema = Arc::new(Schema::new(fields));
    if groups.is_empty() {
        return Ok(ExecOutput {
            schema,
            batches: Vec::new(),
        });
    }
    let arrays = cols
        .iter()
        .enumerate()
        .map(|(idx, col)| scalars_to_array(col, schema.field(idx).data_type()))
        .collect::<Result<Vec<_>>>()?;
    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| FlowqError::Execution(format!("aggregate output batch failed: {e}")))?;
    Ok(ExecOutput {
        schema,
        batches: vec![batch],
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};
    use flowq_planner::{AggExpr, Expr};

    use super::run_hash_aggregate;
    use crate::executor::ExecOutput;
    use crate::scalar::{scalar_from_array, ScalarValue};
    use crate::scalar_broadcast::ScalarBindings;

    fn col(name: &str, index: usize) -> Expr {
        Expr::ColumnRef {
            name: name.to_string(),
            index,
        }
    }

    fn input(batches: usize) -> ExecOutput {
        let schema = Arc::new(Schema::new(vec![
            Field::new("k", DataType::Utf8, true),
            Field::new("a0", DataType::Int64, true),
            Field::new("a1", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["x", "y", "x"])),
                Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])),
                Arc::new(Float64Array::from(vec![5.0, 10.0, 20.0])),
            ],
        )
        .expect("batch");
        ExecOutput {
            schema,
            batches: vec![batch; batches],
        }
    }

    fn aggs() -> Vec<(AggExpr, String)> {
        vec![
            (AggExpr::Count(col("a0", 1)), "count".to_string()),
            (AggExpr::Max(col("a1", 2)), "max".to_string()),
            (AggExpr::Sum(col("a0", 1)), "total".to_string()),
        ]
    }

    #[test]
    fn group_all_produces_one_row() {
        let out = run_hash_aggregate(&input(1), &[], &aggs(), &ScalarBindings::new())
            .expect("aggregate");
        assert_eq!(out.batches.len(), 1);
        let b = &out.batches[0];
        assert_eq!(b.num_rows(), 1);
        assert_eq!(scalar_from_array(b.column(0), 0).expect("count"), ScalarValue::Int64(2));
        assert_eq!(
            scalar_from_array(b.column(1), 0).expect("max").to_string(),
            "20.0"
        );
        assert_eq!(scalar_from_array(b.column(2), 0).expect("sum"), ScalarValue::Int64(4));
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let out = run_hash_aggregate(&input(2), &[col("k", 0)], &aggs(), &ScalarBindings::new())
            .expect("aggregate");
        let b = &out.batches[0];
        assert_eq!(out.schema.field(0).name(), "k");
        assert_eq!(b.num_rows(), 2);
        assert_eq!(
            scalar_from_array(b.column(0), 0).expect("key"),
            ScalarValue::Utf8("x".to_string())
        );
        assert_eq!(scalar_from_array(b.column(1), 0).expect("count"), ScalarValue::Int64(4));
        // Only nulls were summed for "y".
        assert_eq!(scalar_from_array(b.column(3), 1).expect("sum"), ScalarValue::Null);
    }

    #[test]
    fn empty_input_produces_no_group() {
        let out = run_hash_aggregate(&input(0), &[], &aggs(), &ScalarBindings::new())
            .expect("aggregate");
        assert!(out.batches.is_empty());
        assert_eq!(out.schema.fields().len(), 3);
    }
}
