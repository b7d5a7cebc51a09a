//! In-memory inner hash join.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::concat_batches;
use arrow::compute::kernels::take::take;
use arrow::record_batch::RecordBatch;
use arrow_schema::{Schema, SchemaRef};
use flowq_common::{FlowqError, Result};
use flowq_planner::Expr;

use crate::executor::ExecOutput;
use crate::expressions::compile_expr;
use crate::scalar::{scalar_from_array, ScalarValue};
use crate::scalar_broadcast::ScalarBindings;

/// Join `left` and `right` on key pairs.
///
/// Output columns are left columns followed by right columns. The right side
/// builds the hash table and the left side probes it: output rows follow left
/// order, and for each left row, matches follow right order. Null keys never
/// match.
pub fn run_hash_join(
    left: &ExecOutput,
    right: &ExecOutput,
    on: &[(Expr, Expr)],
    bindings: &ScalarBindings,
) -> Result<ExecOutput> {
    let l = single_batch(left)?;
    let r = single_batch(right)?;
    let left_keys = on.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>();
    let right_keys = on.iter().map(|(_, k)| k.clone()).collect::<Vec<_>>();
    let lk = key_rows(&l, &left_keys, bindings)?;
    let rk = key_rows(&r, &right_keys, bindings)?;

    let mut ht: HashMap<&[ScalarValue], Vec<u32>> = HashMap::new();
    for (idx, key) in rk.iter().enumerate() {
        if key.iter().any(ScalarValue::is_null) {
            continue;
        }
        ht.entry(key.as_slice()).or_default().push(idx as u32);
    }

    let mut left_idx = Vec::new();
    let mut right_idx = Vec::new();
    for (li, key) in lk.iter().enumerate() {
        if key.iter().any(ScalarValue::is_null) {
            continue;
        }
        if let Some(matches) = ht.get(key.as_slice()) {
            for ri in matches {
                left_idx.push(li as u32);
                right_idx.push(*ri);
            }
        }
    }

    let schema: SchemaRef = Arc::new(Schema::new(
        l.schema()
            .fields()
            .iter()
            .chain(r.schema().fields().iter())
            .map(|f| f.as_ref().clone())
            .collect::<Vec<_>>(),
    ));
    if left_idx.is_empty() {
        return Ok(ExecOutput {
            schema,
            batches: Vec::new(),
        });
    }
    let li = UInt32Array::from(left_idx);
    let ri = UInt32Array::from(right_idx);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for col in l.columns() {
        columns.push(take_rows(col, &li)?);
    }
    for col in r.columns() {
        columns.push(take_rows(col, &ri)?);
    }
    let batch = RecordBatch::try_new(schema.clone(), columns)
        .map_err(|e| FlowqError::Execution(format!("join output batch failed: {e}")))?;
    Ok(ExecOutput {
        schema,
        batches: vec![batch],
    })
}

fn single_batch(input: &ExecOutput) -> Result<RecordBatch> {
    concat_batches(&input.schema, &input.batches)
        .map_err(|e| FlowqError::Execution(format!("join input concat failed: {e}")))
}

fn key_rows(
    batch: &RecordBatch,
    keys: &[Expr],
    bindings: &ScalarBindings,
) -> Result<Vec<Vec<ScalarValue>>> {
    let arrays = keys
        .iter()
        .map(|k| compile_expr(k, batch.schema_ref(), bindings)?.evaluate(batch))
        .collect::<Result<Vec<_>>>()?;
    (0..batch.num_rows())
        .map(|row| {
            arrays
                .iter()
                .map(|a| scalar_from_array(a, row))
                .collect::<Result<Vec<_>>>()
        })
        .collect()
}

fn take_rows(col: &ArrayRef, idx: &UInt32Array) -> Result<ArrayRef> {
    take(col.as_ref(), idx, None)
        .map_err(|e| FlowqError::Execution(format!("join take failed: {e}")))
}
