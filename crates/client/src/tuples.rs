//! Row rendering for results.

use arrow::record_batch::RecordBatch;
use flowq_common::Result;
use flowq_execution::scalar_from_array;

/// Rows as Pig-style tuples: `(3,0.25)`. Nulls render empty.
pub fn render_tuples(batches: &[RecordBatch]) -> Result<Vec<String>> {
    let mut rows = Vec::new();
    for batch in batches {
        for row in 0..batch.num_rows() {
            let cells = batch
                .columns()
                .iter()
                .map(|c| scalar_from_array(c, row).map(|v| v.to_string()))
                .collect::<Result<Vec<_>>>()?;
            rows.push(format!("({})", cells.join(",")));
        }
    }
    Ok(rows)
}
