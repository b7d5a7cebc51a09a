//! In-memory tables and their scan node.
//!
//! Loaded data is untyped: every column of a table read from delimited text
//! is `Binary` and named by position (`$0`, `$1`, ...). Declared schemas are
//! applied by the scan operator, not here.

use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryArray};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use flowq_common::{FlowqError, Result};
use flowq_execution::{
    batches_stream, scalar_from_array, scalars_to_array, ExecNode, ScalarValue,
    SendableRecordBatchStream, SharedTaskContext,
};
use tracing::debug;

/// Field separator of the text format.
pub const FIELD_DELIMITER: char = '\t';

/// Rows of one table, kept as Arrow batches.
#[derive(Debug, Clone)]
pub struct MemTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl MemTable {
    /// Table over already built batches. Every batch must match `schema`.
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        if let Some(bad) = batches.iter().find(|b| b.schema() != schema) {
            return Err(FlowqError::InvalidConfig(format!(
                "batch schema {:?} does not match table schema {:?}",
                bad.schema(),
                schema
            )));
        }
        Ok(Self { schema, batches })
    }

    /// Parse tab-separated text, one row per line.
    ///
    /// The table is as wide as its widest line; short lines are padded with
    /// nulls. Blank lines are skipped.
    pub fn from_delimited(text: &str) -> Result<Self> {
        let rows = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.split(FIELD_DELIMITER).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let schema = positional_schema(width);
        if rows.is_empty() {
            return Ok(Self {
                schema,
                batches: Vec::new(),
            });
        }
        let columns = (0..width)
            .map(|idx| {
                let values = rows
                    .iter()
                    .map(|r| r.get(idx).map(|cell| cell.as_bytes()))
                    .collect::<Vec<_>>();
                Arc::new(BinaryArray::from(values)) as ArrayRef
            })
            .collect::<Vec<_>>();
        let batch = RecordBatch::try_new_with_options(
            schema.clone(),
            columns,
            &RecordBatchOptions::new().with_row_count(Some(rows.len())),
        )
        .map_err(|e| FlowqError::InvalidConfig(format!("delimited table: {e}")))?;
        debug!(rows = rows.len(), width, "parsed delimited table");
        Ok(Self {
            schema,
            batches: vec![batch],
        })
    }

    /// Text form of `batches`, the way a `STORE` persists them.
    ///
    /// Names and types are dropped: the result reads back untyped, like any
    /// loaded file.
    pub fn encode_text(source: &SchemaRef, batches: &[RecordBatch]) -> Result<Self> {
        let schema = positional_schema(source.fields().len());
        let mut encoded = Vec::with_capacity(batches.len());
        for batch in batches {
            let columns = batch
                .columns()
                .iter()
                .map(|col| {
                    let values = (0..col.len())
                        .map(|row| scalar_from_array(col, row))
                        .collect::<Result<Vec<ScalarValue>>>()?;
                    scalars_to_array(&values, &DataType::Binary)
                })
                .collect::<Result<Vec<_>>>()?;
            let out = RecordBatch::try_new_with_options(
                schema.clone(),
                columns,
                &RecordBatchOptions::new().with_row_count(Some(batch.num_rows())),
            )
            .map_err(|e| FlowqError::Execution(format!("encoding stored rows failed: {e}")))?;
            encoded.push(out);
        }
        Ok(Self {
            schema,
            batches: encoded,
        })
    }

    /// Render every row as a tab-separated line. Nulls render empty.
    pub fn to_delimited(&self) -> Result<String> {
        let mut out = String::new();
        for batch in &self.batches {
            for row in 0..batch.num_rows() {
                let cells = batch
                    .columns()
                    .iter()
                    .map(|c| scalar_from_array(c, row).map(|v| v.to_string()))
                    .collect::<Result<Vec<_>>>()?;
                out.push_str(&cells.join(&FIELD_DELIMITER.to_string()));
                out.push('\n');
            }
        }
        Ok(out)
    }

    /// Table schema.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Stored batches.
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total row count.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Scan node over a snapshot of this table.
    pub fn scan_node(&self) -> Arc<dyn ExecNode> {
        Arc::new(MemScanNode {
            schema: self.schema.clone(),
            batches: self.batches.clone(),
        })
    }
}

fn positional_schema(width: usize) -> SchemaRef {
    Arc::new(Schema::new(
        (0..width)
            .map(|i| Field::new(format!("${i}"), DataType::Binary, true))
            .collect::<Vec<_>>(),
    ))
}

/// Scan over in-memory batches, re-chunked to the context's batch size.
pub struct MemScanNode {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl ExecNode for MemScanNode {
    fn name(&self) -> &'static str {
        "MemScanNode"
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn execute(&self, ctx: SharedTaskContext) -> Result<SendableRecordBatchStream> {
        let size = ctx.batch_size_rows.max(1);
        let mut out = Vec::new();
        for batch in &self.batches {
            let mut offset = 0;
            while offset < batch.num_rows() {
                let len = size.min(batch.num_rows() - offset);
                out.push(batch.slice(offset, len));
                offset += len;
            }
        }
        Ok(batches_stream(self.schema.clone(), out))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array};
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};
    use flowq_execution::{scalar_from_array, ScalarValue};

    use super::MemTable;

    #[test]
    fn delimited_rows_pad_short_lines_with_null() {
        let t = MemTable::from_delimited("1\t5\n2\n\n3\t20\n").expect("table");
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.schema().field(1).name(), "$1");
        assert_eq!(t.schema().field(1).data_type(), &DataType::Binary);
        let col = t.batches()[0].column(1).clone();
        assert_eq!(scalar_from_array(&col, 1).expect("cell"), ScalarValue::Null);
        assert_eq!(t.to_delimited().expect("text"), "1\t5\n2\t\n3\t20\n");
    }

    #[test]
    fn stored_rows_become_untyped_text() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a0", DataType::Int64, true),
            Field::new("r", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![3, 6])),
                Arc::new(Float64Array::from(vec![0.25, 1.0])),
            ],
        )
        .expect("batch");
        let t = MemTable::encode_text(&schema, &[batch]).expect("encode");
        assert_eq!(t.schema().field(0).data_type(), &DataType::Binary);
        assert_eq!(t.to_delimited().expect("text"), "3\t0.25\n6\t1.0\n");
    }

    #[test]
    fn empty_text_is_an_empty_table() {
        let t = MemTable::from_delimited("").expect("table");
        assert_eq!(t.num_rows(), 0);
        assert!(t.schema().fields().is_empty());
    }
}
