use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use flowq_common::{FlowqError, Result};
use flowq_execution::{ExecNode, TableSink, TableSource};
use tracing::{debug, info};

use crate::mem_table::MemTable;

/// Named in-memory tables: the source of `LOAD` and the target of `STORE`.
///
/// Stores replace the previous contents of a name, so a later unit (or a
/// later interactive statement) can load what an earlier one stored.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<HashMap<String, MemTable>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&self, name: &str, table: MemTable) -> Result<()> {
        debug!(table = name, rows = table.num_rows(), "registering table");
        self.write_lock()?.insert(name.to_string(), table);
        Ok(())
    }

    /// Register tab-separated text under `name`.
    pub fn register_delimited(&self, name: &str, text: &str) -> Result<()> {
        self.register_table(name, MemTable::from_delimited(text)?)
    }

    pub fn get(&self, name: &str) -> Result<MemTable> {
        self.read_lock()?
            .get(name)
            .cloned()
            .ok_or_else(|| FlowqError::Planning(format!("unknown table: {name}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_lock().map(|t| t.contains_key(name)).unwrap_or(false)
    }

    /// Registered names, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut names = self.read_lock()?.keys().cloned().collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    /// Contents of `name` as tab-separated text.
    pub fn read_delimited(&self, name: &str) -> Result<String> {
        self.get(name)?.to_delimited()
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, HashMap<String, MemTable>>> {
        self.tables
            .read()
            .map_err(|_| FlowqError::Execution("catalog lock poisoned".to_string()))
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, MemTable>>> {
        self.tables
            .write()
            .map_err(|_| FlowqError::Execution("catalog lock poisoned".to_string()))
    }
}

impl TableSource for Catalog {
    fn scan(&self, name: &str) -> Result<Arc<dyn ExecNode>> {
        Ok(self.get(name)?.scan_node())
    }
}

impl TableSink for Catalog {
    fn write(&self, name: &str, schema: SchemaRef, batches: &[RecordBatch]) -> Result<u64> {
        let table = MemTable::encode_text(&schema, batches)?;
        let rows = table.num_rows() as u64;
        self.register_table(name, table)?;
        info!(table = name, rows, "stored table");
        Ok(rows)
    }
}
