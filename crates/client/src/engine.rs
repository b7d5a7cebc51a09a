use std::sync::atomic::Ordering;
use std::sync::Arc;

use flowq_common::{EngineConfig, FlowqError, Result};
use flowq_execution::OutputResult;
use flowq_planner::{LogicalPlan, Statement};
use flowq_storage::MemTable;
use tracing::{debug, info};

use crate::session::{Session, SharedSession};

/// Entry point: alias definitions, tables, and execution in batch or
/// interactive mode.
///
/// In interactive mode every `store`/`open` compiles and runs its own unit,
/// so scalars are evaluated again for each statement. In batch mode `store`
/// only queues; `execute_batch` compiles the queue as one unit in which each
/// distinct scalar runs once.
#[derive(Clone)]
pub struct Engine {
    session: SharedSession,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let session = Arc::new(Session::new(config)?);
        Ok(Self { session })
    }

    /// Engine configured from `FLOWQ_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(EngineConfig::from_env()?)
    }

    pub fn config(&self) -> EngineConfig {
        let mut cfg = self.session.config.clone();
        cfg.batch_mode = self.session.is_batch_mode();
        cfg
    }

    /// Register a table under a given name, replacing any previous contents.
    pub fn register_table(&self, name: &str, table: MemTable) -> Result<()> {
        self.session.catalog.register_table(name, table)
    }

    /// Register tab-separated text under `name`.
    pub fn register_delimited(&self, name: &str, text: &str) -> Result<()> {
        self.session.catalog.register_delimited(name, text)
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.session.catalog.table_names()
    }

    /// Contents of a table as tab-separated text.
    pub fn read_table(&self, name: &str) -> Result<String> {
        self.session.catalog.read_delimited(name)
    }

    /// Define (or redefine) `alias`. Nothing is compiled until it is used.
    pub fn define(&self, alias: &str, plan: impl Into<LogicalPlan>) -> Result<()> {
        self.session
            .definitions
            .write()
            .map_err(|_| FlowqError::Execution("definitions lock poisoned".to_string()))?
            .define(alias, plan.into());
        debug!(alias, "defined alias");
        Ok(())
    }

    pub fn set_batch_mode(&self, on: bool) {
        self.session.batch_mode.store(on, Ordering::SeqCst);
        info!(batch_mode = on, "execution mode changed");
    }

    pub fn is_batch_mode(&self) -> bool {
        self.session.is_batch_mode()
    }

    /// `STORE alias INTO 'target'`.
    ///
    /// Queued in batch mode (returns `None`); executed right away otherwise.
    pub async fn store(&self, alias: &str, target: &str) -> Result<Option<OutputResult>> {
        let stmt = Statement::store(alias, target);
        if self.is_batch_mode() {
            self.session.pending_lock()?.push(stmt);
            debug!(alias, target, "queued store");
            return Ok(None);
        }
        let mut results = self.session.run_unit(vec![stmt]).await?;
        Ok(results.pop())
    }

    /// Run every queued `store` as one unit. The queue is cleared even when
    /// the unit fails.
    pub async fn execute_batch(&self) -> Result<Vec<OutputResult>> {
        let statements = std::mem::take(&mut *self.session.pending_lock()?);
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        self.session.run_unit(statements).await
    }

    /// Number of queued statements.
    pub fn pending_statements(&self) -> Result<usize> {
        Ok(self.session.pending_lock()?.len())
    }

    /// Evaluate `alias` now and return its rows, whatever the mode.
    pub async fn open(&self, alias: &str) -> Result<OutputResult> {
        let mut results = self
            .session
            .run_unit(vec![Statement::collect(alias)])
            .await?;
        results
            .pop()
            .ok_or_else(|| FlowqError::Execution(format!("no output produced for '{alias}'")))
    }

    /// Plans of `alias` as it would run interactively.
    pub fn explain(&self, alias: &str) -> Result<String> {
        let defs = self.session.definitions_snapshot()?;
        self.session
            .planner
            .explain(&defs, &[Statement::collect(alias)])
    }

    /// Plans of the queued batch as one unit.
    pub fn explain_batch(&self) -> Result<String> {
        let statements = self.session.pending_lock()?.clone();
        let defs = self.session.definitions_snapshot()?;
        self.session.planner.explain(&defs, &statements)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.session.runtime.shutdown().await
    }

    pub fn prometheus_metrics(&self) -> String {
        self.session.prometheus_metrics()
    }
}
