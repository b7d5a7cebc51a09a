use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use flowq_common::{EngineConfig, FlowqError, MetricsRegistry, QueryId, Result};
use flowq_execution::{OutputResult, TaskContext};
use flowq_planner::{ScriptDefinitions, Statement};
use flowq_storage::Catalog;
use tracing::{info, warn};

use crate::planner_facade::PlannerFacade;
use crate::runtime::{EmbeddedRuntime, Runtime};

pub type SharedSession = Arc<Session>;

#[derive(Debug)]
pub struct Session {
    pub config: EngineConfig,
    pub catalog: Arc<Catalog>,
    pub metrics: MetricsRegistry,
    pub planner: PlannerFacade,
    pub runtime: Arc<dyn Runtime>,
    pub definitions: RwLock<ScriptDefinitions>,
    /// Statements queued while batch mode is on.
    pub pending: Mutex<Vec<Statement>>,
    pub batch_mode: AtomicBool,
    next_query_id: AtomicU64,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            catalog: Arc::new(Catalog::new()),
            metrics: MetricsRegistry::new(),
            planner: PlannerFacade::new(&config),
            runtime: Arc::new(EmbeddedRuntime::new()),
            definitions: RwLock::new(ScriptDefinitions::new()),
            pending: Mutex::new(Vec::new()),
            batch_mode: AtomicBool::new(config.batch_mode),
            next_query_id: AtomicU64::new(1),
            config,
        })
    }

    pub fn is_batch_mode(&self) -> bool {
        self.batch_mode.load(Ordering::SeqCst)
    }

    pub fn definitions_snapshot(&self) -> Result<ScriptDefinitions> {
        self.definitions
            .read()
            .map(|d| d.clone())
            .map_err(|_| FlowqError::Execution("definitions lock poisoned".to_string()))
    }

    pub fn pending_lock(&self) -> Result<MutexGuard<'_, Vec<Statement>>> {
        self.pending
            .lock()
            .map_err(|_| FlowqError::Execution("pending statements lock poisoned".to_string()))
    }

    /// Compile `statements` as one unit against the current definitions and run it.
    ///
    /// Every call is a fresh execution: scalars are evaluated again.
    pub async fn run_unit(&self, statements: Vec<Statement>) -> Result<Vec<OutputResult>> {
        let defs = self.definitions_snapshot()?;
        let unit = self
            .planner
            .plan_unit(&defs, &statements)
            .map_err(|e| {
                warn!(error = %e, compile_time = e.is_compile_time(), "unit rejected");
                e
            })?;
        let query_id = QueryId(self.next_query_id.fetch_add(1, Ordering::SeqCst));
        info!(
            query_id = %query_id,
            statements = statements.len(),
            side_inputs = unit.side_inputs.len(),
            "running unit"
        );
        let ctx = TaskContext::new(
            query_id,
            &self.config,
            self.metrics.clone(),
            self.catalog.clone(),
            self.catalog.clone(),
        );
        self.runtime.execute(unit, ctx).await
    }

    pub fn prometheus_metrics(&self) -> String {
        self.metrics.render_prometheus()
    }
}
