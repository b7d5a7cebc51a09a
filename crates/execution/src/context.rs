//! Per-execution context shared by every operator task.

use std::collections::HashMap;
use std::sync::Arc;

use flowq_common::{EngineConfig, MetricsRegistry, QueryId, SideInputId};

use crate::scalar_broadcast::SideInputHandle;
use crate::table::{TableSink, TableSource};

/// Everything an operator needs while running one unit execution.
#[derive(Clone)]
pub struct TaskContext {
    /// Execution id, used as a metrics label and in spans.
    pub query_id: QueryId,

    /// Target batch size for scans.
    pub batch_size_rows: usize,

    /// Number of parallel tasks per-record operators are split into.
    pub task_parallelism: usize,

    /// Upper bound on the size of one broadcast scalar row.
    pub max_scalar_row_bytes: usize,

    /// Metrics sink shared with the engine.
    pub metrics: MetricsRegistry,

    /// Where `Scan` reads from.
    pub source: Arc<dyn TableSource>,

    /// Where `Store` writes to.
    pub sink: Arc<dyn TableSink>,

    /// Read handles of every side input of the running unit.
    pub side_inputs: Arc<HashMap<SideInputId, SideInputHandle>>,
}

impl TaskContext {
    /// Context for one execution; side inputs are attached with [`Self::with_side_inputs`].
    pub fn new(
        query_id: QueryId,
        config: &EngineConfig,
        metrics: MetricsRegistry,
        source: Arc<dyn TableSource>,
        sink: Arc<dyn TableSink>,
    ) -> Self {
        Self {
            query_id,
            batch_size_rows: config.batch_size_rows,
            task_parallelism: config.task_parallelism.max(1),
            max_scalar_row_bytes: config.max_scalar_row_bytes,
            metrics,
            source,
            sink,
            side_inputs: Arc::new(HashMap::new()),
        }
    }

    /// Same context with the given side-input handles.
    pub fn with_side_inputs(mut self, handles: HashMap<SideInputId, SideInputHandle>) -> Self {
        self.side_inputs = Arc::new(handles);
        self
    }
}

/// Shared task context.
pub type SharedTaskContext = Arc<TaskContext>;
