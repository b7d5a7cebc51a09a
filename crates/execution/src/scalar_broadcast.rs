//! Single-row broadcast of scalar side inputs.
//!
//! Every side input of one unit execution owns a slot with exactly one writer
//! (its materializer) and any number of readers (consumer tasks). A slot moves
//! `Unresolved -> Materializing -> Bound | BoundEmpty | Failed`; terminal
//! states never change again, so readers only suspend until the first terminal
//! state and read the frozen row afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::UInt32Array;
use arrow::compute::take_record_batch;
use arrow::record_batch::RecordBatch;
use flowq_common::{FlowqError, Result, SideInputId};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::scalar::scalar_from_array;

/// Lifecycle of one side input within one execution.
#[derive(Debug, Clone)]
pub enum SideInputState {
    /// Nothing started yet.
    Unresolved,
    /// The materializer is running the scalar subtree.
    Materializing,
    /// Exactly one row; frozen.
    Bound(Arc<RecordBatch>),
    /// Zero rows; every field reads as null.
    BoundEmpty,
    /// Subtree error, cardinality violation or cancellation.
    Failed(Arc<FlowqError>),
}

impl SideInputState {
    /// `true` once no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SideInputState::Bound(_) | SideInputState::BoundEmpty | SideInputState::Failed(_)
        )
    }

    fn label(&self) -> &'static str {
        match self {
            SideInputState::Unresolved => "unresolved",
            SideInputState::Materializing => "materializing",
            SideInputState::Bound(_) => "bound",
            SideInputState::BoundEmpty => "bound_empty",
            SideInputState::Failed(_) => "failed",
        }
    }
}

/// Value a consumer reads for one side input.
#[derive(Debug, Clone)]
pub enum ScalarBinding {
    /// The frozen single-row batch.
    Row(Arc<RecordBatch>),
    /// The scalar relation was empty.
    Empty,
}

/// Frozen bindings visible to one operator subtree.
#[derive(Debug, Clone, Default)]
pub struct ScalarBindings {
    bindings: HashMap<SideInputId, ScalarBinding>,
}

impl ScalarBindings {
    /// No bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding of `id`, if it was resolved by an enclosing broadcast.
    pub fn get(&self, id: SideInputId) -> Option<&ScalarBinding> {
        self.bindings.get(&id)
    }

    /// Copy of `self` extended with `id`.
    pub fn with(&self, id: SideInputId, binding: ScalarBinding) -> Self {
        let mut next = self.clone();
        next.bindings.insert(id, binding);
        next
    }

    /// Number of bound side inputs.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// `true` when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Create the slot of one side input.
pub fn side_input_channel(
    id: SideInputId,
    alias: &str,
    max_row_bytes: usize,
) -> (SideInputWriter, SideInputHandle) {
    let (tx, rx) = watch::channel(SideInputState::Unresolved);
    let alias: Arc<str> = Arc::from(alias);
    (
        SideInputWriter {
            id,
            alias: Arc::clone(&alias),
            max_row_bytes,
            tx,
            finished: false,
        },
        SideInputHandle { id, alias, rx },
    )
}

/// Read side of a slot. Cheap to clone; each consumer task holds one.
#[derive(Debug, Clone)]
pub struct SideInputHandle {
    id: SideInputId,
    alias: Arc<str>,
    rx: watch::Receiver<SideInputState>,
}

impl SideInputHandle {
    /// Side input id.
    pub fn id(&self) -> SideInputId {
        self.id
    }

    /// Alias the side input was registered under.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Current state without waiting.
    pub fn state(&self) -> SideInputState {
        self.rx.borrow().clone()
    }

    /// Wait for a terminal state and return the binding.
    ///
    /// A failed side input fails the reader: cardinality violations keep
    /// their code, everything else surfaces as `ScalarCancelled`.
    pub async fn resolve(&self) -> Result<ScalarBinding> {
        let mut rx = self.rx.clone();
        let state = rx
            .wait_for(SideInputState::is_terminal)
            .await
            .map_err(|_| {
                FlowqError::scalar_cancelled(format!(
                    "side input '{}' was dropped before binding",
                    self.alias
                ))
            })?
            .clone();
        match state {
            SideInputState::Bound(row) => Ok(ScalarBinding::Row(row)),
            SideInputState::BoundEmpty => Ok(ScalarBinding::Empty),
            SideInputState::Failed(err) => Err(consumer_error(&self.alias, &err)),
            other => Err(FlowqError::Execution(format!(
                "side input '{}' observed in non-terminal state {}",
                self.alias,
                other.label()
            ))),
        }
    }
}

/// The error a reader of a failed side input receives.
fn consumer_error(alias: &str, err: &FlowqError) -> FlowqError {
    match err {
        FlowqError::Cardinality {
            code,
            alias,
            rows,
            message,
        } => FlowqError::Cardinality {
            code: *code,
            alias: alias.clone(),
            rows: *rows,
            message: message.clone(),
        },
        FlowqError::Cancelled { message, .. } => FlowqError::scalar_cancelled(message.clone()),
        other => FlowqError::scalar_cancelled(format!("side input '{alias}' failed: {other}")),
    }
}

/// Why binding a finished subtree failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindFailureReason {
    /// More than one row.
    Cardinality,
    /// The row is larger than the broadcast limit.
    RowSize,
    /// The row could not be copied out of the subtree output.
    Freeze,
}

impl BindFailureReason {
    /// Metric label.
    pub fn label(self) -> &'static str {
        match self {
            BindFailureReason::Cardinality => "cardinality",
            BindFailureReason::RowSize => "row_size",
            BindFailureReason::Freeze => "freeze",
        }
    }
}

/// Failed [`SideInputWriter::complete`]: the cause plus the error consumers see.
#[derive(Debug)]
pub struct BindFailure {
    /// Cause, for metrics.
    pub reason: BindFailureReason,
    /// Error handed to every reader of the slot.
    pub error: FlowqError,
}

/// Write side of a slot, owned by the materializer.
///
/// Dropping a writer before [`complete`](Self::complete) or
/// [`fail`](Self::fail) marks the slot failed, so readers never wait on an
/// abandoned materializer.
#[derive(Debug)]
pub struct SideInputWriter {
    id: SideInputId,
    alias: Arc<str>,
    max_row_bytes: usize,
    tx: watch::Sender<SideInputState>,
    finished: bool,
}

impl SideInputWriter {
    /// Side input id.
    pub fn id(&self) -> SideInputId {
        self.id
    }

    /// Alias the side input was registered under.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Mark the subtree as running.
    pub fn begin(&self) {
        self.transition(SideInputState::Materializing);
    }

    /// Bind the subtree output.
    ///
    /// Zero rows bind empty, one row binds that row, more rows or an
    /// oversized row fail the slot. The failure is also returned to the caller.
    pub fn complete(mut self, batches: &[RecordBatch]) -> std::result::Result<(), BindFailure> {
        let rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>();
        let outcome = match rows {
            0 => Ok(SideInputState::BoundEmpty),
            1 => self.freeze_row(batches).map(|b| SideInputState::Bound(Arc::new(b))),
            n => Err(BindFailure {
                reason: BindFailureReason::Cardinality,
                error: FlowqError::scalar_cardinality(&self.alias, n),
            }),
        };
        self.finished = true;
        match outcome {
            Ok(state) => {
                self.transition(state);
                Ok(())
            }
            Err(BindFailure { reason, error }) => {
                let error = Arc::new(error);
                self.transition(SideInputState::Failed(Arc::clone(&error)));
                Err(BindFailure {
                    reason,
                    error: consumer_error(&self.alias, &error),
                })
            }
        }
    }

    /// Fail the slot with a subtree error.
    pub fn fail(mut self, err: FlowqError) {
        self.finished = true;
        self.transition(SideInputState::Failed(Arc::new(err)));
    }

    fn freeze_row(&self, batches: &[RecordBatch]) -> std::result::Result<RecordBatch, BindFailure> {
        let freeze = |error| BindFailure {
            reason: BindFailureReason::Freeze,
            error,
        };
        let batch = batches
            .iter()
            .find(|b| b.num_rows() == 1)
            .ok_or_else(|| freeze(FlowqError::Execution("single-row batch not found".to_string())))?;
        // Compact copy so the binding does not pin the subtree's buffers.
        let row = take_record_batch(batch, &UInt32Array::from(vec![0_u32])).map_err(|e| {
            freeze(FlowqError::Execution(format!("freezing scalar row failed: {e}")))
        })?;
        let mut bytes = 0usize;
        for col in row.columns() {
            bytes += scalar_from_array(col, 0).map_err(freeze)?.estimated_bytes();
        }
        if bytes > self.max_row_bytes {
            return Err(BindFailure {
                reason: BindFailureReason::RowSize,
                error: FlowqError::Execution(format!(
                    "scalar row of '{}' is {bytes} bytes, above the broadcast limit of {} bytes",
                    self.alias, self.max_row_bytes
                )),
            });
        }
        Ok(row)
    }

    fn transition(&self, next: SideInputState) {
        let prev = self.tx.borrow().label();
        if next.is_terminal() {
            if let SideInputState::Failed(err) = &next {
                warn!(side_input = %self.id, alias = %self.alias, error = %err, "side input failed");
            }
        }
        debug!(
            side_input = %self.id,
            alias = %self.alias,
            from = prev,
            to = next.label(),
            "side input transition"
        );
        self.tx.send_replace(next);
    }
}

impl Drop for SideInputWriter {
    fn drop(&mut self) {
        if !self.finished {
            let err = FlowqError::scalar_cancelled(format!(
                "materializer of side input '{}' stopped before binding",
                self.alias
            ));
            self.tx.send_replace(SideInputState::Failed(Arc::new(err)));
        }
    }
}
