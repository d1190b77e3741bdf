//! Narration playback queue
//!
//! The queue state is owned by a single worker task. Callers hold a cheap,
//! cloneable `NarrationQueue` handle that sends commands over an mpsc channel
//! and waits for the reply on a oneshot. Because every mutation runs on the
//! worker, a UI skip and a proximity trigger can never both start playback.

mod state;

use crate::domain::narration::{Narration, NarrationId, NarrationStatus};
use crate::infra::metrics::Metrics;
use chrono::Utc;
use state::QueueState;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueueError {
    #[error("narration {0} not found")]
    NotFound(NarrationId),

    #[error("narration {id} cannot move from {from} to {to}")]
    InvalidTransition { id: NarrationId, from: &'static str, to: &'static str },

    #[error("narration {0} is already playing")]
    Busy(NarrationId),

    #[error("narration {expected} is no longer next (head: {head:?})")]
    HeadChanged { expected: NarrationId, head: Option<NarrationId> },

    #[error("narration queue worker has stopped")]
    Closed,
}

/// A request to the queue worker
#[derive(Debug)]
enum QueueCmd {
    Enqueue { batch: Vec<Narration>, reply: oneshot::Sender<usize> },
    Next { reply: oneshot::Sender<Option<Narration>> },
    StartIfNext { id: NarrationId, reply: oneshot::Sender<Result<Narration, QueueError>> },
    UpdateStatus {
        id: NarrationId,
        status: NarrationStatus,
        reply: oneshot::Sender<Result<Narration, QueueError>>,
    },
    Current { reply: oneshot::Sender<Option<Narration>> },
    PeekNext { reply: oneshot::Sender<Option<Narration>> },
    PendingCount { reply: oneshot::Sender<usize> },
    Get { id: NarrationId, reply: oneshot::Sender<Option<Narration>> },
    Snapshot { reply: oneshot::Sender<Vec<Narration>> },
    Clear { reply: oneshot::Sender<usize> },
}

/// Handle to a running narration queue
#[derive(Debug, Clone)]
pub struct NarrationQueue {
    cmd_tx: mpsc::Sender<QueueCmd>,
}

impl NarrationQueue {
    /// Create the queue and spawn its worker on the current runtime
    pub fn spawn(buffer_size: usize, metrics: Option<Arc<Metrics>>) -> (Self, JoinHandle<()>) {
        let (queue, worker) = create_narration_queue(buffer_size, metrics);
        let handle = tokio::spawn(worker.run());
        (queue, handle)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> QueueCmd,
    ) -> Result<T, QueueError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx.send(make(reply_tx)).await.map_err(|_| QueueError::Closed)?;
        reply_rx.await.map_err(|_| QueueError::Closed)
    }

    /// Append narrations in order; returns the number now pending.
    ///
    /// Narrations carrying a failure reason are stored as failed.
    pub async fn enqueue(&self, batch: Vec<Narration>) -> Result<usize, QueueError> {
        self.request(|reply| QueueCmd::Enqueue { batch, reply }).await
    }

    /// Move on to the earliest queued narration.
    ///
    /// A narration still playing is completed first, in the same step, so
    /// repeated calls drain the queue in order. `Ok(None)` once nothing is queued.
    pub async fn next(&self) -> Result<Option<Narration>, QueueError> {
        self.request(|reply| QueueCmd::Next { reply }).await
    }

    /// Start `id` if nothing is playing and it is still the next queued entry.
    ///
    /// Fails with `Busy` or `HeadChanged` otherwise, leaving the queue untouched.
    pub async fn start_if_next(&self, id: NarrationId) -> Result<Narration, QueueError> {
        self.request(|reply| QueueCmd::StartIfNext { id, reply }).await?
    }

    pub async fn update_status(
        &self,
        id: NarrationId,
        status: NarrationStatus,
    ) -> Result<Narration, QueueError> {
        self.request(|reply| QueueCmd::UpdateStatus { id, status, reply }).await?
    }

    pub async fn current(&self) -> Result<Option<Narration>, QueueError> {
        self.request(|reply| QueueCmd::Current { reply }).await
    }

    /// The narration `next()` would start, without starting it
    pub async fn peek_next(&self) -> Result<Option<Narration>, QueueError> {
        self.request(|reply| QueueCmd::PeekNext { reply }).await
    }

    pub async fn pending_count(&self) -> Result<usize, QueueError> {
        self.request(|reply| QueueCmd::PendingCount { reply }).await
    }

    pub async fn get(&self, id: NarrationId) -> Result<Option<Narration>, QueueError> {
        self.request(|reply| QueueCmd::Get { id, reply }).await
    }

    /// Every entry in queue order, finished ones included
    pub async fn snapshot(&self) -> Result<Vec<Narration>, QueueError> {
        self.request(|reply| QueueCmd::Snapshot { reply }).await
    }

    /// Discard all entries; returns how many were dropped
    pub async fn clear(&self) -> Result<usize, QueueError> {
        self.request(|reply| QueueCmd::Clear { reply }).await
    }
}

/// Worker that owns the queue state and applies commands in arrival order
pub struct NarrationQueueWorker {
    state: QueueState,
    cmd_rx: mpsc::Receiver<QueueCmd>,
    metrics: Option<Arc<Metrics>>,
}

impl NarrationQueueWorker {
    fn new(cmd_rx: mpsc::Receiver<QueueCmd>, metrics: Option<Arc<Metrics>>) -> Self {
        Self { state: QueueState::new(), cmd_rx, metrics }
    }

    /// Run until every handle has been dropped
    pub async fn run(mut self) {
        info!("narration_queue_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle(cmd);
        }

        info!(
            entries = %self.state.entries().len(),
            pending = %self.state.pending_count(),
            "narration_queue_stopped"
        );
    }

    // A dropped reply receiver means the caller gave up; the command still applies.
    fn handle(&mut self, cmd: QueueCmd) {
        match cmd {
            QueueCmd::Enqueue { batch, reply } => {
                let offered = batch.len();
                let report = self.state.enqueue(batch, Utc::now());
                if report.accepted < offered {
                    warn!(offered = %offered, accepted = %report.accepted, "narration_duplicates_ignored");
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_enqueued(report.accepted);
                    for _ in 0..report.failed {
                        metrics.record_narration_status(NarrationStatus::Failed);
                    }
                }
                info!(
                    accepted = %report.accepted,
                    failed = %report.failed,
                    pending = %report.pending,
                    "narrations_enqueued"
                );
                let _ = reply.send(report.pending);
            }
            QueueCmd::Next { reply } => {
                let advance = self.state.next(Utc::now());
                if let Some(finished) = &advance.finished {
                    self.record_status(NarrationStatus::Completed);
                    info!(
                        narration_id = %finished.id,
                        poi_id = %finished.poi_id,
                        status = %finished.status.as_str(),
                        "narration_status_changed"
                    );
                }
                match &advance.started {
                    Some(narration) => self.log_started(narration),
                    None => debug!("narration_queue_empty"),
                }
                let _ = reply.send(advance.started);
            }
            QueueCmd::StartIfNext { id, reply } => {
                let result = self.state.start_if_next(id, Utc::now());
                match &result {
                    Ok(narration) => self.log_started(narration),
                    Err(e) => debug!(narration_id = %id, error = %e, "narration_start_rejected"),
                }
                let _ = reply.send(result);
            }
            QueueCmd::UpdateStatus { id, status, reply } => {
                let result = self.state.update_status(id, status, Utc::now());
                match &result {
                    Ok(narration) => {
                        self.record_status(status);
                        info!(
                            narration_id = %id,
                            poi_id = %narration.poi_id,
                            status = %status.as_str(),
                            "narration_status_changed"
                        );
                    }
                    Err(e) => warn!(narration_id = %id, error = %e, "narration_status_rejected"),
                }
                let _ = reply.send(result);
            }
            QueueCmd::Current { reply } => {
                let _ = reply.send(self.state.current().cloned());
            }
            QueueCmd::PeekNext { reply } => {
                let _ = reply.send(self.state.peek_next().cloned());
            }
            QueueCmd::PendingCount { reply } => {
                let _ = reply.send(self.state.pending_count());
            }
            QueueCmd::Get { id, reply } => {
                let _ = reply.send(self.state.get(id).cloned());
            }
            QueueCmd::Snapshot { reply } => {
                let _ = reply.send(self.state.entries().to_vec());
            }
            QueueCmd::Clear { reply } => {
                let dropped = self.state.clear();
                info!(dropped = %dropped, "narration_queue_cleared");
                let _ = reply.send(dropped);
            }
        }
    }

    fn log_started(&self, narration: &Narration) {
        self.record_status(NarrationStatus::Playing);
        info!(
            narration_id = %narration.id,
            poi_id = %narration.poi_id,
            duration_secs = %narration.duration_seconds,
            "narration_started"
        );
    }

    fn record_status(&self, status: NarrationStatus) {
        if let Some(metrics) = &self.metrics {
            metrics.record_narration_status(status);
        }
    }
}

/// Create a narration queue handle and its worker
///
/// Returns the handle (cloneable, for callers) and the worker (to be spawned)
pub fn create_narration_queue(
    buffer_size: usize,
    metrics: Option<Arc<Metrics>>,
) -> (NarrationQueue, NarrationQueueWorker) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size.max(1));
    let worker = NarrationQueueWorker::new(cmd_rx, metrics);
    (NarrationQueue { cmd_tx }, worker)
}
