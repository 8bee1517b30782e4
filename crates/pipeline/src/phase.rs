//! One pipeline stage: FIFO worker queue plus hand-off channel

use crate::worker::PipelineWorker;
use crate::PHASE_CHANNEL_CAPACITY;
use appfw_types::Phase;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Message type on the hand-off channel. `None` is a liveness sentinel
/// the handlers ignore.
pub(crate) type PhaseMsg = Option<Arc<PipelineWorker>>;

/// A pipeline stage owning its queue of workers.
///
/// The queue preserves FIFO order; the bounded channel hands workers to
/// the phase's worker pool. The manager closes the channel on
/// termination, which drains the handler cleanly.
pub struct PipelinePhase {
    phase: Phase,
    q: Mutex<Vec<Arc<PipelineWorker>>>,
    msg_tx: Mutex<Option<mpsc::Sender<PhaseMsg>>>,
    msg_rx: Mutex<Option<mpsc::Receiver<PhaseMsg>>>,
}

impl PipelinePhase {
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        let (tx, rx) = mpsc::channel(PHASE_CHANNEL_CAPACITY);
        Self {
            phase,
            q: Mutex::new(Vec::new()),
            msg_tx: Mutex::new(Some(tx)),
            msg_rx: Mutex::new(Some(rx)),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, Vec<Arc<PipelineWorker>>> {
        self.q.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a worker unless one with the same (app, hash, pod) identity
    /// is already queued. Returns whether the worker was added.
    pub fn add_worker(&self, worker: Arc<PipelineWorker>) -> bool {
        let mut q = self.queue();
        let (app_name, object_hash) = worker.app_identity();
        let duplicate = q.iter().any(|existing| {
            let (existing_app, existing_hash) = existing.app_identity();
            existing_app == app_name
                && existing_hash == object_hash
                && existing.target_pod_name() == worker.target_pod_name()
        });
        if duplicate {
            return false;
        }
        q.push(worker);
        true
    }

    /// Remove one worker by pointer identity. Returns whether it was
    /// found.
    pub fn delete_worker(&self, worker: &Arc<PipelineWorker>) -> bool {
        let mut q = self.queue();
        let before = q.len();
        q.retain(|existing| !Arc::ptr_eq(existing, worker));
        q.len() != before
    }

    /// Snapshot of the queue in FIFO order.
    #[must_use]
    pub fn workers(&self) -> Vec<Arc<PipelineWorker>> {
        self.queue().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Mark every queued worker inactive; used when a manager drains on
    /// termination.
    pub fn mark_queued_inactive(&self) {
        for worker in self.queue().iter() {
            worker.set_active(false);
        }
    }

    /// Hand a worker to the phase's pool without blocking. Returns false
    /// if the channel is full or closed; the caller leaves the worker
    /// queued for the next tick.
    pub(crate) fn try_send_worker(&self, worker: Arc<PipelineWorker>) -> bool {
        let tx = self.msg_tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx.try_send(Some(worker)).is_ok(),
            None => false,
        }
    }

    /// Push the liveness sentinel; handlers ignore it. Returns false if
    /// the channel is full or closed.
    pub(crate) fn send_sentinel(&self) -> bool {
        let tx = self.msg_tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx.try_send(None).is_ok(),
            None => false,
        }
    }

    /// Close the hand-off channel; the handler exits once drained.
    pub(crate) fn close_channel(&self) {
        self.msg_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Take the receiving end; called exactly once by the phase handler.
    pub(crate) fn take_receiver(&self) -> Option<mpsc::Receiver<PhaseMsg>> {
        self.msg_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Move `worker` from this phase's queue into `target`'s, atomically
    /// with respect to queue observers. Transitions always run
    /// downstream, so the lock order is stable.
    pub(crate) fn move_worker_to(
        &self,
        target: &PipelinePhase,
        worker: &Arc<PipelineWorker>,
        replacement: Arc<PipelineWorker>,
    ) {
        let mut from = self.queue();
        let mut to = target.q.lock().unwrap_or_else(PoisonError::into_inner);
        from.retain(|existing| !Arc::ptr_eq(existing, worker));
        to.push(replacement);
    }
}

impl std::fmt::Debug for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelinePhase")
            .field("phase", &self.phase)
            .field("queued", &self.len())
            .finish()
    }
}
