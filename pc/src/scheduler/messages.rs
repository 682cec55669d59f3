//! Scheduler actor protocol
//!
//! Commands sent to the pacer actor, and the snapshot types it replies with.

use tokio::sync::oneshot;

use crate::domain::{Settlement, Target};
use crate::retry::Classifier;

/// Commands processed by the pacer actor
pub(crate) enum Command<T, E> {
    /// Enqueue one call
    Submit {
        target: Target<T, E>,
        settlement: Settlement<T, E>,
    },

    /// Outcome of a dispatched attempt, reported by the lifecycle driver
    Outcome {
        id: u64,
        epoch: u64,
        result: Result<T, E>,
    },

    /// Prepend a classifier to the classification chain
    Register { classifier: Classifier<E> },

    /// Reject all pending work
    Reset { reason: Option<String> },

    /// Snapshot current queue counts
    QueueState { reply: oneshot::Sender<QueueState> },

    /// Snapshot lifetime counters
    Stats { reply: oneshot::Sender<PacerStats> },

    /// Stop the actor
    Shutdown,
}

/// Lifetime counters for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacerStats {
    pub total_submitted: u64,
    pub total_dispatched: u64,
    pub total_retries: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_aborted: u64,
    pub peak_processing: usize,
}

/// Point-in-time queue state
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueState {
    pub waiting: usize,
    pub processing: usize,
    /// Whether a wake-up is currently armed
    pub armed: bool,
    pub stats: PacerStats,
}
