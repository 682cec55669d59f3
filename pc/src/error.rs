//! Caller-visible error types

use thiserror::Error;

/// Rejection reason used when no explicit reason is supplied
pub const DEFAULT_ABORT_REASON: &str = "call aborted";

/// Terminal outcome of a mediated call, delivered through its deferred result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError<E> {
    /// The wrapped call failed terminally; carries the target's error unmodified
    #[error("call failed: {0}")]
    Failed(E),

    /// The scheduler discarded the call before it could settle
    #[error("call aborted: {0}")]
    Aborted(String),
}

impl<E> CallError<E> {
    pub fn is_failed(&self) -> bool {
        matches!(self, CallError::Failed(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, CallError::Aborted(_))
    }

    /// The target's own error, if this is a target failure
    pub fn into_failed(self) -> Option<E> {
        match self {
            CallError::Failed(e) => Some(e),
            CallError::Aborted(_) => None,
        }
    }
}

/// Errors from talking to a scheduler that has stopped
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacerError {
    #[error("scheduler channel closed")]
    ChannelClosed,
}
