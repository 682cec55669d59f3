//! Call entry record and its state machine
//!
//! One CallEntry exists per accepted invocation. Entries move through
//! `init -> waiting -> processing -> {waiting (retry) | done}`; `done` is
//! terminal. The settlement is attached exactly once, at the transition into
//! `waiting`, and consumed exactly once, on entry into `done`.

use std::collections::HashMap;

use entrystore::{IndexValue, Record, now_ms};
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::error::CallError;

/// Status of a call entry in the scheduling state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallStatus {
    /// Just inserted; settlement not yet attached
    #[default]
    Init,
    /// Eligible for dispatch once `eligible_at` passes and headroom allows
    Waiting,
    /// Target invocation in flight
    Processing,
    /// Settled; terminal
    Done,
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Waiting => write!(f, "waiting"),
            Self::Processing => write!(f, "processing"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Re-invocable target operation; each call produces one attempt's future
pub type Target<T, E> = Box<dyn FnMut() -> BoxFuture<'static, Result<T, E>> + Send>;

/// Settlement half of the caller-visible deferred result
pub type Settlement<T, E> = oneshot::Sender<Result<T, CallError<E>>>;

/// One mediated invocation, tracked from acceptance to settlement.
///
/// The store-assigned id is the FIFO ordering key; it is not duplicated here.
pub struct CallEntry<T, E> {
    /// The deferred operation to invoke; opaque to the scheduler
    pub target: Target<T, E>,

    /// Resolves or rejects the caller's deferred result; consumed on `done`
    pub settlement: Option<Settlement<T, E>>,

    pub status: CallStatus,

    /// Execution attempts so far; incremented on each failure
    pub attempts: u32,

    /// Earliest scheduler-clock timestamp (ms) this entry may be dispatched
    pub eligible_at: i64,

    /// Reset generation the entry was accepted under
    pub epoch: u64,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl<T, E> CallEntry<T, E> {
    /// Create a new entry in `init` with no settlement attached
    pub fn new(target: Target<T, E>, epoch: u64) -> Self {
        let now = now_ms();
        Self {
            target,
            settlement: None,
            status: CallStatus::Init,
            attempts: 0,
            eligible_at: 0,
            epoch,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the settlement and release the entry into the queue
    pub fn attach_settlement(&mut self, settlement: Settlement<T, E>) {
        self.settlement = Some(settlement);
        self.set_status(CallStatus::Waiting);
    }

    /// Take the settlement for firing; subsequent calls return None
    pub fn take_settlement(&mut self) -> Option<Settlement<T, E>> {
        self.settlement.take()
    }

    pub fn set_status(&mut self, status: CallStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn is_terminal(&self) -> bool {
        self.status == CallStatus::Done
    }
}

impl<T, E> Record for CallEntry<T, E> {
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert("eligible_at".to_string(), IndexValue::Int(self.eligible_at));
        fields
    }
}
