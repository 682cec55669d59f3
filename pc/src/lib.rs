//! Pacer - call pacing engine for async functions
//!
//! Pacer wraps an arbitrary async function so every invocation is mediated by
//! a scheduler enforcing three independent policies: a ceiling on
//! concurrently executing calls, a ceiling on calls dispatched within a
//! rolling time window, and automatic retry-with-delay on failure,
//! customizable through a chain of error classifiers. Callers get a deferred
//! result per invocation; the scheduler decides when the call actually runs.
//!
//! # Core Concepts
//!
//! - **One actor, one timeline**: all state transitions and limit decisions
//!   happen on a single scheduler task; public handles only send commands
//! - **One timer**: every wake-up reason (retry eligibility, interval
//!   recovery, new work) collapses into a single armed deadline
//! - **Backpressure as delay**: accepting a call always succeeds immediately;
//!   limits only postpone execution
//! - **Retry by re-invocation**: targets are re-invocable closures, so each
//!   attempt gets a fresh future
//!
//! # Modules
//!
//! - [`domain`] - call entries, dispatch history, and their store indexing
//! - [`retry`] - the error classification chain
//! - [`scheduler`] - the cycle scheduler actor and the public [`Pacer`] handle
//! - [`error`] - caller-visible error types
//!
//! # Example
//!
//! ```no_run
//! use pacer::{Pacer, PacerConfig};
//!
//! # async fn demo() {
//! let pacer: Pacer<u32, String> = Pacer::spawn(PacerConfig {
//!     max_concurrent_calls: Some(2),
//!     ..Default::default()
//! });
//!
//! let result = pacer.submit(|| async { Ok(42) });
//! assert_eq!(result.await, Ok(42));
//! # }
//! ```

pub mod domain;
pub mod error;
pub mod retry;
pub mod scheduler;

// Re-export commonly used types
pub use domain::{CallEntry, CallStatus, DispatchRecord};
pub use error::{CallError, DEFAULT_ABORT_REASON, PacerError};
pub use retry::{Classifier, ClassifierChain, Next};
pub use scheduler::{CallResult, Headroom, Pacer, PacerConfig, PacerStats, QueueState};
