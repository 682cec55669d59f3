//! Call scheduling engine
//!
//! Admits queued calls under concurrency limits, rolling interval-rate
//! limits, and the retry policy, all driven by a single re-armed wake-up
//! timer inside one actor task.

mod config;
mod core;
mod handle;
mod limits;
mod messages;

pub use config::PacerConfig;
pub use handle::{CallResult, Pacer};
pub use limits::{Headroom, concurrency_headroom, interval_headroom};
pub use messages::{PacerStats, QueueState};
