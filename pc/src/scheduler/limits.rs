//! Limit calculators
//!
//! Pure, side-effect-free reads of the entry store and dispatch history.
//! Each calculator answers "how many more dispatches does this limit permit
//! right now"; an unconfigured limit yields [`Headroom::Unbounded`].

use entrystore::{Filter, FilterOp, IndexValue, Store};
use tracing::warn;

use crate::domain::{CallEntry, CallStatus, DispatchRecord};

use super::config::PacerConfig;

/// Remaining permitted dispatches under one limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Headroom {
    /// Limit not configured; composes as +infinity
    Unbounded,
    Slots(u64),
}

impl Headroom {
    pub fn is_zero(&self) -> bool {
        matches!(self, Headroom::Slots(0))
    }

    /// Compose two limits by minimum
    pub fn min(self, other: Headroom) -> Headroom {
        match (self, other) {
            (Headroom::Unbounded, h) | (h, Headroom::Unbounded) => h,
            (Headroom::Slots(a), Headroom::Slots(b)) => Headroom::Slots(a.min(b)),
        }
    }

    /// Concrete dispatch allowance, substituting `fallback` for Unbounded
    pub fn cap(self, fallback: usize) -> usize {
        match self {
            Headroom::Unbounded => fallback,
            Headroom::Slots(n) => usize::try_from(n).unwrap_or(usize::MAX),
        }
    }
}

/// Concurrency headroom: `max_concurrent - count(processing)`
pub fn concurrency_headroom<T, E>(config: &PacerConfig, entries: &Store<CallEntry<T, E>>) -> Headroom {
    let Some(max) = config.max_concurrent_calls else {
        return Headroom::Unbounded;
    };
    let processing = entries.count(&[Filter {
        field: "status".to_string(),
        op: FilterOp::Eq,
        value: IndexValue::String(CallStatus::Processing.to_string()),
    }]);

    let headroom = i64::from(max) - processing as i64;
    if headroom < 0 {
        warn!(max, processing, "negative concurrency headroom, clamping to 0");
        return Headroom::Slots(0);
    }
    Headroom::Slots(headroom as u64)
}

/// Interval headroom: `max_per_interval - count(dispatches in trailing window)`
pub fn interval_headroom(config: &PacerConfig, history: &Store<DispatchRecord>, now: i64) -> Headroom {
    let Some((max, interval_len)) = config.rate_limit() else {
        return Headroom::Unbounded;
    };
    let window_start = now - interval_len as i64;
    let dispatched = history.count(&[Filter {
        field: "dispatched_at".to_string(),
        op: FilterOp::Gte,
        value: IndexValue::Int(window_start),
    }]);

    let headroom = i64::from(max) - dispatched as i64;
    if headroom < 0 {
        warn!(max, dispatched, "negative interval headroom, clamping to 0");
        return Headroom::Slots(0);
    }
    Headroom::Slots(headroom as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: CallStatus) -> CallEntry<u32, String> {
        let mut entry = CallEntry::new(Box::new(|| Box::pin(async { Ok(1) })), 0);
        entry.status = status;
        entry
    }

    #[test]
    fn test_headroom_min_composition() {
        assert_eq!(Headroom::Unbounded.min(Headroom::Unbounded), Headroom::Unbounded);
        assert_eq!(Headroom::Unbounded.min(Headroom::Slots(3)), Headroom::Slots(3));
        assert_eq!(Headroom::Slots(5).min(Headroom::Unbounded), Headroom::Slots(5));
        assert_eq!(Headroom::Slots(5).min(Headroom::Slots(2)), Headroom::Slots(2));
    }

    #[test]
    fn test_headroom_cap() {
        assert_eq!(Headroom::Unbounded.cap(7), 7);
        assert_eq!(Headroom::Slots(3).cap(7), 3);
        assert!(Headroom::Slots(0).is_zero());
        assert!(!Headroom::Unbounded.is_zero());
    }

    #[test]
    fn test_concurrency_headroom_unconfigured() {
        let store: Store<CallEntry<u32, String>> = Store::new();
        let config = PacerConfig::default();
        assert_eq!(concurrency_headroom(&config, &store), Headroom::Unbounded);
    }

    #[test]
    fn test_concurrency_headroom_counts_processing_only() {
        let mut store = Store::new();
        store.insert(entry(CallStatus::Processing));
        store.insert(entry(CallStatus::Processing));
        store.insert(entry(CallStatus::Waiting));

        let config = PacerConfig {
            max_concurrent_calls: Some(5),
            ..Default::default()
        };
        assert_eq!(concurrency_headroom(&config, &store), Headroom::Slots(3));
    }

    #[test]
    fn test_concurrency_headroom_clamps_negative() {
        let mut store = Store::new();
        for _ in 0..4 {
            store.insert(entry(CallStatus::Processing));
        }

        let config = PacerConfig {
            max_concurrent_calls: Some(2),
            ..Default::default()
        };
        assert_eq!(concurrency_headroom(&config, &store), Headroom::Slots(0));
    }

    #[test]
    fn test_interval_headroom_disabled_without_both_halves() {
        let history = Store::new();
        let config = PacerConfig {
            max_calls_per_interval: Some(10),
            ..Default::default()
        };
        assert_eq!(interval_headroom(&config, &history, 0), Headroom::Unbounded);
    }

    #[test]
    fn test_interval_headroom_counts_trailing_window() {
        let mut history = Store::new();
        history.insert(DispatchRecord::new(1, 100));
        history.insert(DispatchRecord::new(2, 500));
        history.insert(DispatchRecord::new(3, 900));

        let config = PacerConfig {
            max_calls_per_interval: Some(3),
            interval_length_ms: Some(500),
            ..Default::default()
        };

        // window [500, 1000]: two dispatches inside
        assert_eq!(interval_headroom(&config, &history, 1000), Headroom::Slots(1));
        // window [900, 1400]: one dispatch inside
        assert_eq!(interval_headroom(&config, &history, 1400), Headroom::Slots(2));
        // window [1500, 2000]: empty
        assert_eq!(interval_headroom(&config, &history, 2000), Headroom::Slots(3));
    }

    #[test]
    fn test_interval_headroom_clamps_negative() {
        let mut history = Store::new();
        history.insert(DispatchRecord::new(1, 100));
        history.insert(DispatchRecord::new(2, 200));

        let config = PacerConfig {
            max_calls_per_interval: Some(1),
            interval_length_ms: Some(500),
            ..Default::default()
        };
        assert_eq!(interval_headroom(&config, &history, 300), Headroom::Slots(0));
    }
}
