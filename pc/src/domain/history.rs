//! Dispatch history records
//!
//! One record is appended per dispatch, atomically with the entry's
//! transition into `processing`. The log exists solely to answer "how many
//! dispatches happened in the trailing interval"; records are never mutated.

use std::collections::HashMap;

use entrystore::{IndexValue, Record};

/// One dispatch of a call entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    /// Entry that was dispatched
    pub entry_id: u64,

    /// Scheduler-clock timestamp of the dispatch, in milliseconds
    pub dispatched_at: i64,
}

impl DispatchRecord {
    pub fn new(entry_id: u64, dispatched_at: i64) -> Self {
        Self {
            entry_id,
            dispatched_at,
        }
    }
}

impl Record for DispatchRecord {
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("entry_id".to_string(), IndexValue::Int(self.entry_id as i64));
        fields.insert("dispatched_at".to_string(), IndexValue::Int(self.dispatched_at));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entrystore::{Filter, FilterOp, Store};

    #[test]
    fn test_count_in_trailing_window() {
        let mut log = Store::new();
        log.insert(DispatchRecord::new(1, 100));
        log.insert(DispatchRecord::new(2, 200));
        log.insert(DispatchRecord::new(3, 300));

        let since = |threshold: i64| {
            vec![Filter {
                field: "dispatched_at".to_string(),
                op: FilterOp::Gte,
                value: IndexValue::Int(threshold),
            }]
        };

        assert_eq!(log.count(&since(0)), 3);
        assert_eq!(log.count(&since(200)), 2);
        assert_eq!(log.count(&since(301)), 0);
    }
}
