//! EntryStore - generic in-memory indexed record store
//!
//! EntryStore keeps one collection of records per store, assigns each record a
//! monotonically increasing integer id at insertion, and answers filtered
//! queries against the fields a record chooses to index.
//!
//! Records implement the [`Record`] trait by exposing an index map; queries
//! are expressed as [`Filter`] predicates over those fields. The store is
//! purely in-memory: there is no durability across process restarts.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use entrystore::{Filter, FilterOp, IndexValue, Record, Store};
//!
//! struct Job {
//!     state: String,
//!     due_at: i64,
//! }
//!
//! impl Record for Job {
//!     fn indexed_fields(&self) -> HashMap<String, IndexValue> {
//!         let mut fields = HashMap::new();
//!         fields.insert("state".to_string(), IndexValue::String(self.state.clone()));
//!         fields.insert("due_at".to_string(), IndexValue::Int(self.due_at));
//!         fields
//!     }
//! }
//!
//! let mut store = Store::new();
//! store.insert(Job { state: "queued".to_string(), due_at: 5 });
//! store.insert(Job { state: "queued".to_string(), due_at: 3 });
//!
//! let queued = store.count(&[Filter {
//!     field: "state".to_string(),
//!     op: FilterOp::Eq,
//!     value: IndexValue::String("queued".to_string()),
//! }]);
//! assert_eq!(queued, 2);
//! ```

mod store;

pub use store::{Filter, FilterOp, IndexValue, Record, Store, StoreError};

/// Current wall-clock time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
