//! Store implementation: records, index values, filters

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// A value a record exposes for indexing and filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    String(String),
    Int(i64),
}

impl IndexValue {
    /// Compare two values of the same variant; mixed variants compare equal.
    ///
    /// Every indexed field holds one variant across a collection, so a mixed
    /// comparison only happens on a malformed query.
    fn cmp_same(&self, other: &IndexValue) -> Ordering {
        match (self, other) {
            (IndexValue::String(a), IndexValue::String(b)) => a.cmp(b),
            (IndexValue::Int(a), IndexValue::Int(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Comparison operator for a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A predicate over one indexed field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    /// Evaluate this predicate against a record's index map.
    ///
    /// A record without the field never matches. Values of different
    /// variants never match.
    fn matches(&self, fields: &HashMap<String, IndexValue>) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        if std::mem::discriminant(actual) != std::mem::discriminant(&self.value) {
            return false;
        }
        match self.op {
            FilterOp::Eq => actual.cmp_same(&self.value) == Ordering::Equal,
            FilterOp::Lt => actual.cmp_same(&self.value) == Ordering::Less,
            FilterOp::Lte => actual.cmp_same(&self.value) != Ordering::Greater,
            FilterOp::Gt => actual.cmp_same(&self.value) == Ordering::Greater,
            FilterOp::Gte => actual.cmp_same(&self.value) != Ordering::Less,
        }
    }
}

/// A record that can live in a [`Store`]
pub trait Record {
    /// The fields this record exposes for filtering and ordering
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

/// Errors from store operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(u64),
}

/// In-memory record collection with store-assigned integer ids.
///
/// Ids increase monotonically from 1 and are never reused, so ascending id
/// order is insertion order.
pub struct Store<R: Record> {
    next_id: u64,
    records: BTreeMap<u64, R>,
}

impl<R: Record> Store<R> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
        }
    }

    /// Insert a record, returning its assigned id
    pub fn insert(&mut self, record: R) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.records.insert(id, record);
        debug!(id, "record inserted");
        id
    }

    pub fn get(&self, id: u64) -> Option<&R> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut R> {
        self.records.get_mut(&id)
    }

    /// Update a record in place by id
    pub fn update<F>(&mut self, id: u64, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut R),
    {
        let record = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        f(record);
        Ok(())
    }

    /// Remove a record by id, returning it if present
    pub fn remove(&mut self, id: u64) -> Option<R> {
        self.records.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count records matching every filter. An empty filter list matches all.
    pub fn count(&self, filters: &[Filter]) -> usize {
        self.records
            .values()
            .filter(|r| {
                let fields = r.indexed_fields();
                filters.iter().all(|f| f.matches(&fields))
            })
            .count()
    }

    /// Select up to `limit` matching record ids.
    ///
    /// With `order_by` set, results are ordered by that indexed field
    /// ascending, ties broken by ascending id; otherwise by ascending id
    /// (insertion order).
    pub fn select(&self, filters: &[Filter], order_by: Option<&str>, limit: Option<usize>) -> Vec<u64> {
        if limit == Some(0) {
            return Vec::new();
        }

        let mut matched: Vec<(u64, HashMap<String, IndexValue>)> = self
            .records
            .iter()
            .filter_map(|(id, r)| {
                let fields = r.indexed_fields();
                filters.iter().all(|f| f.matches(&fields)).then(|| (*id, fields))
            })
            .collect();

        if let Some(field) = order_by {
            matched.sort_by(|(a_id, a_fields), (b_id, b_fields)| {
                match (a_fields.get(field), b_fields.get(field)) {
                    (Some(a), Some(b)) => a.cmp_same(b).then(a_id.cmp(b_id)),
                    // records missing the field sort last
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => a_id.cmp(b_id),
                }
            });
        }

        let mut ids: Vec<u64> = matched.into_iter().map(|(id, _)| id).collect();
        if let Some(limit) = limit {
            ids.truncate(limit);
        }
        ids
    }

    /// Delete every record matching all filters, returning how many were removed
    pub fn delete_where(&mut self, filters: &[Filter]) -> usize {
        let ids = self.select(filters, None, None);
        let removed = ids.len();
        for id in ids {
            self.records.remove(&id);
        }
        removed
    }
}

impl<R: Record> Default for Store<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Job {
        state: String,
        due_at: i64,
    }

    impl Job {
        fn new(state: &str, due_at: i64) -> Self {
            Self {
                state: state.to_string(),
                due_at,
            }
        }
    }

    impl Record for Job {
        fn indexed_fields(&self) -> HashMap<String, IndexValue> {
            let mut fields = HashMap::new();
            fields.insert("state".to_string(), IndexValue::String(self.state.clone()));
            fields.insert("due_at".to_string(), IndexValue::Int(self.due_at));
            fields
        }
    }

    fn state_eq(state: &str) -> Filter {
        Filter {
            field: "state".to_string(),
            op: FilterOp::Eq,
            value: IndexValue::String(state.to_string()),
        }
    }

    fn due_at(op: FilterOp, value: i64) -> Filter {
        Filter {
            field: "due_at".to_string(),
            op,
            value: IndexValue::Int(value),
        }
    }

    #[test]
    fn test_insert_assigns_monotonic_ids() {
        let mut store = Store::new();
        let a = store.insert(Job::new("queued", 1));
        let b = store.insert(Job::new("queued", 2));
        let c = store.insert(Job::new("queued", 3));
        assert_eq!((a, b, c), (1, 2, 3));

        // ids are never reused after removal
        store.remove(b);
        let d = store.insert(Job::new("queued", 4));
        assert_eq!(d, 4);
    }

    #[test]
    fn test_get_and_update() {
        let mut store = Store::new();
        let id = store.insert(Job::new("queued", 7));

        assert_eq!(store.get(id).unwrap().due_at, 7);
        store.update(id, |j| j.state = "running".to_string()).unwrap();
        assert_eq!(store.get(id).unwrap().state, "running");

        assert_eq!(store.update(999, |_| {}), Err(StoreError::NotFound(999)));
    }

    #[test]
    fn test_count_by_status_and_numeric_comparison() {
        let mut store = Store::new();
        store.insert(Job::new("queued", 10));
        store.insert(Job::new("queued", 20));
        store.insert(Job::new("running", 30));

        assert_eq!(store.count(&[state_eq("queued")]), 2);
        assert_eq!(store.count(&[state_eq("running")]), 1);
        assert_eq!(store.count(&[state_eq("done")]), 0);

        assert_eq!(store.count(&[due_at(FilterOp::Gte, 20)]), 2);
        assert_eq!(store.count(&[due_at(FilterOp::Lt, 20)]), 1);
        assert_eq!(store.count(&[due_at(FilterOp::Lte, 20)]), 2);
        assert_eq!(store.count(&[due_at(FilterOp::Gt, 30)]), 0);

        // conjunction
        assert_eq!(store.count(&[state_eq("queued"), due_at(FilterOp::Gte, 20)]), 1);

        // empty filter list matches everything
        assert_eq!(store.count(&[]), 3);
    }

    #[test]
    fn test_select_orders_by_field_with_id_tiebreak() {
        let mut store = Store::new();
        let a = store.insert(Job::new("queued", 30));
        let b = store.insert(Job::new("queued", 10));
        let c = store.insert(Job::new("queued", 10));

        let ordered = store.select(&[], Some("due_at"), None);
        assert_eq!(ordered, vec![b, c, a]);

        // default ordering is ascending id
        let fifo = store.select(&[], None, None);
        assert_eq!(fifo, vec![a, b, c]);
    }

    #[test]
    fn test_select_respects_limit() {
        let mut store = Store::new();
        for due in [5, 4, 3, 2, 1] {
            store.insert(Job::new("queued", due));
        }

        assert_eq!(store.select(&[], None, Some(2)).len(), 2);
        assert_eq!(store.select(&[], None, Some(0)).len(), 0);

        // smallest-by-field selection
        let smallest = store.select(&[], Some("due_at"), Some(1));
        assert_eq!(store.get(smallest[0]).unwrap().due_at, 1);
    }

    #[test]
    fn test_delete_where() {
        let mut store = Store::new();
        store.insert(Job::new("queued", 1));
        store.insert(Job::new("running", 2));
        store.insert(Job::new("queued", 3));

        let removed = store.delete_where(&[state_eq("queued")]);
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.count(&[state_eq("running")]), 1);
    }

    #[test]
    fn test_filter_missing_field_never_matches() {
        let mut store = Store::new();
        store.insert(Job::new("queued", 1));

        let missing = Filter {
            field: "nonexistent".to_string(),
            op: FilterOp::Eq,
            value: IndexValue::Int(1),
        };
        assert_eq!(store.count(&[missing]), 0);
    }

    #[test]
    fn test_filter_variant_mismatch_never_matches() {
        let mut store = Store::new();
        store.insert(Job::new("queued", 1));

        let mismatched = Filter {
            field: "due_at".to_string(),
            op: FilterOp::Gte,
            value: IndexValue::String("1".to_string()),
        };
        assert_eq!(store.count(&[mismatched]), 0);
    }

    #[test]
    fn test_filter_serde() {
        let filter = due_at(FilterOp::Gte, 42);
        let json = serde_json::to_string(&filter).unwrap();
        let parsed: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.field, "due_at");
        assert_eq!(parsed.op, FilterOp::Gte);
        assert_eq!(parsed.value, IndexValue::Int(42));
    }

    proptest! {
        #[test]
        fn prop_select_ordering_is_nondecreasing(values in prop::collection::vec(-1000i64..1000, 0..50)) {
            let mut store = Store::new();
            for v in &values {
                store.insert(Job::new("queued", *v));
            }

            let ordered = store.select(&[], Some("due_at"), None);
            let due: Vec<i64> = ordered.iter().map(|id| store.get(*id).unwrap().due_at).collect();
            prop_assert!(due.windows(2).all(|w| w[0] <= w[1]));
        }

        #[test]
        fn prop_count_matches_unlimited_select(values in prop::collection::vec(-100i64..100, 0..50), threshold in -100i64..100) {
            let mut store = Store::new();
            for v in &values {
                store.insert(Job::new("queued", *v));
            }

            let filters = [Filter {
                field: "due_at".to_string(),
                op: FilterOp::Gte,
                value: IndexValue::Int(threshold),
            }];
            prop_assert_eq!(store.count(&filters), store.select(&filters, None, None).len());
        }

        #[test]
        fn prop_ids_are_strictly_increasing(n in 1usize..50) {
            let mut store = Store::new();
            let ids: Vec<u64> = (0..n).map(|i| store.insert(Job::new("queued", i as i64))).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
