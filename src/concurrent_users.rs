//! # Concurrent Users
//!
//! Records which seconds every virtual user instance was active in, so the
//! transaction report can chart how many users ran a test case at a time.
//!
//! The table is shared between the pipeline and every transaction
//! aggregator as a [`SharedConcurrentUsers`] handle. During ingestion it has
//! a single logical writer (the pipeline); at finalize it is only read.

use crate::stats::{CellMode, TimeBucketDownsampler};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Shared handle to the concurrent-users table
pub type SharedConcurrentUsers = Arc<RwLock<ConcurrentUsersTable>>;

/// Active seconds of one user instance as disjoint inclusive spans,
/// keyed by their first second
#[derive(Debug, Clone, Default)]
struct ActiveSeconds {
    spans: BTreeMap<i64, i64>,
}

impl ActiveSeconds {
    fn set_range(&mut self, from: i64, to: i64) {
        let (mut from, mut to) = (from, to);

        // a span starting earlier may touch the new one
        if let Some((&start, &end)) = self.spans.range(..=from).next_back() {
            if end.saturating_add(1) >= from {
                from = start;
                to = to.max(end);
            }
        }

        let touching: Vec<i64> = self
            .spans
            .range(from..=to.saturating_add(1))
            .map(|(&start, _)| start)
            .collect();
        for start in touching {
            if let Some(end) = self.spans.remove(&start) {
                to = to.max(end);
            }
        }
        self.spans.insert(from, to);
    }

    #[cfg(test)]
    fn span_count(&self) -> usize {
        self.spans.len()
    }

    fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.spans.iter().flat_map(|(&start, &end)| start..=end)
    }
}

/// Active seconds per user id (`"<name>-<user number>"`)
#[derive(Debug, Default)]
pub struct ConcurrentUsersTable {
    users: BTreeMap<String, ActiveSeconds>,
    ids_by_name: HashMap<String, Vec<String>>,
}

impl ConcurrentUsersTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle that can be passed to every transaction aggregator
    pub fn shared() -> SharedConcurrentUsers {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Mark user `name-user_number` active from `from` to `to` (epoch ms,
    /// inclusive, second resolution).
    pub fn record_user_activity(&mut self, from: i64, to: i64, name: &str, user_number: u32) {
        let user_id = format!("{}-{}", name, user_number);
        if !self.users.contains_key(&user_id) {
            self.ids_by_name
                .entry(name.to_string())
                .or_default()
                .push(user_id.clone());
        }

        let (from, to) = (from.div_euclid(1000), to.div_euclid(1000));
        self.users
            .entry(user_id)
            .or_default()
            .set_range(from, to.max(from));
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Users active per second, either for one test case or for all of
    /// them when `name` is `None`.
    pub fn concurrent_users(&self, name: Option<&str>) -> TimeBucketDownsampler {
        let mut series = TimeBucketDownsampler::new(CellMode::Counter);

        let mut add = |seconds: &ActiveSeconds| {
            for second in seconds.iter() {
                series.add_or_update_value(second * 1000, 1.0);
            }
        };

        match name {
            None => self.users.values().for_each(&mut add),
            Some(name) => {
                let ids = self.ids_by_name.get(name).map(Vec::as_slice).unwrap_or(&[]);
                ids.iter()
                    .filter_map(|id| self.users.get(id))
                    .for_each(&mut add);
            }
        }
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_users() {
        let mut table = ConcurrentUsersTable::new();
        table.record_user_activity(10_000, 12_500, "Checkout", 0);
        table.record_user_activity(11_000, 11_200, "Checkout", 1);
        table.record_user_activity(12_000, 13_000, "Browse", 0);

        let checkout = table.concurrent_users(Some("Checkout"));
        assert_eq!(checkout.cell(10).unwrap().sum, 1.0);
        assert_eq!(checkout.cell(11).unwrap().sum, 2.0);
        assert_eq!(checkout.cell(12).unwrap().sum, 1.0);
        assert!(checkout.cell(13).is_none());

        let all = table.concurrent_users(None);
        assert_eq!(all.cell(12).unwrap().sum, 2.0);
        assert_eq!(all.cell(13).unwrap().sum, 1.0);
        assert_eq!(table.user_count(), 3);
    }

    #[test]
    fn test_same_user_is_not_counted_twice() {
        let mut table = ConcurrentUsersTable::new();
        table.record_user_activity(5_000, 6_000, "Checkout", 3);
        table.record_user_activity(6_000, 7_000, "Checkout", 3);
        // earlier activity reported late
        table.record_user_activity(1_000, 1_500, "Checkout", 3);

        let series = table.concurrent_users(Some("Checkout"));
        assert_eq!(series.cell(6).unwrap().sum, 1.0);
        assert_eq!(series.cell(1).unwrap().sum, 1.0);
        assert_eq!(series.value_count(), 4);
        assert_eq!(table.users["Checkout-3"].span_count(), 2);
    }

    #[test]
    fn test_far_apart_activity_stays_small() {
        let mut table = ConcurrentUsersTable::new();
        table.record_user_activity(0, 500, "Checkout", 1);
        table.record_user_activity(1_700_000_000_000, 1_700_000_002_000, "Checkout", 1);
        table.record_user_activity(1_700_000_001_000, 1_700_000_004_000, "Checkout", 1);

        assert_eq!(table.users["Checkout-1"].span_count(), 2);
        let series = table.concurrent_users(Some("Checkout"));
        assert_eq!(series.value_count(), 6);
        assert_eq!(series.cell_count(), 6);
        assert_eq!(series.cell(1_700_000_003).unwrap().sum, 1.0);
    }

    #[test]
    fn test_unknown_name_is_empty() {
        let table = ConcurrentUsersTable::new();
        assert!(table.concurrent_users(Some("Nope")).is_empty());
    }
}
