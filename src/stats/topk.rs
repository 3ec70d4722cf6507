use crate::config::SlowestRequestsConfig;
use crate::record::MetricRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Sort key: slowest first, earlier insertion wins ties
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    runtime: Reverse<i64>,
    order: u64,
}

/// A tracked item
#[derive(Debug, Clone, PartialEq)]
pub struct TopKEntry<T> {
    pub key: String,
    pub runtime: i64,
    pub insertion_order: u64,
    pub item: T,
}

/// What [`TopKTracker::update`] did with an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopKOutcome {
    /// Added as a new entry, possibly evicting the current minimum
    Inserted,
    /// Replaced the entry of the same key with a larger runtime
    Updated,
    /// Dropped by the fast path: runtime below the tracked minimum
    Rejected,
    /// Dropped because an equal or better entry is already tracked
    Unchanged,
}

/// Bounded set of the K slowest items, ordered by `(runtime desc, insertion asc)`.
///
/// In deduplicating mode at most one entry per key is kept, holding the
/// largest runtime seen for that key.
#[derive(Debug, Clone)]
pub struct TopKTracker<T> {
    capacity: usize,
    deduplicate: bool,
    entries: BTreeMap<Rank, TopKEntry<T>>,
    by_key: HashMap<String, Rank>,
    next_order: u64,
    /// Runtime of the last entry, only meaningful when full
    cached_min: i64,
}

impl<T: Clone> TopKTracker<T> {
    /// Tracker that keeps duplicate keys as separate entries
    pub fn new(capacity: usize) -> Self {
        Self::with_mode(capacity, false)
    }

    /// Tracker that keeps only the slowest entry per key
    pub fn deduplicated(capacity: usize) -> Self {
        Self::with_mode(capacity, true)
    }

    fn with_mode(capacity: usize, deduplicate: bool) -> Self {
        Self {
            capacity: capacity.max(1),
            deduplicate,
            entries: BTreeMap::new(),
            by_key: HashMap::new(),
            next_order: 0,
            cached_min: i64::MIN,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Smallest tracked runtime, `None` when empty
    pub fn min_runtime(&self) -> Option<i64> {
        self.entries.values().next_back().map(|e| e.runtime)
    }

    /// Offer an item.
    ///
    /// When the tracker is full, anything strictly below the cached
    /// minimum is rejected without touching the ordered set. A runtime
    /// equal to the current minimum does not displace it.
    ///
    /// ## Parameters
    /// * `key` - Identity of the item; only used in deduplicating mode
    /// * `runtime` - Sort value, larger is slower
    /// * `item` - Payload kept with the entry
    ///
    /// ## Returns
    /// * What happened to the item, see [`TopKOutcome`]
    ///
    /// ## Examples
    ///
    /// ```rust
    /// # use report_aggregator::stats::{TopKOutcome, TopKTracker};
    /// let mut slowest = TopKTracker::new(2);
    /// assert_eq!(slowest.update("/a", 300, ()), TopKOutcome::Inserted);
    /// assert_eq!(slowest.update("/b", 100, ()), TopKOutcome::Inserted);
    /// assert_eq!(slowest.update("/c", 50, ()), TopKOutcome::Rejected);
    /// assert_eq!(slowest.update("/d", 200, ()), TopKOutcome::Inserted);
    ///
    /// let runtimes: Vec<i64> = slowest.entries().map(|e| e.runtime).collect();
    /// assert_eq!(runtimes, vec![300, 200]);
    /// ```
    pub fn update(&mut self, key: &str, runtime: i64, item: T) -> TopKOutcome {
        if self.is_full() && runtime < self.cached_min {
            return TopKOutcome::Rejected;
        }

        if self.deduplicate {
            if let Some(&rank) = self.by_key.get(key) {
                if runtime <= rank.runtime.0 {
                    return TopKOutcome::Unchanged;
                }
                // the sort key changes, so the entry has to move
                self.entries.remove(&rank);
                self.insert(key, runtime, item);
                return TopKOutcome::Updated;
            }
        }

        if self.is_full() {
            if runtime <= self.cached_min {
                return TopKOutcome::Unchanged;
            }
            if let Some((_, evicted)) = self.entries.pop_last() {
                if self.deduplicate {
                    self.by_key.remove(&evicted.key);
                }
            }
        }

        self.insert(key, runtime, item);
        TopKOutcome::Inserted
    }

    fn insert(&mut self, key: &str, runtime: i64, item: T) {
        let rank = Rank {
            runtime: Reverse(runtime),
            order: self.next_order,
        };
        self.next_order += 1;

        self.entries.insert(
            rank,
            TopKEntry {
                key: key.to_string(),
                runtime,
                insertion_order: rank.order,
                item,
            },
        );
        if self.deduplicate {
            self.by_key.insert(key.to_string(), rank);
        }
        self.cached_min = self.min_runtime().unwrap_or(i64::MIN);
    }

    /// Entries from slowest to fastest
    pub fn entries(&self) -> impl Iterator<Item = &TopKEntry<T>> {
        self.entries.values()
    }

    /// Feed every entry of `other` into this tracker
    pub fn merge(&mut self, other: &TopKTracker<T>) {
        for entry in other.entries() {
            self.update(&entry.key, entry.runtime, entry.item.clone());
        }
    }
}

/// A request reported in the slowest-requests list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowRequest {
    /// Name of the request series
    pub bucket: String,
    pub url: String,
    pub timestamp: i64,
    pub runtime: i64,
    pub bytes_sent: i64,
    pub bytes_received: i64,
    pub time_to_first_bytes: i64,
    pub time_to_last_bytes: i64,
}

/// Per-series trackers of the slowest requests, merged into one global
/// list deduplicated by URL at finalize.
#[derive(Debug, Clone)]
pub struct SlowestRequestsTracker {
    config: SlowestRequestsConfig,
    buckets: HashMap<String, TopKTracker<SlowRequest>>,
}

impl SlowestRequestsTracker {
    pub fn new(config: SlowestRequestsConfig) -> Self {
        Self {
            config,
            buckets: HashMap::new(),
        }
    }

    /// Offer a request record. Runtimes outside the configured range are
    /// ignored.
    pub fn add(&mut self, record: &MetricRecord) -> TopKOutcome {
        let runtime = record.runtime();
        if runtime < self.config.min_runtime || runtime > self.config.max_runtime {
            return TopKOutcome::Rejected;
        }

        let details = record.request.clone().unwrap_or_default();
        let url = details.url_without_fragment().to_string();
        let slow = SlowRequest {
            bucket: record.series_name.clone(),
            url,
            timestamp: record.timestamp,
            runtime,
            bytes_sent: details.bytes_sent,
            bytes_received: details.bytes_received,
            time_to_first_bytes: details.time_to_first_bytes,
            time_to_last_bytes: details.time_to_last_bytes,
        };

        let per_bucket = self.config.per_bucket;
        let key = slow.url.clone();
        self.buckets
            .entry(record.series_name.clone())
            .or_insert_with(|| TopKTracker::new(per_bucket))
            .update(&key, runtime, slow)
    }

    /// Merge every series tracker into the global list, slowest first.
    ///
    /// Series are visited in name order so ties resolve the same way on
    /// every run.
    pub fn finalize(&self) -> Vec<SlowRequest> {
        let mut global = TopKTracker::deduplicated(self.config.total);

        let mut names: Vec<&String> = self.buckets.keys().collect();
        names.sort();
        for name in names {
            if let Some(bucket) = self.buckets.get(name) {
                global.merge(bucket);
            }
        }

        global.entries().map(|e| e.item.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordKind, RequestDetails};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_keeps_slowest_in_order() {
        let mut tracker = TopKTracker::new(3);
        for (key, runtime) in [("a", 10), ("b", 50), ("c", 30), ("d", 40), ("e", 20)] {
            tracker.update(key, runtime, ());
        }

        let runtimes: Vec<i64> = tracker.entries().map(|e| e.runtime).collect();
        assert_eq!(runtimes, vec![50, 40, 30]);
        assert_eq!(tracker.min_runtime(), Some(30));
    }

    #[test]
    fn test_ties_keep_earlier_entry() {
        let mut tracker = TopKTracker::new(2);
        assert_eq!(tracker.update("a", 10, ()), TopKOutcome::Inserted);
        assert_eq!(tracker.update("b", 10, ()), TopKOutcome::Inserted);
        assert_eq!(tracker.update("c", 10, ()), TopKOutcome::Unchanged);
        assert_eq!(tracker.update("d", 5, ()), TopKOutcome::Rejected);

        let keys: Vec<&str> = tracker.entries().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_deduplicated_keeps_max_per_key() {
        let mut tracker = TopKTracker::deduplicated(3);
        tracker.update("/login", 100, ());
        tracker.update("/search", 200, ());
        assert_eq!(tracker.update("/login", 300, ()), TopKOutcome::Updated);
        assert_eq!(tracker.update("/login", 150, ()), TopKOutcome::Unchanged);
        tracker.update("/cart", 50, ());
        tracker.update("/checkout", 250, ());

        let entries: Vec<(&str, i64)> = tracker
            .entries()
            .map(|e| (e.key.as_str(), e.runtime))
            .collect();
        assert_eq!(
            entries,
            vec![("/login", 300), ("/checkout", 250), ("/search", 200)]
        );
    }

    #[test]
    fn test_bounded_and_rejections_below_minimum() {
        let mut rng = StdRng::seed_from_u64(3);
        for capacity in [1, 5, 32] {
            for deduplicate in [false, true] {
                let mut tracker = TopKTracker::with_mode(capacity, deduplicate);
                for _ in 0..5_000 {
                    let key = format!("k{}", rng.gen_range(0..200));
                    let runtime = rng.gen_range(0..10_000);
                    let min_before = tracker.min_runtime();
                    let full_before = tracker.len() == capacity;

                    let outcome = tracker.update(&key, runtime, ());
                    if outcome == TopKOutcome::Rejected {
                        assert!(full_before);
                        assert!(runtime < min_before.unwrap());
                    }
                    assert!(tracker.len() <= capacity);
                }

                let runtimes: Vec<i64> = tracker.entries().map(|e| e.runtime).collect();
                assert!(runtimes.windows(2).all(|w| w[0] >= w[1]));
            }
        }
    }

    fn request(name: &str, url: &str, timestamp: i64, runtime: i64) -> MetricRecord {
        MetricRecord::timer(RecordKind::Request, name, timestamp, runtime).with_request(
            RequestDetails {
                url: url.to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_slowest_requests_filter_and_merge() {
        let config = SlowestRequestsConfig {
            per_bucket: 2,
            total: 3,
            min_runtime: 1_000,
            max_runtime: 10_000,
        };
        let mut tracker = SlowestRequestsTracker::new(config);

        assert_eq!(
            tracker.add(&request("Login", "/login", 0, 999)),
            TopKOutcome::Rejected
        );
        assert_eq!(
            tracker.add(&request("Login", "/login", 0, 10_001)),
            TopKOutcome::Rejected
        );

        tracker.add(&request("Login", "/login#a", 1, 5_000));
        tracker.add(&request("Login", "/login", 2, 4_000));
        tracker.add(&request("Login", "/login", 3, 2_000));
        tracker.add(&request("Search", "/search", 4, 3_000));
        tracker.add(&request("Search", "/search?q", 5, 1_500));

        let slowest = tracker.finalize();
        let summary: Vec<(&str, i64)> = slowest
            .iter()
            .map(|r| (r.url.as_str(), r.runtime))
            .collect();
        assert_eq!(
            summary,
            vec![("/login", 5_000), ("/search", 3_000), ("/search?q", 1_500)]
        );
    }
}
