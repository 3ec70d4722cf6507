use crate::config::ReplacementPolicy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Retained URLs plus the approximate number of distinct URLs seen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlList {
    pub total: u64,
    pub list: Vec<String>,
}

/// Retains up to `capacity` URLs verbatim and counts distinct URLs by hash.
///
/// The count is exact up to hash collisions; only the 8-byte hashes are
/// stored for URLs beyond the retained ones.
#[derive(Debug)]
pub struct DistinctUrlTracker {
    capacity: usize,
    policy: ReplacementPolicy,
    retained: VecDeque<String>,
    hashes: HashSet<u64>,
    rng: Option<StdRng>,
}

impl DistinctUrlTracker {
    /// Tracker retaining up to `capacity` URLs
    ///
    /// ## Parameters
    /// * `capacity` - URLs kept verbatim, at least one
    /// * `policy` - What happens to a new URL once `capacity` is reached
    ///
    /// ## Examples
    ///
    /// ```rust
    /// # use report_aggregator::stats::DistinctUrlTracker;
    /// # use report_aggregator::ReplacementPolicy;
    /// let mut urls = DistinctUrlTracker::new(2, ReplacementPolicy::Always);
    /// for (hash, url) in ["/a", "/b", "/a", "/c"].iter().enumerate() {
    ///     // equal URLs share a hash
    ///     let hash = if *url == "/a" { 0 } else { hash as u64 };
    ///     urls.add(url, hash);
    /// }
    ///
    /// assert_eq!(urls.distinct_count(), 3);
    /// assert_eq!(urls.retained().collect::<Vec<_>>(), vec!["/b", "/c"]);
    /// ```
    pub fn new(capacity: usize, policy: ReplacementPolicy) -> Self {
        let rng = match policy {
            ReplacementPolicy::Reservoir { seed: Some(seed) } => Some(StdRng::seed_from_u64(seed)),
            ReplacementPolicy::Reservoir { seed: None } => Some(StdRng::from_entropy()),
            _ => None,
        };

        Self {
            capacity: capacity.max(1),
            policy,
            retained: VecDeque::new(),
            hashes: HashSet::new(),
            rng,
        }
    }

    /// Record a URL given its fragment-less form and its hash
    pub fn add(&mut self, url: &str, hash: u64) {
        if !self.hashes.insert(hash) {
            // already seen
            return;
        }

        if self.retained.len() < self.capacity {
            self.retained.push_back(url.to_string());
            return;
        }

        match self.policy {
            ReplacementPolicy::Never => {}
            ReplacementPolicy::Always => {
                self.retained.pop_front();
                self.retained.push_back(url.to_string());
            }
            ReplacementPolicy::Reservoir { .. } => {
                // algorithm R over the distinct URLs
                let seen = self.hashes.len();
                if let Some(rng) = self.rng.as_mut() {
                    let slot = rng.gen_range(0..seen);
                    if slot < self.capacity {
                        self.retained[slot] = url.to_string();
                    }
                }
            }
        }
    }

    pub fn distinct_count(&self) -> u64 {
        self.hashes.len() as u64
    }

    pub fn retained(&self) -> impl Iterator<Item = &str> {
        self.retained.iter().map(String::as_str)
    }

    /// Snapshot with the retained URLs sorted
    pub fn to_url_list(&self) -> UrlList {
        let mut list: Vec<String> = self.retained.iter().cloned().collect();
        list.sort();
        UrlList {
            total: self.distinct_count(),
            list,
        }
    }
}
