use crate::utils::format_percentile_key;
use serde::{Deserialize, Serialize};

const MARKERS: usize = 5;

/// Streaming single-percentile estimate using the P² algorithm
/// (Jain & Chlamtac). Constant memory: five markers per instance.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileEstimator {
    /// Target quantile in (0, 1)
    p: f64,
    count: u64,
    /// Marker heights
    heights: [f64; MARKERS],
    /// Actual marker positions (1-based ranks)
    positions: [f64; MARKERS],
    desired: [f64; MARKERS],
    increments: [f64; MARKERS],
}

impl QuantileEstimator {
    /// Create an estimator for one percentile
    ///
    /// ## Parameters
    /// * `percentile` - The tracked percentile in (0, 100), e.g. `95.0`
    ///
    /// ## Returns
    /// * An empty estimator; [`QuantileEstimator::result`] is `None` until
    ///   the first value arrives
    ///
    /// ## Examples
    ///
    /// ```rust
    /// # use report_aggregator::stats::QuantileEstimator;
    /// let mut median = QuantileEstimator::new(50.0);
    /// // a permutation of 0..1000
    /// for i in 0..1000_u64 {
    ///     median.add_value(((i * 7919) % 1000) as f64);
    /// }
    ///
    /// let estimate = median.result().unwrap();
    /// assert!((estimate - 499.5).abs() < 50.0);
    /// ```
    pub fn new(percentile: f64) -> Self {
        let p = (percentile / 100.0).clamp(0.0, 1.0);
        Self {
            p,
            count: 0,
            heights: [0.0; MARKERS],
            positions: [1.0, 2.0, 3.0, 4.0, 5.0],
            desired: [1.0, 1.0 + 2.0 * p, 1.0 + 4.0 * p, 3.0 + 2.0 * p, 5.0],
            increments: [0.0, p / 2.0, p, (1.0 + p) / 2.0, 1.0],
        }
    }

    /// The tracked percentile in (0, 100)
    pub fn percentile(&self) -> f64 {
        self.p * 100.0
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Feed one value: O(1) time, no allocation
    pub fn add_value(&mut self, x: f64) {
        if self.count < MARKERS as u64 {
            // sorted insertion into the initial markers
            let filled = self.count as usize;
            let mut i = filled;
            while i > 0 && self.heights[i - 1] > x {
                self.heights[i] = self.heights[i - 1];
                i -= 1;
            }
            self.heights[i] = x;
            self.count += 1;
            return;
        }
        self.count += 1;

        // locate the cell k with heights[k] <= x < heights[k + 1]
        let k = if x < self.heights[0] {
            self.heights[0] = x;
            0
        } else if x >= self.heights[MARKERS - 1] {
            self.heights[MARKERS - 1] = x;
            MARKERS - 2
        } else {
            let mut k = 0;
            while k < MARKERS - 2 && x >= self.heights[k + 1] {
                k += 1;
            }
            k
        };

        for position in &mut self.positions[k + 1..] {
            *position += 1.0;
        }
        for (desired, increment) in self.desired.iter_mut().zip(self.increments.iter()) {
            *desired += increment;
        }

        for i in 1..MARKERS - 1 {
            let drift = self.desired[i] - self.positions[i];
            let room_above = self.positions[i + 1] - self.positions[i];
            let room_below = self.positions[i - 1] - self.positions[i];

            if (drift >= 1.0 && room_above > 1.0) || (drift <= -1.0 && room_below < -1.0) {
                let d = drift.signum();
                let candidate = self.parabolic(i, d);
                self.heights[i] =
                    if self.heights[i - 1] < candidate && candidate < self.heights[i + 1] {
                        candidate
                    } else {
                        self.linear(i, d)
                    };
                self.positions[i] += d;
            }
        }
    }

    fn parabolic(&self, i: usize, d: f64) -> f64 {
        let (q, n) = (&self.heights, &self.positions);
        q[i] + d / (n[i + 1] - n[i - 1])
            * ((n[i] - n[i - 1] + d) * (q[i + 1] - q[i]) / (n[i + 1] - n[i])
                + (n[i + 1] - n[i] - d) * (q[i] - q[i - 1]) / (n[i] - n[i - 1]))
    }

    fn linear(&self, i: usize, d: f64) -> f64 {
        let j = if d > 0.0 { i + 1 } else { i - 1 };
        let (q, n) = (&self.heights, &self.positions);
        q[i] + d * (q[j] - q[i]) / (n[j] - n[i])
    }

    /// Current estimate; `None` before the first sample.
    ///
    /// With fewer than five samples the nearest-rank value among the
    /// samples seen so far is returned.
    ///
    /// ```rust
    /// # use report_aggregator::stats::QuantileEstimator;
    /// let mut median = QuantileEstimator::new(50.0);
    /// assert_eq!(median.result(), None);
    /// for x in [30.0, 10.0, 20.0] {
    ///     median.add_value(x);
    /// }
    /// assert_eq!(median.result(), Some(20.0));
    /// ```
    pub fn result(&self) -> Option<f64> {
        match self.count {
            0 => None,
            c if c < MARKERS as u64 => {
                let n = c as usize;
                let index = (self.p * (n - 1) as f64).round() as usize;
                Some(self.heights[index.min(n - 1)])
            }
            _ => Some(self.heights[2]),
        }
    }
}

/// A percentile label and its estimated value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    /// Report key such as `p95` or `p99.9`
    pub key: String,
    pub percentile: f64,
    pub value: f64,
}

/// One estimator per configured percentile, in configuration order
#[derive(Debug, Clone)]
pub struct PercentileSet {
    estimators: Vec<QuantileEstimator>,
}

impl PercentileSet {
    pub fn new(percentiles: &[f64]) -> Self {
        Self {
            estimators: percentiles.iter().map(|&p| QuantileEstimator::new(p)).collect(),
        }
    }

    pub fn add_value(&mut self, x: f64) {
        for estimator in &mut self.estimators {
            estimator.add_value(x);
        }
    }

    /// Estimated values; zero for an empty set
    pub fn values(&self) -> Vec<PercentileValue> {
        self.estimators
            .iter()
            .map(|e| PercentileValue {
                key: format_percentile_key(e.percentile()),
                percentile: e.percentile(),
                value: e.result().unwrap_or(0.0),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn exact_percentile(values: &[f64], p: f64) -> f64 {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let index = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted[index]
    }

    #[test]
    fn test_empty_estimator() {
        let estimator = QuantileEstimator::new(50.0);
        assert_eq!(estimator.result(), None);
    }

    #[test]
    fn test_fewer_than_five_samples() {
        let mut estimator = QuantileEstimator::new(50.0);
        for v in [30.0, 10.0, 20.0] {
            estimator.add_value(v);
        }
        assert_eq!(estimator.result(), Some(20.0));

        let mut high = QuantileEstimator::new(99.0);
        for v in [5.0, 1.0, 3.0, 4.0] {
            high.add_value(v);
        }
        assert_eq!(high.result(), Some(5.0));
    }

    #[test]
    fn test_median_of_uniform_samples() {
        let mut rng = StdRng::seed_from_u64(7);
        let values: Vec<f64> = (0..5_000).map(|_| rng.gen_range(0.0..=1000.0)).collect();

        let mut estimator = QuantileEstimator::new(50.0);
        for &v in &values {
            estimator.add_value(v);
        }

        let exact = exact_percentile(&values, 50.0);
        let estimate = estimator.result().unwrap();
        assert!(
            ((estimate - exact) / exact).abs() < 0.02,
            "estimate {} vs exact {}",
            estimate,
            exact
        );
    }

    #[test]
    fn test_high_percentile_tracks_tail() {
        let mut rng = StdRng::seed_from_u64(11);
        let values: Vec<f64> = (0..20_000).map(|_| rng.gen_range(100.0..=1000.0)).collect();

        let mut estimator = QuantileEstimator::new(95.0);
        for &v in &values {
            estimator.add_value(v);
        }

        let exact = exact_percentile(&values, 95.0);
        let estimate = estimator.result().unwrap();
        assert!(((estimate - exact) / exact).abs() < 0.05);
    }

    #[test]
    fn test_markers_stay_ordered_on_sorted_input() {
        let mut estimator = QuantileEstimator::new(75.0);
        for v in 0..1_000 {
            estimator.add_value(v as f64);
        }
        assert!(estimator.heights.windows(2).all(|w| w[0] <= w[1]));
        let estimate = estimator.result().unwrap();
        assert!(estimate > 600.0 && estimate < 900.0, "estimate {}", estimate);
    }

    #[test]
    fn test_percentile_set_keys() {
        let mut set = PercentileSet::new(&[50.0, 99.9]);
        set.add_value(1.0);
        let values = set.values();
        assert_eq!(values[0].key, "p50");
        assert_eq!(values[1].key, "p99.9");
        assert_eq!(values[1].value, 1.0);
    }
}
