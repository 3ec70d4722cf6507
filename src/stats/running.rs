use serde::{Deserialize, Serialize};

/// Incremental count/min/max/mean/variance using Welford's algorithm.
///
/// Mean and variance are undefined for an empty instance; the accessors then
/// report zero instead of propagating NaN into the report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningStatistics {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
    sum: f64,
}

/// Read-only summary of a [`RunningStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub sum: f64,
}

impl RunningStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single value
    ///
    /// Updates count, sum, min/max and the running mean and squared
    /// deviation (Welford) in O(1).
    ///
    /// ## Parameters
    /// * `x` - The value to add; callers filter non-finite values
    ///
    /// ## Examples
    ///
    /// ```rust
    /// # use report_aggregator::stats::RunningStatistics;
    /// let mut stats = RunningStatistics::new();
    /// for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
    ///     stats.add_value(x);
    /// }
    ///
    /// assert_eq!(stats.count(), 8);
    /// assert_eq!(stats.sum(), 40.0);
    /// assert!((stats.mean() - 5.0).abs() < 1e-12);
    /// assert!((stats.std_dev() - 2.0).abs() < 1e-12);
    /// ```
    pub fn add_value(&mut self, x: f64) {
        if self.count == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }

        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
        self.sum += x;
    }

    /// Fold another instance into this one (Chan et al. parallel update)
    ///
    /// The result matches adding both value streams to one instance, up to
    /// float rounding.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// # use report_aggregator::stats::RunningStatistics;
    /// let mut left = RunningStatistics::new();
    /// let mut right = RunningStatistics::new();
    /// left.add_value(1.0);
    /// right.add_value(3.0);
    /// right.add_value(8.0);
    ///
    /// left.merge(&right);
    /// assert_eq!(left.count(), 3);
    /// assert_eq!((left.min(), left.max()), (1.0, 8.0));
    /// assert!((left.mean() - 4.0).abs() < 1e-12);
    /// ```
    pub fn merge(&mut self, other: &RunningStatistics) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let total = self.count + other.count;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.count as f64 / total as f64;
        let m2 = self.m2
            + other.m2
            + delta * delta * (self.count as f64 * other.count as f64) / total as f64;

        self.count = total;
        self.mean = mean;
        self.m2 = m2;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Population variance, zero for fewer than two values
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn summary(&self) -> StatisticsSummary {
        StatisticsSummary {
            count: self.count,
            min: self.min(),
            max: self.max(),
            mean: self.mean(),
            std_dev: self.std_dev(),
            sum: self.sum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn two_pass(values: &[f64]) -> (f64, f64) {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance =
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
        (mean, variance.sqrt())
    }

    fn relative_error(actual: f64, expected: f64) -> f64 {
        if expected == 0.0 {
            actual.abs()
        } else {
            ((actual - expected) / expected).abs()
        }
    }

    #[test]
    fn test_empty_reports_zero() {
        let stats = RunningStatistics::new();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.min(), 0.0);
        assert_eq!(stats.max(), 0.0);
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.std_dev(), 0.0);
        assert!(!stats.summary().std_dev.is_nan());
    }

    #[test]
    fn test_matches_two_pass_reference() {
        let mut rng = StdRng::seed_from_u64(42);
        let values: Vec<f64> = (0..10_000)
            .map(|_| 1_000_000.0 + rng.gen_range(0.0..500.0))
            .collect();

        let mut stats = RunningStatistics::new();
        for &v in &values {
            stats.add_value(v);
        }

        let (mean, std_dev) = two_pass(&values);
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        assert_eq!(stats.min(), min);
        assert_eq!(stats.max(), max);
        assert!(relative_error(stats.mean(), mean) < 1e-9);
        assert!(relative_error(stats.std_dev(), std_dev) < 1e-9);
    }

    #[test]
    fn test_single_value() {
        let mut stats = RunningStatistics::new();
        stats.add_value(-4.0);
        assert_eq!(stats.min(), -4.0);
        assert_eq!(stats.max(), -4.0);
        assert_eq!(stats.mean(), -4.0);
        assert_eq!(stats.variance(), 0.0);
    }

    #[test]
    fn test_merge_equals_sequential() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64 * 1.5).collect();

        let mut all = RunningStatistics::new();
        let mut left = RunningStatistics::new();
        let mut right = RunningStatistics::new();
        for (i, &v) in values.iter().enumerate() {
            all.add_value(v);
            if i < 37 {
                left.add_value(v);
            } else {
                right.add_value(v);
            }
        }
        left.merge(&right);

        assert_eq!(left.count(), all.count());
        assert_eq!(left.min(), all.min());
        assert_eq!(left.max(), all.max());
        assert!(relative_error(left.mean(), all.mean()) < 1e-12);
        assert!(relative_error(left.std_dev(), all.std_dev()) < 1e-9);
    }
}
