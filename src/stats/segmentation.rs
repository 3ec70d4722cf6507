use serde::{Deserialize, Serialize};

/// Count of values in one runtime interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalCount {
    /// Exclusive lower bound, `None` for the first interval
    pub from: Option<i64>,
    /// Inclusive upper bound, `None` for the overflow interval
    pub to: Option<i64>,
    pub count: u64,
}

/// Classifies values into the intervals `(-inf, b1], (b1, b2], ..., (bn, +inf)`.
#[derive(Debug, Clone)]
pub struct SegmentationCounter {
    boundaries: Vec<i64>,
    counts: Vec<u64>,
}

impl SegmentationCounter {
    /// Counter over the intervals split at `boundaries`
    ///
    /// ## Parameters
    /// * `boundaries` - Inclusive upper bounds, sorted and strictly
    ///   increasing
    ///
    /// ## Examples
    ///
    /// ```rust
    /// # use report_aggregator::stats::SegmentationCounter;
    /// let mut counter = SegmentationCounter::new(&[100, 500]);
    /// for runtime in [50, 100, 101, 499, 2_000] {
    ///     counter.add_value(runtime);
    /// }
    /// assert_eq!(counter.counts(), &[2, 2, 1]);
    /// ```
    pub fn new(boundaries: &[i64]) -> Self {
        Self {
            boundaries: boundaries.to_vec(),
            counts: vec![0; boundaries.len() + 1],
        }
    }

    pub fn add_value(&mut self, x: i64) {
        // first boundary b with x <= b; none means overflow
        let index = self.boundaries.partition_point(|&b| b < x);
        self.counts[index] += 1;
    }

    /// `n + 1` counts, the last one being the overflow interval
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn boundaries(&self) -> &[i64] {
        &self.boundaries
    }

    /// Counts labelled with their interval bounds
    pub fn intervals(&self) -> Vec<IntervalCount> {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &count)| IntervalCount {
                from: i.checked_sub(1).map(|j| self.boundaries[j]),
                to: self.boundaries.get(i).copied(),
                count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_are_inclusive_upper_bounds() {
        let mut counter = SegmentationCounter::new(&[100, 500]);
        for x in [50, 100, 101, 500, 501] {
            counter.add_value(x);
        }
        assert_eq!(counter.counts(), &[2, 2, 1]);
    }

    #[test]
    fn test_without_boundaries_everything_overflows() {
        let mut counter = SegmentationCounter::new(&[]);
        counter.add_value(0);
        counter.add_value(i64::MAX);
        assert_eq!(counter.counts(), &[2]);
    }

    #[test]
    fn test_intervals() {
        let mut counter = SegmentationCounter::new(&[100, 500]);
        counter.add_value(300);

        let intervals = counter.intervals();
        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0].from, None);
        assert_eq!(intervals[0].to, Some(100));
        assert_eq!(intervals[1].from, Some(100));
        assert_eq!(intervals[1].to, Some(500));
        assert_eq!(intervals[1].count, 1);
        assert_eq!(intervals[2].from, Some(500));
        assert_eq!(intervals[2].to, None);
    }
}
