use serde::{Deserialize, Serialize};

/// Bin indexes stay below 2^53 so every index is an exact `f64`
const MAX_INDEX: f64 = 9_007_199_254_740_992.0;

/// Binning mode of a [`FixedRangeHistogram`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HistogramMode {
    /// Fixed bin count, range grows by doubling the bin width on demand
    Dynamic { bin_count: usize, initial_bin_width: f64 },
    /// Fixed `[low, high)` split into `bin_count` bins plus an overflow bin
    FixedRange { low: f64, high: f64, bin_count: usize },
}

/// One bar of a distribution chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Bin counts with either a dynamically rescaled or a fixed range.
///
/// In dynamic mode bin `i` covers `[(base + i) * width, (base + i + 1) * width)`.
/// Rescaling merges adjacent pairs, so no counted value is ever lost:
/// `sum(bins) + overflow == total` always holds.
#[derive(Debug, Clone)]
pub struct FixedRangeHistogram {
    mode: HistogramMode,
    bins: Vec<u64>,
    bin_width: f64,
    /// Absolute bin index of `bins[0]` (dynamic mode)
    base: i64,
    overflow: u64,
    total: u64,
}

impl FixedRangeHistogram {
    pub fn new(mode: HistogramMode) -> Self {
        let (bin_count, bin_width) = match mode {
            HistogramMode::Dynamic {
                bin_count,
                initial_bin_width,
            } => (bin_count.max(2), initial_bin_width.max(f64::MIN_POSITIVE)),
            HistogramMode::FixedRange {
                low,
                high,
                bin_count,
            } => {
                let bin_count = bin_count.max(1);
                (bin_count, ((high - low) / bin_count as f64).max(f64::MIN_POSITIVE))
            }
        };

        Self {
            mode,
            bins: vec![0; bin_count],
            bin_width,
            base: 0,
            overflow: 0,
            total: 0,
        }
    }

    /// Dynamic-range histogram with the given number of bins
    ///
    /// The first value anchors the range. Whenever a value falls outside
    /// it, the bin width doubles and adjacent bins merge until every value
    /// seen so far fits, so the bin count never changes.
    ///
    /// ## Parameters
    /// * `bin_count` - Number of bins, at least two
    /// * `initial_bin_width` - Width of a bin before any rescaling
    ///
    /// ## Examples
    ///
    /// ```rust
    /// # use report_aggregator::stats::FixedRangeHistogram;
    /// let mut histogram = FixedRangeHistogram::dynamic(10, 1.0);
    /// histogram.add_value(3.0);
    /// histogram.add_value(250.0);
    ///
    /// assert_eq!(histogram.bin_counts().len(), 10);
    /// assert_eq!(histogram.bin_width(), 32.0);
    /// assert!(histogram.low() <= 3.0 && histogram.high() > 250.0);
    /// ```
    pub fn dynamic(bin_count: usize, initial_bin_width: f64) -> Self {
        Self::new(HistogramMode::Dynamic {
            bin_count,
            initial_bin_width,
        })
    }

    /// Fixed-range histogram over `[low, high)` with an overflow bin
    ///
    /// ## Parameters
    /// * `low` - Inclusive lower bound; smaller values count in the first bin
    /// * `high` - Exclusive upper bound; larger values count as overflow
    /// * `bin_count` - Number of regular bins
    pub fn fixed_range(low: f64, high: f64, bin_count: usize) -> Self {
        Self::new(HistogramMode::FixedRange {
            low,
            high,
            bin_count,
        })
    }

    /// Count one value; non-finite values are ignored
    pub fn add_value(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        match self.mode {
            HistogramMode::Dynamic { .. } => self.add_dynamic(x),
            HistogramMode::FixedRange { low, high, .. } => {
                if x >= high {
                    self.overflow += 1;
                } else {
                    // values below the range land in the first bin
                    let index = ((x - low) / self.bin_width).floor().max(0.0) as usize;
                    let last = self.bins.len() - 1;
                    self.bins[index.min(last)] += 1;
                }
            }
        }
        self.total += 1;
    }

    fn add_dynamic(&mut self, x: f64) {
        let n = self.bins.len() as i64;

        if self.total == 0 {
            while (x / self.bin_width).abs() >= MAX_INDEX {
                self.bin_width *= 2.0;
            }
            self.base = (x / self.bin_width).floor() as i64;
            self.bins[0] += 1;
            return;
        }

        // double the width until the value has an exact index and fits
        // next to the occupied bins
        let (first, last) = self.occupied_range();
        let mut shifts: u32 = 0;
        let mut width = self.bin_width;
        let (index, lo, hi) = loop {
            let scaled = (x / width).floor();
            if scaled.abs() < MAX_INDEX {
                let index = scaled as i64;
                let shift = shifts.min(63);
                let lo = (first >> shift).min(index);
                let hi = (last >> shift).max(index);
                if hi - lo < n {
                    break (index, lo, hi);
                }
            }
            shifts += 1;
            width *= 2.0;
        };

        if shifts == 0 && index >= self.base && index < self.base + n {
            self.bins[(index - self.base) as usize] += 1;
            return;
        }

        // an arithmetic shift is a floor division by 2^shifts
        let shift = shifts.min(63);
        // leave the free room on the side the new value came from
        let new_base = if index < (first >> shift) { hi - n + 1 } else { lo };
        let mut rebased = vec![0u64; n as usize];
        for (i, &count) in self.bins.iter().enumerate() {
            if count > 0 {
                let absolute = (self.base + i as i64) >> shift;
                rebased[(absolute - new_base) as usize] += count;
            }
        }
        rebased[(index - new_base) as usize] += 1;

        self.bins = rebased;
        self.base = new_base;
        self.bin_width = width;
    }

    /// Absolute indexes of the first and last non-empty bin
    fn occupied_range(&self) -> (i64, i64) {
        let first = self.bins.iter().position(|&c| c > 0).unwrap_or(0);
        let last = self.bins.iter().rposition(|&c| c > 0).unwrap_or(first);
        (self.base + first as i64, self.base + last as i64)
    }

    /// Number of values added
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Count of values at or above the fixed upper bound
    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    pub fn bin_counts(&self) -> &[u64] {
        &self.bins
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    /// Lower bound of the covered range
    pub fn low(&self) -> f64 {
        match self.mode {
            HistogramMode::Dynamic { .. } => self.base as f64 * self.bin_width,
            HistogramMode::FixedRange { low, .. } => low,
        }
    }

    /// Exclusive upper bound of the covered range (overflow excluded)
    pub fn high(&self) -> f64 {
        self.low() + self.bins.len() as f64 * self.bin_width
    }

    /// `(lower, upper, count)` tuples for the distribution chart.
    ///
    /// The overflow bin of a fixed-range histogram is emitted last as one
    /// more bin of the same width above `high`.
    pub fn to_series(&self) -> Vec<HistogramBin> {
        if self.total == 0 {
            return Vec::new();
        }

        let low = self.low();
        let mut series: Vec<HistogramBin> = self
            .bins
            .iter()
            .enumerate()
            .map(|(i, &count)| HistogramBin {
                lower: low + i as f64 * self.bin_width,
                upper: low + (i + 1) as f64 * self.bin_width,
                count,
            })
            .collect();

        if let HistogramMode::FixedRange { high, .. } = self.mode {
            series.push(HistogramBin {
                lower: high,
                upper: high + self.bin_width,
                count: self.overflow,
            });
        }
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counted(histogram: &FixedRangeHistogram) -> u64 {
        histogram.bin_counts().iter().sum::<u64>() + histogram.overflow()
    }

    #[test]
    fn test_dynamic_rescale_keeps_every_value() {
        let mut histogram = FixedRangeHistogram::dynamic(10, 1.0);
        for v in [1.0, 10.0, 100.0, 100_000.0] {
            histogram.add_value(v);
        }

        assert_eq!(histogram.total(), 4);
        assert_eq!(counted(&histogram), 4);
        assert!(histogram.low() <= 1.0);
        assert!(histogram.high() > 100_000.0);
        assert_eq!(histogram.bin_counts().len(), 10);
    }

    #[test]
    fn test_dynamic_grows_downwards() {
        let mut histogram = FixedRangeHistogram::dynamic(4, 1.0);
        for v in [100.0, 101.0, 3.0, -50.0] {
            histogram.add_value(v);
        }

        assert_eq!(counted(&histogram), 4);
        assert!(histogram.low() <= -50.0);
        assert!(histogram.high() > 101.0);
    }

    #[test]
    fn test_dynamic_without_rescale() {
        let mut histogram = FixedRangeHistogram::dynamic(10, 1.0);
        for v in [5.0, 5.5, 6.0, 14.9] {
            histogram.add_value(v);
        }

        assert_eq!(histogram.bin_width(), 1.0);
        assert_eq!(histogram.low(), 5.0);
        assert_eq!(histogram.bin_counts()[0], 2);
        assert_eq!(histogram.bin_counts()[1], 1);
        assert_eq!(histogram.bin_counts()[9], 1);
    }

    #[test]
    fn test_dynamic_width_is_power_of_two_growth() {
        let mut histogram = FixedRangeHistogram::dynamic(8, 1.0);
        histogram.add_value(0.0);
        histogram.add_value(8.0);
        assert_eq!(histogram.bin_width(), 2.0);
        histogram.add_value(63.0);
        assert_eq!(histogram.bin_width(), 8.0);
        assert_eq!(counted(&histogram), 3);
    }

    #[test]
    fn test_fixed_range_overflow() {
        let mut histogram = FixedRangeHistogram::fixed_range(0.0, 500.0, 100);
        for v in [0.0, 4.9, 5.0, 499.9, 500.0, 10_000.0] {
            histogram.add_value(v);
        }

        assert_eq!(histogram.overflow(), 2);
        assert_eq!(histogram.bin_counts()[0], 2);
        assert_eq!(histogram.bin_counts()[1], 1);
        assert_eq!(histogram.bin_counts()[99], 1);
        assert_eq!(counted(&histogram), 6);

        let series = histogram.to_series();
        assert_eq!(series.len(), 101);
        let overflow_bin = series.last().unwrap();
        assert_eq!(overflow_bin.lower, 500.0);
        assert_eq!(overflow_bin.upper, 505.0);
        assert_eq!(overflow_bin.count, 2);
        assert_eq!(series.iter().map(|b| b.count).sum::<u64>(), 6);
    }

    #[test]
    fn test_dynamic_extreme_magnitudes() {
        for bin_count in [2, 100] {
            let mut histogram = FixedRangeHistogram::dynamic(bin_count, 0.001);
            histogram.add_value(-1e300);
            histogram.add_value(1e300);

            assert_eq!(counted(&histogram), 2);
            assert!(histogram.low() <= -1e300);
            assert!(histogram.high() > 1e300);

            let series = histogram.to_series();
            assert_eq!(series.len(), bin_count);
            assert_eq!(series[0].count, 1);
            let top = series.iter().rposition(|b| b.count > 0).unwrap();
            assert!(series[top].lower <= 1e300 && series[top].upper > 1e300);
        }
    }

    #[test]
    fn test_dynamic_small_then_huge() {
        let mut histogram = FixedRangeHistogram::dynamic(100, 1.0);
        for v in [0.5, 3.0, 42.0] {
            histogram.add_value(v);
        }
        histogram.add_value(f64::MAX);

        assert_eq!(counted(&histogram), 4);
        assert!(histogram.low() <= 0.5);
        assert_eq!(histogram.bin_counts()[0], 3);
        let series = histogram.to_series();
        let top = series.iter().rposition(|b| b.count > 0).unwrap();
        assert_eq!(series[top].count, 1);
        assert!(series[top].upper > f64::MAX);
    }

    #[test]
    fn test_empty_series() {
        let histogram = FixedRangeHistogram::dynamic(10, 1.0);
        assert!(histogram.to_series().is_empty());
    }
}
