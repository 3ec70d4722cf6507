use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Min/max/sum/count of the values that fell into one time cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
}

impl TimeBucket {
    pub fn new(value: f64) -> Self {
        Self {
            min: value,
            max: value,
            sum: value,
            count: 1,
        }
    }

    pub fn add_value(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    /// Combine two buckets. The min/max envelope is associative and
    /// commutative; so are `sum` and `count` up to float rounding.
    pub fn merge(&mut self, other: &TimeBucket) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
    }

    /// Representative value for line charts
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// How the values of one second are turned into a chart point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellMode {
    /// Each value is a sample; a second is represented by its mean
    #[default]
    Sample,
    /// Values are occurrences; a second is represented by their sum and
    /// seconds without values count as zero
    Counter,
}

/// One output bucket of a resampled series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResampledBucket {
    /// Bucket start, epoch ms
    pub time: i64,
    /// Bucket width in seconds
    pub width: i64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
}

impl ResampledBucket {
    fn from_bucket(time: i64, width: i64, bucket: &TimeBucket) -> Self {
        Self {
            time,
            width,
            min: bucket.min,
            max: bucket.max,
            sum: bucket.sum,
            count: bucket.count,
        }
    }

    pub fn value(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Merge a directly following bucket into this one
    pub fn merge(&mut self, other: &ResampledBucket) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
        self.width += other.width;
    }
}

/// Halve the resolution of a resampled series by merging adjacent pairs
/// of consecutive buckets.
pub fn coarsen_pairs(buckets: &[ResampledBucket]) -> Vec<ResampledBucket> {
    buckets
        .chunks(2)
        .map(|pair| {
            let mut merged = pair[0];
            if let Some(second) = pair.get(1) {
                merged.merge(second);
            }
            merged
        })
        .collect()
}

fn merge_into(slot: &mut Option<TimeBucket>, bucket: &TimeBucket) {
    match slot {
        Some(existing) => existing.merge(bucket),
        None => *slot = Some(*bucket),
    }
}

/// Occupied cells keyed by absolute cell index.
///
/// Only cells that received a value are stored, so a stray timestamp far
/// from the rest costs one entry instead of one per cell of the gap.
#[derive(Debug, Clone, Default)]
struct CellRow {
    cells: BTreeMap<i64, TimeBucket>,
}

impl CellRow {
    fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn first(&self) -> Option<i64> {
        self.cells.keys().next().copied()
    }

    fn last(&self) -> Option<i64> {
        self.cells.keys().next_back().copied()
    }

    fn get(&self, cell: i64) -> Option<&TimeBucket> {
        self.cells.get(&cell)
    }

    fn add(&mut self, cell: i64, value: f64) {
        self.cells
            .entry(cell)
            .and_modify(|bucket| bucket.add_value(value))
            .or_insert_with(|| TimeBucket::new(value));
    }

    fn merge_cell(&mut self, cell: i64, bucket: &TimeBucket) {
        self.cells
            .entry(cell)
            .and_modify(|existing| existing.merge(bucket))
            .or_insert(*bucket);
    }

    /// Merge every pair of cells `(2k, 2k + 1)` into cell `k`
    fn coarsen(&mut self) {
        let cells = std::mem::take(&mut self.cells);
        for (cell, bucket) in &cells {
            self.merge_cell(cell.div_euclid(2), bucket);
        }
    }

    fn iter(&self) -> impl Iterator<Item = (i64, &TimeBucket)> + '_ {
        self.cells.iter().map(|(&cell, bucket)| (cell, bucket))
    }
}

/// Time series with one-second cells, resampled to any chart width on demand.
///
/// Memory grows with the covered run duration, never with the sample count.
/// Values may arrive out of time order.
#[derive(Debug, Clone, Default)]
pub struct TimeBucketDownsampler {
    mode: CellMode,
    row: CellRow,
    min_time: i64,
    max_time: i64,
    value_count: u64,
}

impl TimeBucketDownsampler {
    pub fn new(mode: CellMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn mode(&self) -> CellMode {
        self.mode
    }

    /// Add a value to the cell of its epoch second
    ///
    /// ## Parameters
    /// * `timestamp` - Epoch ms; any order
    /// * `value` - Sample value, or the occurrence weight in
    ///   [`CellMode::Counter`]
    pub fn add_or_update_value(&mut self, timestamp: i64, value: f64) {
        self.row.add(timestamp.div_euclid(1000), value);

        if self.value_count == 0 {
            self.min_time = timestamp;
            self.max_time = timestamp;
        } else {
            self.min_time = self.min_time.min(timestamp);
            self.max_time = self.max_time.max(timestamp);
        }
        self.value_count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.value_count == 0
    }

    pub fn value_count(&self) -> u64 {
        self.value_count
    }

    /// Earliest timestamp added, `None` when empty
    pub fn min_time(&self) -> Option<i64> {
        (!self.is_empty()).then_some(self.min_time)
    }

    /// Latest timestamp added, `None` when empty
    pub fn max_time(&self) -> Option<i64> {
        (!self.is_empty()).then_some(self.max_time)
    }

    /// Number of one-second cells that received a value
    pub fn cell_count(&self) -> usize {
        self.row.cells.len()
    }

    /// The accumulated state of the given epoch second
    pub fn cell(&self, second: i64) -> Option<TimeBucket> {
        self.row.get(second).copied()
    }

    /// Merge the cells into at most `target` buckets spanning `[start, end]`
    /// (epoch ms, inclusive).
    ///
    /// Bucket width is `ceil(span / target)` whole seconds. Cells outside
    /// the window are clamped into the first or last bucket. Only buckets
    /// that received a cell are returned, in time order.
    ///
    /// In [`CellMode::Counter`] every second between the first and the last
    /// occupied cell takes part, seconds without values as zero.
    ///
    /// ## Parameters
    /// * `start` - Window start, epoch ms
    /// * `end` - Window end, epoch ms, inclusive
    /// * `target` - Maximum number of buckets
    ///
    /// ## Returns
    /// * Non-empty buckets in time order, each at least one second wide
    ///
    /// ## Examples
    ///
    /// ```rust
    /// # use report_aggregator::stats::{CellMode, TimeBucketDownsampler};
    /// let mut series = TimeBucketDownsampler::new(CellMode::Sample);
    /// for second in 0..10 {
    ///     series.add_or_update_value(second * 1000, second as f64);
    /// }
    ///
    /// let buckets = series.resample(0, 9_999, 5);
    /// assert_eq!(buckets.len(), 5);
    /// assert_eq!(buckets[0].width, 2);
    /// assert_eq!((buckets[4].min, buckets[4].max), (8.0, 9.0));
    /// ```
    pub fn resample(&self, start: i64, end: i64, target: usize) -> Vec<ResampledBucket> {
        if self.is_empty() || target == 0 || end < start {
            return Vec::new();
        }

        let start_second = start.div_euclid(1000);
        let end_second = end.div_euclid(1000);
        let span = end_second - start_second + 1;
        let target = target as i64;
        let width = ((span + target - 1) / target).max(1);
        let bucket_count = ((span + width - 1) / width) as usize;
        let last_index = bucket_count as i64 - 1;

        let mut buckets: Vec<Option<TimeBucket>> = vec![None; bucket_count];
        let mut occupied: Vec<i64> = vec![0; bucket_count];
        for (second, cell) in self.row.iter() {
            let index = (second - start_second).div_euclid(width).clamp(0, last_index) as usize;
            let point = match self.mode {
                CellMode::Sample => *cell,
                CellMode::Counter => TimeBucket::new(cell.sum),
            };
            merge_into(&mut buckets[index], &point);
            occupied[index] += 1;
        }

        if let (CellMode::Counter, Some(first), Some(last)) =
            (self.mode, self.row.first(), self.row.last())
        {
            for (i, bucket) in buckets.iter_mut().enumerate() {
                let index = i as i64;
                let lo = if index == 0 {
                    first
                } else {
                    (start_second + index * width).max(first)
                };
                let hi = if index == last_index {
                    last
                } else {
                    (start_second + (index + 1) * width - 1).min(last)
                };
                let empty = (hi - lo + 1).max(0) - occupied[i];
                if empty > 0 {
                    let zeros = TimeBucket {
                        min: 0.0,
                        max: 0.0,
                        sum: 0.0,
                        count: empty as u64,
                    };
                    merge_into(bucket, &zeros);
                }
            }
        }

        buckets
            .iter()
            .enumerate()
            .filter_map(|(i, bucket)| {
                bucket.as_ref().map(|b| {
                    let time = (start_second + i as i64 * width) * 1000;
                    ResampledBucket::from_bucket(time, width, b)
                })
            })
            .collect()
    }

    /// Fold another downsampler into this one
    pub fn merge(&mut self, other: &TimeBucketDownsampler) {
        for (second, bucket) in other.row.iter() {
            self.row.merge_cell(second, bucket);
        }
        if other.value_count == 0 {
            return;
        }
        if self.value_count == 0 {
            self.min_time = other.min_time;
            self.max_time = other.max_time;
        } else {
            self.min_time = self.min_time.min(other.min_time);
            self.max_time = self.max_time.max(other.max_time);
        }
        self.value_count += other.value_count;
    }
}

/// Fixed-width variant: the target cell count is known upfront, so values go
/// straight into cells of `2^k` seconds.
///
/// Twice the target number of cells is kept; whenever the covered range no
/// longer fits, the cell width doubles and adjacent cells merge pairwise.
/// At least `target` cells survive every coarsening.
#[derive(Debug, Clone)]
pub struct ScaledDownsampler {
    capacity: i64,
    shift: u32,
    row: CellRow,
    value_count: u64,
}

impl ScaledDownsampler {
    /// Downsampler keeping between `target` and `2 * target` cells
    pub fn new(target: usize) -> Self {
        Self {
            capacity: (target.max(1) as i64) * 2,
            shift: 0,
            row: CellRow::default(),
            value_count: 0,
        }
    }

    /// Seconds covered by one cell
    pub fn scale(&self) -> i64 {
        1_i64 << self.shift
    }

    pub fn value_count(&self) -> u64 {
        self.value_count
    }

    pub fn add_or_update_value(&mut self, timestamp: i64, value: f64) {
        let second = timestamp.div_euclid(1000);
        let mut cell = second.div_euclid(self.scale());

        while let (Some(first), Some(last)) = (self.row.first(), self.row.last()) {
            if last.max(cell) - first.min(cell) < self.capacity {
                break;
            }
            self.row.coarsen();
            self.shift += 1;
            cell = second.div_euclid(self.scale());
        }

        self.row.add(cell, value);
        self.value_count += 1;
    }

    /// Non-empty cells in time order
    pub fn buckets(&self) -> Vec<ResampledBucket> {
        let scale = self.scale();
        self.row
            .iter()
            .map(|(cell, bucket)| ResampledBucket::from_bucket(cell * scale * 1000, scale, bucket))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(values: &[f64]) -> TimeBucket {
        let mut b = TimeBucket::new(values[0]);
        for &v in &values[1..] {
            b.add_value(v);
        }
        b
    }

    #[test]
    fn test_time_bucket_merge_is_associative() {
        let a = bucket(&[3.0, 9.0]);
        let b = bucket(&[1.0]);
        let c = bucket(&[12.0, 4.0, 7.0]);

        let mut left = a;
        left.merge(&b);
        left.merge(&c);

        let mut bc = b;
        bc.merge(&c);
        let mut right = a;
        right.merge(&bc);

        assert_eq!(left, right);
        assert_eq!(left.min, 1.0);
        assert_eq!(left.max, 12.0);
        assert_eq!(left.count, 6);
    }

    #[test]
    fn test_resample_is_idempotent() {
        let mut series = TimeBucketDownsampler::new(CellMode::Sample);
        for i in 0..5_000_i64 {
            series.add_or_update_value(1_000_000 + i * 37, (i % 97) as f64);
        }

        let first = series.resample(1_000_000, 1_185_000, 40);
        let second = series.resample(1_000_000, 1_185_000, 40);
        assert_eq!(first, second);
        assert!(first.len() <= 40);
        assert_eq!(first.iter().map(|b| b.count).sum::<u64>(), 5_000);
    }

    #[test]
    fn test_out_of_order_values() {
        let mut series = TimeBucketDownsampler::new(CellMode::Sample);
        series.add_or_update_value(10_500, 4.0);
        series.add_or_update_value(5_200, 2.0);
        series.add_or_update_value(10_900, 8.0);

        assert_eq!(series.cell_count(), 2);
        assert_eq!(series.min_time(), Some(5_200));
        assert_eq!(series.max_time(), Some(10_900));
        let cell = series.cell(10).unwrap();
        assert_eq!((cell.min, cell.max, cell.count), (4.0, 8.0, 2));
        assert!(series.cell(7).is_none());
    }

    #[test]
    fn test_coarsening_matches_wider_resample() {
        let mut series = TimeBucketDownsampler::new(CellMode::Sample);
        for second in 0..100_i64 {
            series.add_or_update_value(second * 1000, second as f64);
            series.add_or_update_value(second * 1000 + 500, (second * 3 % 11) as f64);
        }

        let fine = series.resample(0, 99_999, 50);
        let coarse = series.resample(0, 99_999, 25);
        assert_eq!(fine.len(), 50);
        assert_eq!(coarsen_pairs(&fine), coarse);
    }

    #[test]
    fn test_counter_mode_fills_empty_seconds() {
        let mut arrivals = TimeBucketDownsampler::new(CellMode::Counter);
        for t in [0, 100, 200, 3_000] {
            arrivals.add_or_update_value(t, 1.0);
        }

        let buckets = arrivals.resample(0, 3_999, 4);
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0].max, 3.0);
        assert_eq!(buckets[1].max, 0.0);
        assert_eq!(buckets[2].max, 0.0);
        assert_eq!(buckets[3].max, 1.0);
    }

    #[test]
    fn test_out_of_window_cells_are_clamped() {
        let mut series = TimeBucketDownsampler::new(CellMode::Sample);
        series.add_or_update_value(0, 1.0);
        series.add_or_update_value(50_000, 5.0);
        series.add_or_update_value(99_000, 9.0);

        let buckets = series.resample(10_000, 59_999, 5);
        assert_eq!(buckets.first().unwrap().min, 1.0);
        assert_eq!(buckets.last().unwrap().max, 9.0);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<u64>(), 3);
    }

    #[test]
    fn test_stray_timestamp_stays_sparse() {
        let mut arrivals = TimeBucketDownsampler::new(CellMode::Counter);
        arrivals.add_or_update_value(0, 1.0);
        arrivals.add_or_update_value(1_700_000_000_000, 1.0);
        arrivals.add_or_update_value(1_700_000_000_500, 1.0);

        assert_eq!(arrivals.cell_count(), 2);
        let buckets = arrivals.resample(0, 1_700_000_000_999, 100);
        assert!(buckets.len() <= 100);
        assert_eq!(buckets.first().unwrap().max, 1.0);
        assert_eq!(buckets.last().unwrap().max, 2.0);
        // every second between the two cells counts as an empty one
        let seconds: u64 = buckets.iter().map(|b| b.count).sum();
        assert_eq!(seconds, 1_700_000_001);

        let mut scaled = ScaledDownsampler::new(10);
        scaled.add_or_update_value(0, 1.0);
        scaled.add_or_update_value(1_700_000_000_000, 2.0);
        assert_eq!(scaled.buckets().len(), 2);
    }

    #[test]
    fn test_merge_downsamplers() {
        let mut left = TimeBucketDownsampler::new(CellMode::Sample);
        let mut right = TimeBucketDownsampler::new(CellMode::Sample);
        let mut all = TimeBucketDownsampler::new(CellMode::Sample);
        for i in 0..200_i64 {
            let (t, v) = (i * 731, (i % 13) as f64);
            all.add_or_update_value(t, v);
            if i % 3 == 0 {
                left.add_or_update_value(t, v);
            } else {
                right.add_or_update_value(t, v);
            }
        }
        left.merge(&right);

        assert_eq!(left.value_count(), all.value_count());
        let a = left.resample(0, 146_000, 20);
        let b = all.resample(0, 146_000, 20);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!((x.min, x.max, x.count), (y.min, y.max, y.count));
        }
    }

    #[test]
    fn test_scaled_downsampler_stays_bounded() {
        let mut series = ScaledDownsampler::new(100);
        for second in 0..10_000_i64 {
            series.add_or_update_value(second * 1000, second as f64);
        }

        let buckets = series.buckets();
        assert!(buckets.len() <= 200);
        assert!(buckets.len() >= 100);
        assert_eq!(series.scale().count_ones(), 1);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<u64>(), 10_000);
        assert_eq!(buckets[0].min, 0.0);
        assert_eq!(buckets.last().unwrap().max, 9_999.0);
    }

    #[test]
    fn test_scaled_downsampler_grows_backwards() {
        let mut series = ScaledDownsampler::new(2);
        for second in [100, 99, 98, 97, 10] {
            series.add_or_update_value(second * 1000, 1.0);
        }
        assert!(series.buckets().len() <= 4);
        assert_eq!(series.value_count(), 5);
    }
}
