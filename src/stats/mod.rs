//! # Streaming Statistics
//!
//! The leaf structures every aggregator is composed of. Each one runs in a
//! single pass with memory bounded independently of the sample count, and
//! each is owned exclusively by one aggregator.
//!
//! - [`RunningStatistics`]: count/min/max/mean/variance (Welford)
//! - [`QuantileEstimator`]: single percentile estimate (P²)
//! - [`FixedRangeHistogram`]: dynamic or fixed-range bin counts
//! - [`TimeBucketDownsampler`], [`ScaledDownsampler`]: min/max time series
//! - [`SegmentationCounter`]: counts per configured runtime interval
//! - [`TopKTracker`], [`SlowestRequestsTracker`]: bounded slowest items
//! - [`DistinctUrlTracker`]: retained URLs and distinct URL count

pub mod distinct;
pub mod downsample;
pub mod histogram;
pub mod quantile;
pub mod running;
pub mod segmentation;
pub mod topk;

pub use distinct::{DistinctUrlTracker, UrlList};
pub use downsample::{
    coarsen_pairs, CellMode, ResampledBucket, ScaledDownsampler, TimeBucket,
    TimeBucketDownsampler,
};
pub use histogram::{FixedRangeHistogram, HistogramBin, HistogramMode};
pub use quantile::{PercentileSet, PercentileValue, QuantileEstimator};
pub use running::{RunningStatistics, StatisticsSummary};
pub use segmentation::{IntervalCount, SegmentationCounter};
pub use topk::{SlowRequest, SlowestRequestsTracker, TopKEntry, TopKOutcome, TopKTracker};
