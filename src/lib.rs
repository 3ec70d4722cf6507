//! # Report Aggregator Library
//!
//! The aggregation core of a load-test report generator. It turns an
//! unbounded stream of timestamped measurements, produced by many
//! distributed test agents, into compact per-series statistical summaries
//! in a single streaming pass, with memory bounded independently of the
//! number of samples.
//!
//! ## Metric Families
//!
//! - **Requests**: timing, runtime segmentation, byte and network timing
//!   statistics, distinct URLs and the global slowest-requests list
//! - **Actions**: timing plus Apdex
//! - **Transactions**: timing plus events, arrival rate and concurrent users
//! - **Custom timers**: timing only
//! - **Custom values**: sampled numeric values
//! - **Web Vitals**: p75 and good/needs-improvement/poor counts per vital
//!
//! ## Architecture Overview
//!
//! - `stats`: the single-pass leaf structures (Welford statistics, P²
//!   quantiles, dynamic histograms, time-bucket downsampling, segmentation,
//!   top-K tracking, distinct URLs)
//! - `aggregator`: one aggregator variant per metric family, composed of
//!   the leaves
//! - `registry`: lazily creates one aggregator per series name and
//!   finalizes them in name order with per-series fault isolation
//! - `general`: report-wide series across all requests and transactions
//! - `pipeline`: wires the registries, the slowest-requests tracker, the
//!   general report and the concurrent-users table into one report
//! - `results`: writes the finalized report as JSON
//!
//! ## Usage Example
//!
//! ```rust
//! use report_aggregator::{AggregationConfig, Family, MetricRecord, RecordKind, ReportPipeline};
//!
//! let pipeline = ReportPipeline::new(AggregationConfig::default())?;
//! for i in 0..100 {
//!     let record = MetricRecord::timer(RecordKind::Action, "Login", i * 1_000, 200 + i);
//!     pipeline.ingest(&record)?;
//! }
//!
//! let report = pipeline.finalize();
//! let login = report.series(Family::Actions, "Login").and_then(|s| s.timer()).unwrap();
//! assert_eq!(login.count, 100);
//! assert_eq!(login.min, 200.0);
//! # Ok::<(), report_aggregator::AggregationError>(())
//! ```

/// Per-series aggregators and their snapshots
///
/// One closed enum of variants, one per metric family. Every snapshot
/// carries a declarative list of chart series instead of rendered charts.
pub mod aggregator;

/// Command-line interface and configuration overrides
pub mod cli;

/// Active seconds per virtual user, shared by the transaction aggregators
pub mod concurrent_users;

/// Aggregation configuration, read once before ingestion
pub mod config;

pub mod error;

/// Report-wide throughput, transferred bytes and transaction error rate
pub mod general;

/// Colored log output for the command-line tool
pub mod logging;

/// One report: registries per family, slowest requests, concurrent users
pub mod pipeline;

/// The input records
pub mod record;

/// Series name to aggregator routing
///
/// Guarantees one aggregator per name even under concurrent creation and
/// deterministic, name-sorted snapshots.
pub mod registry;

/// JSON report output with run metadata
pub mod results;

/// Streaming statistics leaves
///
/// Every structure here runs in one pass with bounded memory and is owned
/// by exactly one aggregator.
pub mod stats;

pub mod utils;

pub use aggregator::{Aggregator, ChartSeries, ReportWindow, SeriesSnapshot};
pub use concurrent_users::{ConcurrentUsersTable, SharedConcurrentUsers};
pub use config::{AggregationConfig, ReplacementPolicy};
pub use error::{AggregationError, Result};
pub use general::GeneralSnapshot;
pub use pipeline::{DroppedRecords, Family, ReportPipeline, ReportSnapshot};
pub use record::{MetricRecord, RecordKind, RequestDetails};
pub use registry::SeriesRegistry;
pub use results::{ReportMetadata, ReportWriter};

/// The current version of the report aggregator
///
/// Populated from Cargo.toml and written into every report's metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// Used by [`AggregationConfig::default`] and as CLI defaults.
pub mod defaults {
    /// Default number of buckets per time-series chart
    ///
    /// Matches the pixel width of the report charts, so one bucket maps to
    /// at most one horizontal pixel.
    pub const CHART_WIDTH: usize = 900;

    /// Default number of bins of the dynamic-range histograms
    pub const HISTOGRAM_BINS: usize = 100;

    /// Default percentiles reported for every timer
    pub const PERCENTILES: [f64; 4] = [50.0, 95.0, 99.0, 99.9];

    /// Default Apdex threshold in seconds
    pub const APDEX_THRESHOLD_SECS: f64 = 1.0;

    /// Slowest requests kept per request series
    pub const SLOWEST_PER_BUCKET: usize = 10;

    /// Slowest requests kept in the global list
    pub const SLOWEST_TOTAL: usize = 50;

    /// Requests faster than this [ms] are never listed as slowest
    pub const SLOWEST_MIN_RUNTIME: i64 = 3_000;

    /// URLs retained verbatim per request series
    pub const MAX_RETAINED_URLS: usize = 10;

    /// Default report file name
    pub const OUTPUT_FILE: &str = "report.json";
}
