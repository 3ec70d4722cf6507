use crate::config::{AggregationConfig, ReplacementPolicy};
use crate::error::Result;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Report Aggregator - streaming per-series statistics for load-test results
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// JSON-lines file of metric records; reads stdin when omitted or "-"
    #[clap(short = 'i', long, help_heading = "Core Options")]
    pub input: Option<PathBuf>,

    /// Output file for the report (JSON format)
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_FILE, help_heading = "Core Options")]
    pub output_file: PathBuf,

    /// JSON aggregation config; command-line options override its values
    #[clap(short = 'c', long, help_heading = "Core Options")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,

    /// Report window start (epoch ms); derived from the records when omitted
    #[clap(long, help_heading = "Window")]
    pub start_time: Option<i64>,

    /// Report window end (epoch ms); derived from the records when omitted
    #[clap(long, help_heading = "Window")]
    pub end_time: Option<i64>,

    /// Number of buckets per time-series chart
    #[clap(long, help_heading = "Charts")]
    pub chart_width: Option<usize>,

    /// Number of bins of the runtime histograms
    #[clap(long, help_heading = "Charts")]
    pub histogram_bins: Option<usize>,

    /// Percentiles to report for every timer
    #[clap(long, num_args = 1.., value_delimiter = ',', help_heading = "Statistics")]
    pub percentiles: Option<Vec<f64>>,

    /// Sorted runtime interval boundaries [ms] for request segmentation
    #[clap(long, num_args = 1.., value_delimiter = ',', help_heading = "Statistics")]
    pub runtime_intervals: Option<Vec<i64>>,

    /// Default Apdex threshold in seconds
    #[clap(long, help_heading = "Statistics")]
    pub apdex_threshold: Option<f64>,

    /// Slowest requests kept per request series
    #[clap(long, help_heading = "Slowest Requests")]
    pub slowest_per_bucket: Option<usize>,

    /// Slowest requests kept in total
    #[clap(long, help_heading = "Slowest Requests")]
    pub slowest_total: Option<usize>,

    /// Smallest runtime [ms] a slowest request may have
    #[clap(long, help_heading = "Slowest Requests")]
    pub slowest_min_runtime: Option<i64>,

    /// Largest runtime [ms] a slowest request may have
    #[clap(long, help_heading = "Slowest Requests")]
    pub slowest_max_runtime: Option<i64>,

    /// URLs retained verbatim per request series
    #[clap(long, help_heading = "URLs")]
    pub max_urls: Option<usize>,

    /// What to do with a new URL once the retained list is full
    #[clap(long, value_enum, help_heading = "URLs")]
    pub url_policy: Option<UrlPolicy>,

    /// Seed for the reservoir URL policy
    #[clap(long, help_heading = "URLs")]
    pub url_seed: Option<u64>,

    /// Skip URL retention and distinct URL counting
    #[clap(long, default_value_t = false, help_heading = "URLs")]
    pub no_urls: bool,
}

/// Replacement policies selectable on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum UrlPolicy {
    /// Keep the first URLs seen
    #[clap(name = "never")]
    Never,

    /// Replace the oldest retained URL
    #[clap(name = "always")]
    Always,

    /// Uniform reservoir sample
    #[clap(name = "reservoir")]
    Reservoir,
}

impl std::fmt::Display for UrlPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlPolicy::Never => write!(f, "Never Replace"),
            UrlPolicy::Always => write!(f, "Always Replace"),
            UrlPolicy::Reservoir => write!(f, "Reservoir Sampling"),
        }
    }
}

impl UrlPolicy {
    pub fn to_policy(self, seed: Option<u64>) -> ReplacementPolicy {
        match self {
            UrlPolicy::Never => ReplacementPolicy::Never,
            UrlPolicy::Always => ReplacementPolicy::Always,
            UrlPolicy::Reservoir => ReplacementPolicy::Reservoir { seed },
        }
    }
}

impl Args {
    /// Input path, `None` meaning stdin
    pub fn input_path(&self) -> Option<&PathBuf> {
        self.input
            .as_ref()
            .filter(|path| path.as_os_str() != "-")
    }

    /// Overlay every option given on the command line onto `config`
    pub fn apply_to(&self, config: &mut AggregationConfig) {
        if self.start_time.is_some() {
            config.start_time = self.start_time;
        }
        if self.end_time.is_some() {
            config.end_time = self.end_time;
        }
        if let Some(width) = self.chart_width {
            config.chart_width = width;
        }
        if let Some(bins) = self.histogram_bins {
            config.histogram_bins = bins;
        }
        if let Some(percentiles) = &self.percentiles {
            config.percentiles = percentiles.clone();
        }
        if let Some(boundaries) = &self.runtime_intervals {
            config.runtime_interval_boundaries = boundaries.clone();
        }
        if let Some(threshold) = self.apdex_threshold {
            config.apdex.default_threshold = threshold;
        }

        let slowest = &mut config.slowest_requests;
        if let Some(per_bucket) = self.slowest_per_bucket {
            slowest.per_bucket = per_bucket;
        }
        if let Some(total) = self.slowest_total {
            slowest.total = total;
        }
        if let Some(min_runtime) = self.slowest_min_runtime {
            slowest.min_runtime = min_runtime;
        }
        if let Some(max_runtime) = self.slowest_max_runtime {
            slowest.max_runtime = max_runtime;
        }

        if let Some(max_urls) = self.max_urls {
            config.max_retained_urls = max_urls;
        }
        match (self.url_policy, &mut config.url_replacement_policy) {
            (Some(policy), current) => *current = policy.to_policy(self.url_seed),
            // a seed alone re-seeds a configured reservoir
            (None, ReplacementPolicy::Reservoir { seed }) if self.url_seed.is_some() => {
                *seed = self.url_seed
            }
            _ => {}
        }
        if self.no_urls {
            config.count_distinct_urls = false;
        }
    }

    /// Build the validated configuration: file first, then overrides
    pub fn aggregation_config(&self) -> Result<AggregationConfig> {
        let mut config = match &self.config {
            Some(path) => AggregationConfig::from_json_file(path)?,
            None => AggregationConfig::default(),
        };
        self.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }
}
