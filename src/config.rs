//! # Aggregation Configuration
//!
//! Read once before ingestion starts and immutable for the rest of the run.
//! Every aggregator receives a shared reference to the same
//! [`AggregationConfig`]; nothing in the core mutates it.

use crate::defaults;
use crate::error::{AggregationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// How the bounded URL list reacts to a new URL once it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ReplacementPolicy {
    /// Keep the first URLs seen
    #[default]
    Never,
    /// Replace the oldest retained URL
    Always,
    /// Uniform reservoir sample over all distinct URLs seen
    Reservoir {
        /// Fixed seed for reproducible reports; entropy when absent
        #[serde(default)]
        seed: Option<u64>,
    },
}

/// Apdex thresholds, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApdexConfig {
    pub default_threshold: f64,
    /// Per-action overrides keyed by exact action name
    pub thresholds: HashMap<String, f64>,
}

impl Default for ApdexConfig {
    fn default() -> Self {
        Self {
            default_threshold: defaults::APDEX_THRESHOLD_SECS,
            thresholds: HashMap::new(),
        }
    }
}

impl ApdexConfig {
    /// Threshold for the given action in seconds
    pub fn threshold_for(&self, action_name: &str) -> f64 {
        self.thresholds
            .get(action_name)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

/// Capacities and runtime filter of the slowest-requests tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowestRequestsConfig {
    pub per_bucket: usize,
    pub total: usize,
    /// Smallest runtime [ms] considered
    pub min_runtime: i64,
    /// Largest runtime [ms] considered
    pub max_runtime: i64,
}

impl Default for SlowestRequestsConfig {
    fn default() -> Self {
        Self {
            per_bucket: defaults::SLOWEST_PER_BUCKET,
            total: defaults::SLOWEST_TOTAL,
            min_runtime: defaults::SLOWEST_MIN_RUNTIME,
            max_runtime: i64::MAX,
        }
    }
}

/// Describes a custom value sampler for the report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomValueDescription {
    pub description: String,
    pub chart_title: Option<String>,
    pub y_axis_title: Option<String>,
}

/// Complete configuration of one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Start of the report window, epoch ms. Derived from data when absent.
    pub start_time: Option<i64>,
    /// End of the report window, epoch ms. Derived from data when absent.
    pub end_time: Option<i64>,
    /// Number of buckets of every time-series chart
    pub chart_width: usize,
    /// Fixed bin count of the dynamic-range histograms
    pub histogram_bins: usize,
    /// Percentiles in (0, 100) reported for every timer
    pub percentiles: Vec<f64>,
    /// Sorted runtime interval boundaries [ms] for request segmentation
    pub runtime_interval_boundaries: Vec<i64>,
    pub apdex: ApdexConfig,
    pub slowest_requests: SlowestRequestsConfig,
    /// Number of URLs retained verbatim per request series
    pub max_retained_urls: usize,
    pub url_replacement_policy: ReplacementPolicy,
    pub count_distinct_urls: bool,
    /// Optional report metadata for custom value samplers keyed by name
    pub custom_values: HashMap<String, CustomValueDescription>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            chart_width: defaults::CHART_WIDTH,
            histogram_bins: defaults::HISTOGRAM_BINS,
            percentiles: defaults::PERCENTILES.to_vec(),
            runtime_interval_boundaries: Vec::new(),
            apdex: ApdexConfig::default(),
            slowest_requests: SlowestRequestsConfig::default(),
            max_retained_urls: defaults::MAX_RETAINED_URLS,
            url_replacement_policy: ReplacementPolicy::default(),
            count_distinct_urls: true,
            custom_values: HashMap::new(),
        }
    }
}

impl AggregationConfig {
    /// Load a configuration from a JSON file; missing keys take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Check every invariant the aggregators rely on.
    pub fn validate(&self) -> Result<()> {
        if self.chart_width == 0 {
            return Err(AggregationError::config("chart_width must be greater than 0"));
        }
        if self.histogram_bins < 2 {
            return Err(AggregationError::config(
                "histogram_bins must be at least 2",
            ));
        }
        for &p in &self.percentiles {
            if !(p > 0.0 && p < 100.0) {
                return Err(AggregationError::config(format!(
                    "percentile {} is outside (0, 100)",
                    p
                )));
            }
        }
        if let Some(&first) = self.runtime_interval_boundaries.first() {
            if first <= 0 {
                return Err(AggregationError::config(format!(
                    "runtime interval boundary {} must be positive",
                    first
                )));
            }
        }
        if self
            .runtime_interval_boundaries
            .windows(2)
            .any(|w| w[0] >= w[1])
        {
            return Err(AggregationError::config(
                "runtime interval boundaries must be strictly increasing",
            ));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(AggregationError::config(format!(
                    "start time {} is after end time {}",
                    start, end
                )));
            }
        }
        if !(self.apdex.default_threshold > 0.0) {
            return Err(AggregationError::config(
                "default Apdex threshold must be greater than 0",
            ));
        }
        if let Some((name, _)) = self.apdex.thresholds.iter().find(|(_, t)| !(**t > 0.0)) {
            return Err(AggregationError::config(format!(
                "Apdex threshold for '{}' must be greater than 0",
                name
            )));
        }
        self.validate_slowest_requests()?;
        if self.count_distinct_urls && self.max_retained_urls == 0 {
            return Err(AggregationError::config(
                "max_retained_urls must be greater than 0",
            ));
        }
        Ok(())
    }

    fn validate_slowest_requests(&self) -> Result<()> {
        let slowest = &self.slowest_requests;
        if slowest.per_bucket == 0 {
            return Err(AggregationError::config(
                "slowest_requests.per_bucket must be greater than 0",
            ));
        }
        if slowest.total == 0 {
            return Err(AggregationError::config(
                "slowest_requests.total must be greater than 0",
            ));
        }
        if slowest.min_runtime <= 0 || slowest.max_runtime <= 0 {
            return Err(AggregationError::config(
                "slowest_requests runtimes must be greater than 0",
            ));
        }
        if slowest.min_runtime > slowest.max_runtime {
            return Err(AggregationError::config(
                "slowest_requests.min_runtime must not be greater than max_runtime",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AggregationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.percentiles, vec![50.0, 95.0, 99.0, 99.9]);
        assert_eq!(config.url_replacement_policy, ReplacementPolicy::Never);
    }

    #[test]
    fn test_invalid_capacities() {
        let mut config = AggregationConfig::default();
        config.slowest_requests.total = 0;
        assert!(config.validate().unwrap_err().is_fatal());

        let mut config = AggregationConfig::default();
        config.slowest_requests.min_runtime = 5_000;
        config.slowest_requests.max_runtime = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_percentiles_and_boundaries() {
        let mut config = AggregationConfig::default();
        config.percentiles = vec![50.0, 100.0];
        assert!(config.validate().is_err());

        let mut config = AggregationConfig::default();
        config.runtime_interval_boundaries = vec![100, 500, 500];
        assert!(config.validate().is_err());

        let mut config = AggregationConfig::default();
        config.start_time = Some(10);
        config.end_time = Some(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: AggregationConfig = serde_json::from_str(
            r#"{
                "chart_width": 300,
                "runtime_interval_boundaries": [100, 500],
                "apdex": { "thresholds": { "Login": 0.5 } },
                "url_replacement_policy": { "policy": "reservoir", "seed": 7 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.chart_width, 300);
        assert_eq!(config.histogram_bins, defaults::HISTOGRAM_BINS);
        assert_eq!(config.apdex.threshold_for("Login"), 0.5);
        assert_eq!(
            config.apdex.threshold_for("Search"),
            defaults::APDEX_THRESHOLD_SECS
        );
        assert_eq!(
            config.url_replacement_policy,
            ReplacementPolicy::Reservoir { seed: Some(7) }
        );
        assert!(config.validate().is_ok());
    }
}
