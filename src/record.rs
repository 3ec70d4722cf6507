//! # Metric Records
//!
//! The immutable input unit of the aggregation core. Records are produced by
//! an external parser from the agents' timer logs and handed to the pipeline
//! one at a time; their arrival order across agents is not defined.

use crate::error::{AggregationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// The metric family a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A single HTTP request
    Request,
    /// A page-level action
    Action,
    /// A complete test case run
    Transaction,
    /// An event raised during a transaction
    Event,
    /// A user-defined timer
    CustomTimer,
    /// A sampled numeric value
    CustomValue,
    /// A browser Web Vitals measurement
    WebVital,
}

impl RecordKind {
    /// Whether the record value is a runtime in milliseconds
    pub fn is_timer(&self) -> bool {
        matches!(
            self,
            Self::Request | Self::Action | Self::Transaction | Self::CustomTimer
        )
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Request => write!(f, "Request"),
            RecordKind::Action => write!(f, "Action"),
            RecordKind::Transaction => write!(f, "Transaction"),
            RecordKind::Event => write!(f, "Event"),
            RecordKind::CustomTimer => write!(f, "Custom Timer"),
            RecordKind::CustomValue => write!(f, "Custom Value"),
            RecordKind::WebVital => write!(f, "Web Vital"),
        }
    }
}

/// Request-specific measurements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDetails {
    pub url: String,
    pub bytes_sent: i64,
    pub bytes_received: i64,
    pub dns_time: i64,
    pub connect_time: i64,
    pub send_time: i64,
    pub server_busy_time: i64,
    pub receive_time: i64,
    pub time_to_first_bytes: i64,
    pub time_to_last_bytes: i64,
}

impl RequestDetails {
    /// The URL with any `#fragment` removed
    pub fn url_without_fragment(&self) -> &str {
        match self.url.find('#') {
            Some(pos) => &self.url[..pos],
            None => &self.url,
        }
    }

    /// Stable hash of the fragment-less URL
    pub fn url_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.url_without_fragment().hash(&mut hasher);
        hasher.finish()
    }
}

/// Allowed difference between a timer's runtime and its end minus start
const RUNTIME_TOLERANCE_MS: f64 = 1_000.0;

/// A single timestamped measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub series_name: String,
    /// Start of the measurement, epoch milliseconds
    pub timestamp: i64,
    /// End of the measurement, epoch milliseconds
    pub end_timestamp: i64,
    /// Runtime in ms for timers, the sampled value otherwise
    pub value: f64,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub label: Option<String>,
    pub kind: RecordKind,
    #[serde(default)]
    pub request: Option<RequestDetails>,
    /// Virtual user instance that produced a transaction
    #[serde(default)]
    pub user_number: Option<u32>,
}

impl MetricRecord {
    /// Create a timer record ending at `timestamp + runtime`
    pub fn timer(kind: RecordKind, series_name: &str, timestamp: i64, runtime: i64) -> Self {
        Self {
            series_name: series_name.to_string(),
            timestamp,
            end_timestamp: timestamp + runtime,
            value: runtime as f64,
            failed: false,
            label: None,
            kind,
            request: None,
            user_number: None,
        }
    }

    /// Create a value sample at `timestamp`
    pub fn sample(kind: RecordKind, series_name: &str, timestamp: i64, value: f64) -> Self {
        Self {
            series_name: series_name.to_string(),
            timestamp,
            end_timestamp: timestamp,
            value,
            failed: false,
            label: None,
            kind,
            request: None,
            user_number: None,
        }
    }

    /// Mark the record as failed
    pub fn with_failed(mut self, failed: bool) -> Self {
        self.failed = failed;
        self
    }

    /// Attach request details
    pub fn with_request(mut self, details: RequestDetails) -> Self {
        self.request = Some(details);
        self
    }

    /// Attach a label
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Attach the virtual user instance
    pub fn with_user_number(mut self, user_number: u32) -> Self {
        self.user_number = Some(user_number);
        self
    }

    /// The runtime in whole milliseconds
    pub fn runtime(&self) -> i64 {
        self.value.round() as i64
    }

    /// The name of the series this record aggregates into.
    ///
    /// Web vitals arrive as `"<page> [LCP]"`; they aggregate per page.
    pub fn series_key(&self) -> &str {
        if self.kind == RecordKind::WebVital {
            if let Some((page, _)) = split_web_vital_name(&self.series_name) {
                return page;
            }
        }
        &self.series_name
    }

    /// Reject records that cannot be aggregated.
    pub fn validate(&self) -> Result<()> {
        if self.series_name.is_empty() {
            return Err(AggregationError::malformed("", "empty series name"));
        }
        if !self.value.is_finite() {
            return Err(AggregationError::malformed(
                &self.series_name,
                format!("non-finite value {}", self.value),
            ));
        }
        if self.timestamp < 0 {
            return Err(AggregationError::malformed(
                &self.series_name,
                format!("negative timestamp {}", self.timestamp),
            ));
        }
        if self.end_timestamp < self.timestamp {
            return Err(AggregationError::malformed(
                &self.series_name,
                format!(
                    "end timestamp {} before start {}",
                    self.end_timestamp, self.timestamp
                ),
            ));
        }
        if self.kind.is_timer() && self.value < 0.0 {
            return Err(AggregationError::malformed(
                &self.series_name,
                format!("negative runtime {}", self.value),
            ));
        }
        if self.kind.is_timer() {
            let elapsed = self.end_timestamp.saturating_sub(self.timestamp) as f64;
            if (elapsed - self.value).abs() > RUNTIME_TOLERANCE_MS {
                return Err(AggregationError::malformed(
                    &self.series_name,
                    format!(
                        "runtime {} does not match {} .. {}",
                        self.value, self.timestamp, self.end_timestamp
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Split `"Homepage [LCP]"` into `("Homepage", "LCP")`.
pub fn split_web_vital_name(name: &str) -> Option<(&str, &str)> {
    let trimmed = name.trim_end();
    let open = trimmed.rfind(" [")?;
    let vital = trimmed[open + 2..].strip_suffix(']')?;
    if vital.is_empty() {
        return None;
    }
    Some((&trimmed[..open], vital))
}
