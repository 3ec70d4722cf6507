//! # Per-Series Aggregators
//!
//! One [`Aggregator`] exists per series name and metric family. It owns all
//! mutable state of its series, is updated in O(1) amortized time per
//! record and turns into an immutable [`SeriesSnapshot`] at finalize.
//!
//! The family of variants is closed, so dispatch is a plain `match`:
//!
//! - [`TimerAggregator`]: custom timers and the shared timing core
//! - [`ActionAggregator`]: timing plus Apdex
//! - [`TransactionAggregator`]: timing plus events, arrival rate and
//!   concurrent users
//! - [`RequestAggregator`]: timing plus segmentation, byte and latency
//!   statistics and distinct URLs
//! - [`CustomValueAggregator`]: sampled values
//! - [`WebVitalsAggregator`]: Web Vitals per page
//!
//! Charts are not rendered here. Every snapshot carries a declarative list
//! of [`ChartSeries`]; variant extras are simply more entries.

pub mod custom;
pub mod request;
pub mod timer;
pub mod web_vitals;

pub use custom::{CustomValueAggregator, CustomValueSnapshot};
pub use request::{ExtendedStatistics, RequestAggregator, RequestSnapshot, StatisticsReport};
pub use timer::{
    ActionAggregator, ActionSnapshot, ApdexClassifier, ApdexRating, ApdexSnapshot,
    TimerAggregator, TimerSnapshot, TransactionAggregator, TransactionSnapshot,
};
pub use web_vitals::{VitalRating, WebVitalSnapshot, WebVitalsAggregator, WebVitalsSnapshot};

use crate::concurrent_users::SharedConcurrentUsers;
use crate::config::AggregationConfig;
use crate::error::{AggregationError, Result};
use crate::record::{MetricRecord, RecordKind};
use crate::stats::ResampledBucket;
use crate::utils::round3;
use serde::Serialize;

/// Time window and resolution every series is finalized against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    /// Epoch ms
    pub start: i64,
    /// Epoch ms
    pub end: i64,
    /// Number of buckets per time-series chart
    pub chart_width: usize,
}

impl ReportWindow {
    /// Window length in whole seconds, at least one
    pub fn duration_secs(&self) -> i64 {
        crate::utils::duration_secs(self.start, self.end)
    }
}

/// How a renderer should draw a chart series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartStyle {
    /// Representative value plus min/max band
    MinMax,
    /// Representative value only
    Line,
    /// One bar per bucket
    Bar,
}

/// One point of a chart series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    /// Bucket start, epoch ms
    pub time: i64,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// A named series a renderer can draw without further computation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub name: String,
    pub style: ChartStyle,
    pub y_axis_title: String,
    pub points: Vec<ChartPoint>,
}

impl ChartSeries {
    pub fn from_buckets(
        name: &str,
        style: ChartStyle,
        y_axis_title: &str,
        buckets: &[ResampledBucket],
    ) -> Self {
        Self {
            name: name.to_string(),
            style,
            y_axis_title: y_axis_title.to_string(),
            points: buckets
                .iter()
                .map(|b| ChartPoint {
                    time: b.time,
                    value: round3(b.value()),
                    min: round3(b.min),
                    max: round3(b.max),
                })
                .collect(),
        }
    }
}

/// The finalized, read-only result of one series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeriesSnapshot {
    Timer(TimerSnapshot),
    Action(ActionSnapshot),
    Transaction(TransactionSnapshot),
    Request(RequestSnapshot),
    CustomValue(CustomValueSnapshot),
    WebVitals(WebVitalsSnapshot),
    /// Placeholder for a series whose finalize failed
    Empty { name: String, reason: String },
}

impl SeriesSnapshot {
    pub fn name(&self) -> &str {
        match self {
            SeriesSnapshot::Timer(s) => &s.name,
            SeriesSnapshot::Action(s) => &s.timer.name,
            SeriesSnapshot::Transaction(s) => &s.timer.name,
            SeriesSnapshot::Request(s) => &s.timer.name,
            SeriesSnapshot::CustomValue(s) => &s.name,
            SeriesSnapshot::WebVitals(s) => &s.name,
            SeriesSnapshot::Empty { name, .. } => name,
        }
    }

    /// The timing part of timer-based snapshots
    pub fn timer(&self) -> Option<&TimerSnapshot> {
        match self {
            SeriesSnapshot::Timer(s) => Some(s),
            SeriesSnapshot::Action(s) => Some(&s.timer),
            SeriesSnapshot::Transaction(s) => Some(&s.timer),
            SeriesSnapshot::Request(s) => Some(&s.timer),
            _ => None,
        }
    }

    pub fn is_empty_fragment(&self) -> bool {
        matches!(self, SeriesSnapshot::Empty { .. })
    }
}

/// Per-series state of one metric family
#[derive(Debug)]
pub enum Aggregator {
    Timer(TimerAggregator),
    Action(ActionAggregator),
    Transaction(TransactionAggregator),
    Request(RequestAggregator),
    CustomValue(CustomValueAggregator),
    WebVitals(WebVitalsAggregator),
}

impl Aggregator {
    /// Build the aggregator matching a record's kind.
    ///
    /// Event records open a transaction aggregator, since events are counted
    /// by the transaction of the same name.
    pub fn for_record(
        name: &str,
        record: &MetricRecord,
        config: &AggregationConfig,
        concurrent_users: &SharedConcurrentUsers,
    ) -> Result<Self> {
        let aggregator = match record.kind {
            RecordKind::CustomTimer => Aggregator::Timer(TimerAggregator::new(name, config)),
            RecordKind::Action => Aggregator::Action(ActionAggregator::new(name, config)),
            RecordKind::Transaction | RecordKind::Event => Aggregator::Transaction(
                TransactionAggregator::new(name, config, concurrent_users.clone()),
            ),
            RecordKind::Request => Aggregator::Request(RequestAggregator::new(name, config)),
            RecordKind::CustomValue => {
                Aggregator::CustomValue(CustomValueAggregator::new(name, config))
            }
            RecordKind::WebVital => Aggregator::WebVitals(WebVitalsAggregator::new(name)),
        };
        Ok(aggregator)
    }

    pub fn name(&self) -> &str {
        match self {
            Aggregator::Timer(a) => a.name(),
            Aggregator::Action(a) => a.name(),
            Aggregator::Transaction(a) => a.name(),
            Aggregator::Request(a) => a.name(),
            Aggregator::CustomValue(a) => a.name(),
            Aggregator::WebVitals(a) => a.name(),
        }
    }

    /// Number of records accepted so far
    pub fn count(&self) -> u64 {
        match self {
            Aggregator::Timer(a) => a.count(),
            Aggregator::Action(a) => a.timer().count(),
            Aggregator::Transaction(a) => a.timer().count(),
            Aggregator::Request(a) => a.timer().count(),
            Aggregator::CustomValue(a) => a.count(),
            Aggregator::WebVitals(a) => a.count(),
        }
    }

    /// Update the owned state with one record.
    ///
    /// A record of a kind this variant does not aggregate is rejected as
    /// malformed and leaves the state untouched.
    pub fn process_record(&mut self, record: &MetricRecord) -> Result<()> {
        record.validate()?;

        match (self, record.kind) {
            (Aggregator::Timer(a), RecordKind::CustomTimer) => a.process_record(record),
            (Aggregator::Action(a), RecordKind::Action) => a.process_record(record),
            (Aggregator::Transaction(a), RecordKind::Transaction | RecordKind::Event) => {
                a.process_record(record)
            }
            (Aggregator::Request(a), RecordKind::Request) => a.process_record(record),
            (Aggregator::CustomValue(a), RecordKind::CustomValue) => a.process_record(record),
            (Aggregator::WebVitals(a), RecordKind::WebVital) => return a.process_record(record),
            (aggregator, kind) => {
                return Err(AggregationError::malformed(
                    &record.series_name,
                    format!("{} record routed to the '{}' series", kind, aggregator.name()),
                ))
            }
        }
        Ok(())
    }

    /// Produce the snapshot of the accumulated state
    pub fn finalize(&self, window: &ReportWindow) -> Result<SeriesSnapshot> {
        let snapshot = match self {
            Aggregator::Timer(a) => SeriesSnapshot::Timer(a.finalize(window)),
            Aggregator::Action(a) => SeriesSnapshot::Action(a.finalize(window)),
            Aggregator::Transaction(a) => SeriesSnapshot::Transaction(a.finalize(window)),
            Aggregator::Request(a) => SeriesSnapshot::Request(a.finalize(window)),
            Aggregator::CustomValue(a) => SeriesSnapshot::CustomValue(a.finalize(window)),
            Aggregator::WebVitals(a) => SeriesSnapshot::WebVitals(a.finalize()),
        };
        Ok(snapshot)
    }
}
