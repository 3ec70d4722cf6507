//! Timing aggregators: custom timers, actions (with Apdex) and transactions
//! (with events, arrival rate and concurrent users).

use super::{ChartSeries, ChartStyle, ReportWindow};
use crate::concurrent_users::SharedConcurrentUsers;
use crate::config::AggregationConfig;
use crate::record::{MetricRecord, RecordKind};
use crate::stats::{
    CellMode, FixedRangeHistogram, HistogramBin, PercentileSet, QuantileEstimator,
    RunningStatistics, TimeBucketDownsampler,
};
use crate::utils::{percentage, round3, round_half_even, Rates};
use serde::Serialize;
use std::collections::BTreeMap;

/// Arrivals are charted per hour, one second at a time
const ARRIVALS_PER_HOUR: f64 = 3_600.0;

/// Snapshot of the timing core shared by all timer-based series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub count: u64,
    pub errors: u64,
    pub error_percentage: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub deviation: f64,
    pub median: f64,
    pub percentiles: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub rates: Rates,
    pub histogram: Vec<HistogramBin>,
    pub charts: Vec<ChartSeries>,
}

impl TimerSnapshot {
    pub fn chart(&self, name: &str) -> Option<&ChartSeries> {
        self.charts.iter().find(|c| c.name == name)
    }
}

/// Runtime statistics, percentiles, distribution and per-second series of
/// one timer.
#[derive(Debug, Clone)]
pub struct TimerAggregator {
    name: String,
    label: Option<String>,
    runtime: RunningStatistics,
    median: QuantileEstimator,
    percentiles: PercentileSet,
    histogram: FixedRangeHistogram,
    runtime_series: TimeBucketDownsampler,
    count_series: TimeBucketDownsampler,
    error_series: TimeBucketDownsampler,
    errors: u64,
}

impl TimerAggregator {
    pub fn new(name: &str, config: &AggregationConfig) -> Self {
        Self {
            name: name.to_string(),
            label: None,
            runtime: RunningStatistics::new(),
            median: QuantileEstimator::new(50.0),
            percentiles: PercentileSet::new(&config.percentiles),
            histogram: FixedRangeHistogram::dynamic(config.histogram_bins, 1.0),
            runtime_series: TimeBucketDownsampler::new(CellMode::Sample),
            count_series: TimeBucketDownsampler::new(CellMode::Counter),
            error_series: TimeBucketDownsampler::new(CellMode::Counter),
            errors: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> u64 {
        self.runtime.count()
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Time series are keyed by the end of the measurement
    pub fn process_record(&mut self, record: &MetricRecord) {
        let runtime = record.runtime() as f64;
        let end = record.end_timestamp;

        self.runtime.add_value(runtime);
        self.median.add_value(runtime);
        self.percentiles.add_value(runtime);
        self.histogram.add_value(runtime);
        self.runtime_series.add_or_update_value(end, runtime);
        self.count_series.add_or_update_value(end, 1.0);

        if record.failed {
            self.errors += 1;
            self.error_series.add_or_update_value(end, 1.0);
        }
        if record.label.is_some() {
            self.label = record.label.clone();
        }
    }

    pub fn finalize(&self, window: &ReportWindow) -> TimerSnapshot {
        let count = self.runtime.count();
        let resample = |series: &TimeBucketDownsampler| {
            series.resample(window.start, window.end, window.chart_width)
        };

        let charts = vec![
            ChartSeries::from_buckets(
                "Runtime",
                ChartStyle::MinMax,
                "Runtime [ms]",
                &resample(&self.runtime_series),
            ),
            ChartSeries::from_buckets(
                "Count/s",
                ChartStyle::MinMax,
                "Count",
                &resample(&self.count_series),
            ),
            ChartSeries::from_buckets(
                "Errors/s",
                ChartStyle::Bar,
                "Errors",
                &resample(&self.error_series),
            ),
        ];

        TimerSnapshot {
            name: self.name.clone(),
            label: self.label.clone(),
            count,
            errors: self.errors,
            error_percentage: percentage(self.errors, count),
            min: self.runtime.min(),
            max: self.runtime.max(),
            mean: round3(self.runtime.mean()),
            deviation: round3(self.runtime.std_dev()),
            median: round3(self.median.result().unwrap_or(0.0)),
            percentiles: self
                .percentiles
                .values()
                .into_iter()
                .map(|p| (p.key, round3(p.value)))
                .collect(),
            rates: Rates::new(count as f64, window.duration_secs()),
            histogram: self.histogram.to_series(),
            charts,
        }
    }
}

/// Qualitative reading of an Apdex score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApdexRating {
    Excellent,
    Good,
    Fair,
    Poor,
    Unacceptable,
}

impl ApdexRating {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.94 {
            ApdexRating::Excellent
        } else if score >= 0.85 {
            ApdexRating::Good
        } else if score >= 0.70 {
            ApdexRating::Fair
        } else if score >= 0.50 {
            ApdexRating::Poor
        } else {
            ApdexRating::Unacceptable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApdexSnapshot {
    /// Threshold T in seconds
    pub threshold: f64,
    pub score: f64,
    pub rating: ApdexRating,
    pub satisfied: u64,
    pub tolerating: u64,
    pub frustrated: u64,
}

/// Sorts runtimes into satisfied (`rt <= T`), tolerating (`T < rt <= 4T`)
/// and frustrated.
#[derive(Debug, Clone)]
pub struct ApdexClassifier {
    threshold: f64,
    satisfied: u64,
    tolerating: u64,
    frustrated: u64,
}

impl ApdexClassifier {
    /// `threshold` in seconds
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            satisfied: 0,
            tolerating: 0,
            frustrated: 0,
        }
    }

    /// Classify a runtime given in milliseconds
    pub fn add_runtime(&mut self, runtime_ms: i64) {
        let seconds = runtime_ms as f64 / 1000.0;
        if seconds <= self.threshold {
            self.satisfied += 1;
        } else if seconds <= 4.0 * self.threshold {
            self.tolerating += 1;
        } else {
            self.frustrated += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.satisfied + self.tolerating + self.frustrated
    }

    /// `(satisfied + tolerating / 2) / total`, zero without samples
    pub fn score(&self) -> f64 {
        let total = self.total().max(1) as f64;
        (self.satisfied as f64 + self.tolerating as f64 / 2.0) / total
    }

    pub fn snapshot(&self) -> ApdexSnapshot {
        let score = round_half_even(self.score(), 2);
        ApdexSnapshot {
            threshold: self.threshold,
            score,
            rating: ApdexRating::from_score(score),
            satisfied: self.satisfied,
            tolerating: self.tolerating,
            frustrated: self.frustrated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSnapshot {
    #[serde(flatten)]
    pub timer: TimerSnapshot,
    pub apdex: ApdexSnapshot,
}

/// Page-level action: timing plus Apdex
#[derive(Debug, Clone)]
pub struct ActionAggregator {
    timer: TimerAggregator,
    apdex: ApdexClassifier,
}

impl ActionAggregator {
    pub fn new(name: &str, config: &AggregationConfig) -> Self {
        Self {
            timer: TimerAggregator::new(name, config),
            apdex: ApdexClassifier::new(config.apdex.threshold_for(name)),
        }
    }

    pub fn name(&self) -> &str {
        self.timer.name()
    }

    pub fn timer(&self) -> &TimerAggregator {
        &self.timer
    }

    pub fn process_record(&mut self, record: &MetricRecord) {
        self.timer.process_record(record);
        self.apdex.add_runtime(record.runtime());
    }

    pub fn finalize(&self, window: &ReportWindow) -> ActionSnapshot {
        ActionSnapshot {
            timer: self.timer.finalize(window),
            apdex: self.apdex.snapshot(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionSnapshot {
    #[serde(flatten)]
    pub timer: TimerSnapshot,
    pub events: u64,
}

/// Test case run: timing plus events, arrivals and concurrent users
#[derive(Debug)]
pub struct TransactionAggregator {
    timer: TimerAggregator,
    events: u64,
    event_series: TimeBucketDownsampler,
    arrivals: TimeBucketDownsampler,
    concurrent_users: SharedConcurrentUsers,
}

impl TransactionAggregator {
    pub fn new(
        name: &str,
        config: &AggregationConfig,
        concurrent_users: SharedConcurrentUsers,
    ) -> Self {
        Self {
            timer: TimerAggregator::new(name, config),
            events: 0,
            event_series: TimeBucketDownsampler::new(CellMode::Counter),
            arrivals: TimeBucketDownsampler::new(CellMode::Counter),
            concurrent_users,
        }
    }

    pub fn name(&self) -> &str {
        self.timer.name()
    }

    pub fn timer(&self) -> &TimerAggregator {
        &self.timer
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    /// Events are counted, never timed
    pub fn process_record(&mut self, record: &MetricRecord) {
        if record.kind == RecordKind::Event {
            self.events += 1;
            self.event_series.add_or_update_value(record.timestamp, 1.0);
        } else {
            self.timer.process_record(record);
            self.arrivals
                .add_or_update_value(record.timestamp, ARRIVALS_PER_HOUR);
        }
    }

    pub fn finalize(&self, window: &ReportWindow) -> TransactionSnapshot {
        let mut timer = self.timer.finalize(window);
        let (start, end, width) = (window.start, window.end, window.chart_width);

        let users = self
            .concurrent_users
            .read()
            .concurrent_users(Some(self.name()));

        timer.charts.push(ChartSeries::from_buckets(
            "Events/s",
            ChartStyle::Bar,
            "Events",
            &self.event_series.resample(start, end, width),
        ));
        timer.charts.push(ChartSeries::from_buckets(
            "Current Arrival Rate",
            ChartStyle::MinMax,
            "Arrival Rate [1/h]",
            &self.arrivals.resample(start, end, width),
        ));
        timer.charts.push(ChartSeries::from_buckets(
            "Concurrent Users",
            ChartStyle::MinMax,
            "Users",
            &users.resample(start, end, width),
        ));

        TransactionSnapshot {
            timer,
            events: self.events,
        }
    }
}
