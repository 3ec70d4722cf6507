//! # Report Pipeline
//!
//! Wires the aggregation core together for one report: one
//! [`SeriesRegistry`] per metric family, the global slowest-requests
//! tracker and the shared concurrent-users table.
//!
//! [`ReportPipeline::ingest`] takes `&self` and may be called from several
//! reader threads at once. [`ReportPipeline::finalize`] must only be called
//! once every reader has finished.

use crate::aggregator::{
    Aggregator, ChartSeries, ChartStyle, ReportWindow, SeriesSnapshot,
};
use crate::concurrent_users::{ConcurrentUsersTable, SharedConcurrentUsers};
use crate::config::AggregationConfig;
use crate::error::{AggregationError, Result};
use crate::general::{GeneralAggregator, GeneralSnapshot};
use crate::record::{MetricRecord, RecordKind};
use crate::registry::SeriesRegistry;
use crate::stats::{SlowRequest, SlowestRequestsTracker};
use parking_lot::Mutex;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The metric families a report is split into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Requests,
    Actions,
    Transactions,
    CustomTimers,
    CustomValues,
    WebVitals,
}

impl Family {
    pub const ALL: [Family; 6] = [
        Family::Requests,
        Family::Actions,
        Family::Transactions,
        Family::CustomTimers,
        Family::CustomValues,
        Family::WebVitals,
    ];

    /// Family a record kind is aggregated in; events belong to transactions
    pub fn for_kind(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Request => Family::Requests,
            RecordKind::Action => Family::Actions,
            RecordKind::Transaction | RecordKind::Event => Family::Transactions,
            RecordKind::CustomTimer => Family::CustomTimers,
            RecordKind::CustomValue => Family::CustomValues,
            RecordKind::WebVital => Family::WebVitals,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Family::Requests => "requests",
            Family::Actions => "actions",
            Family::Transactions => "transactions",
            Family::CustomTimers => "custom timers",
            Family::CustomValues => "custom values",
            Family::WebVitals => "web vitals",
        }
    }

    fn index(&self) -> usize {
        match self {
            Family::Requests => 0,
            Family::Actions => 1,
            Family::Transactions => 2,
            Family::CustomTimers => 3,
            Family::CustomValues => 4,
            Family::WebVitals => 5,
        }
    }
}

/// Records that did not make it into any series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedRecords {
    /// Failed validation before dispatch
    pub malformed: u64,
    /// Rejected by their aggregator, e.g. unknown web vitals
    pub rejected: u64,
}

impl DroppedRecords {
    pub fn total(&self) -> u64 {
        self.malformed + self.rejected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    pub start: i64,
    pub end: i64,
    pub duration_secs: i64,
}

/// Everything a report renderer needs, sorted and immutable
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSnapshot {
    pub window: WindowSummary,
    pub records: u64,
    pub dropped: DroppedRecords,
    pub requests: Vec<SeriesSnapshot>,
    pub actions: Vec<SeriesSnapshot>,
    pub transactions: Vec<SeriesSnapshot>,
    pub custom_timers: Vec<SeriesSnapshot>,
    pub custom_values: Vec<SeriesSnapshot>,
    pub web_vitals: Vec<SeriesSnapshot>,
    pub slowest_requests: Vec<SlowRequest>,
    /// Users active per second over all transactions
    pub concurrent_users: ChartSeries,
    pub general: GeneralSnapshot,
}

impl ReportSnapshot {
    pub fn family(&self, family: Family) -> &[SeriesSnapshot] {
        match family {
            Family::Requests => &self.requests,
            Family::Actions => &self.actions,
            Family::Transactions => &self.transactions,
            Family::CustomTimers => &self.custom_timers,
            Family::CustomValues => &self.custom_values,
            Family::WebVitals => &self.web_vitals,
        }
    }

    /// Look a series up by family and name
    pub fn series(&self, family: Family, name: &str) -> Option<&SeriesSnapshot> {
        let series = self.family(family);
        series
            .binary_search_by(|s| s.name().cmp(name))
            .ok()
            .map(|i| &series[i])
    }

    pub fn series_count(&self) -> usize {
        Family::ALL.iter().map(|f| self.family(*f).len()).sum()
    }
}

pub struct ReportPipeline {
    config: Arc<AggregationConfig>,
    registries: Vec<SeriesRegistry>,
    slowest_requests: Mutex<SlowestRequestsTracker>,
    general: Mutex<GeneralAggregator>,
    concurrent_users: SharedConcurrentUsers,
    records: AtomicU64,
    malformed: AtomicU64,
    first_timestamp: AtomicI64,
    last_timestamp: AtomicI64,
}

impl std::fmt::Debug for ReportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportPipeline")
            .field("registries", &self.registries)
            .field("records", &self.records.load(Ordering::Relaxed))
            .field("malformed", &self.malformed.load(Ordering::Relaxed))
            .finish()
    }
}

impl ReportPipeline {
    /// Validate the configuration and wire up the registries
    pub fn new(config: AggregationConfig) -> Result<Self> {
        config.validate()?;

        let config = Arc::new(config);
        let concurrent_users = ConcurrentUsersTable::shared();
        let registries = Family::ALL
            .iter()
            .map(|&family| {
                let config = Arc::clone(&config);
                let users = concurrent_users.clone();
                SeriesRegistry::new(
                    family.name(),
                    Box::new(move |name, record| {
                        if Family::for_kind(record.kind) != family {
                            return Err(AggregationError::config(format!(
                                "{} record dispatched to the {} registry",
                                record.kind,
                                family.name()
                            )));
                        }
                        Aggregator::for_record(name, record, &config, &users)
                    }),
                )
            })
            .collect();

        Ok(Self {
            slowest_requests: Mutex::new(SlowestRequestsTracker::new(
                config.slowest_requests.clone(),
            )),
            general: Mutex::new(GeneralAggregator::new(config.chart_width)),
            config,
            registries,
            concurrent_users,
            records: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            first_timestamp: AtomicI64::new(i64::MAX),
            last_timestamp: AtomicI64::new(i64::MIN),
        })
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn registry(&self, family: Family) -> &SeriesRegistry {
        &self.registries[family.index()]
    }

    /// Records offered so far, including dropped ones
    pub fn record_count(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> DroppedRecords {
        DroppedRecords {
            malformed: self.malformed.load(Ordering::Relaxed),
            rejected: self.registries.iter().map(SeriesRegistry::dropped).sum(),
        }
    }

    /// Move timestamps outside the configured window onto its edges.
    ///
    /// Values are kept as they are; only the time series see the clamped
    /// timestamps, so a stray record cannot stretch them.
    fn clamp_to_window<'a>(&self, record: &'a MetricRecord) -> Cow<'a, MetricRecord> {
        let start = self.config.start_time.unwrap_or(i64::MIN);
        let end = self.config.end_time.unwrap_or(i64::MAX);
        if record.timestamp >= start && record.end_timestamp <= end {
            return Cow::Borrowed(record);
        }

        let mut clamped = record.clone();
        clamped.timestamp = record.timestamp.clamp(start, end);
        clamped.end_timestamp = record.end_timestamp.clamp(start, end);
        Cow::Owned(clamped)
    }

    /// Dispatch one record to its series.
    ///
    /// Malformed and rejected records are counted and logged; only a wiring
    /// defect is returned as an error.
    pub fn ingest(&self, record: &MetricRecord) -> Result<()> {
        self.records.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = record.validate() {
            self.malformed.fetch_add(1, Ordering::Relaxed);
            debug!("Dropped record: {}", e);
            return Ok(());
        }
        let record = self.clamp_to_window(record);
        let record = record.as_ref();

        let family = Family::for_kind(record.kind);
        match self.registry(family).record(record.series_key(), record) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("Rejected record: {}", e);
                return Ok(());
            }
        }

        self.first_timestamp
            .fetch_min(record.timestamp, Ordering::Relaxed);
        self.last_timestamp
            .fetch_max(record.end_timestamp, Ordering::Relaxed);

        match record.kind {
            RecordKind::Request => {
                self.slowest_requests.lock().add(record);
                self.general.lock().process_record(record);
            }
            RecordKind::Transaction => {
                self.general.lock().process_record(record);
                if let Some(user_number) = record.user_number {
                    self.concurrent_users.write().record_user_activity(
                        record.timestamp,
                        record.end_timestamp,
                        &record.series_name,
                        user_number,
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Configured window, falling back to the span of the accepted records
    pub fn window(&self) -> ReportWindow {
        let first = self.first_timestamp.load(Ordering::Relaxed);
        let last = self.last_timestamp.load(Ordering::Relaxed);
        let (observed_start, observed_end) = if first <= last { (first, last) } else { (0, 0) };

        let start = self.config.start_time.unwrap_or(observed_start);
        let end = self.config.end_time.unwrap_or(observed_end).max(start);
        ReportWindow {
            start,
            end,
            chart_width: self.config.chart_width,
        }
    }

    /// Snapshot every series of every family.
    ///
    /// Per-series failures end up as empty fragments and never abort the
    /// report.
    pub fn finalize(&self) -> ReportSnapshot {
        let window = self.window();
        info!(
            "Finalizing report for {} records ({} .. {})",
            self.record_count(),
            window.start,
            window.end
        );

        let mut families: Vec<Vec<SeriesSnapshot>> = self
            .registries
            .iter()
            .map(|registry| registry.finalize_all(&window))
            .collect();

        let failed = families
            .iter()
            .flatten()
            .filter(|s| s.is_empty_fragment())
            .count();
        if failed > 0 {
            warn!("{} series could not be finalized", failed);
        }

        let dropped = self.dropped();
        if dropped.total() > 0 {
            warn!(
                "Dropped {} records ({} malformed, {} rejected)",
                dropped.total(),
                dropped.malformed,
                dropped.rejected
            );
        }

        let users = self
            .concurrent_users
            .read()
            .concurrent_users(None)
            .resample(window.start, window.end, window.chart_width);

        let mut take = |family: Family| std::mem::take(&mut families[family.index()]);
        let snapshot = ReportSnapshot {
            window: WindowSummary {
                start: window.start,
                end: window.end,
                duration_secs: window.duration_secs(),
            },
            records: self.record_count(),
            dropped,
            requests: take(Family::Requests),
            actions: take(Family::Actions),
            transactions: take(Family::Transactions),
            custom_timers: take(Family::CustomTimers),
            custom_values: take(Family::CustomValues),
            web_vitals: take(Family::WebVitals),
            slowest_requests: self.slowest_requests.lock().finalize(),
            concurrent_users: ChartSeries::from_buckets(
                "Concurrent Users",
                ChartStyle::MinMax,
                "Users",
                &users,
            ),
            general: self.general.lock().finalize(&window),
        };

        info!("Finalized {} series", snapshot.series_count());
        snapshot
    }
}
