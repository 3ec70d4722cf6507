//! # Series Registry
//!
//! Routes records by series name to a lazily created [`Aggregator`].
//!
//! ## Concurrency Contract
//!
//! - Create-or-get is atomic per name: the map is checked under a read lock
//!   and, on a miss, re-checked and filled under the write lock, so two
//!   threads racing on the same new name still end up sharing one
//!   aggregator.
//! - Each aggregator sits behind its own mutex; records for different
//!   series never contend with each other.
//! - [`SeriesRegistry::finalize_all`] is a barrier. It must only run after
//!   ingestion has drained.

use crate::aggregator::{Aggregator, ReportWindow, SeriesSnapshot};
use crate::error::{AggregationError, Result};
use crate::record::MetricRecord;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Builds the aggregator for a series on its first record
pub type AggregatorFactory =
    Box<dyn Fn(&str, &MetricRecord) -> Result<Aggregator> + Send + Sync>;

type SharedAggregator = Arc<Mutex<Aggregator>>;

pub struct SeriesRegistry {
    family: &'static str,
    factory: AggregatorFactory,
    series: RwLock<HashMap<String, SharedAggregator>>,
    dropped: AtomicU64,
}

impl std::fmt::Debug for SeriesRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesRegistry")
            .field("family", &self.family)
            .field("series", &self.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl SeriesRegistry {
    /// `family` names the registry in logs, e.g. `"requests"`
    pub fn new(family: &'static str, factory: AggregatorFactory) -> Self {
        Self {
            family,
            factory,
            series: RwLock::new(HashMap::new()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Number of series created so far
    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }

    /// Records rejected by their aggregator
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn get_or_create(&self, name: &str, record: &MetricRecord) -> Result<SharedAggregator> {
        if let Some(aggregator) = self.series.read().get(name) {
            return Ok(Arc::clone(aggregator));
        }

        let mut series = self.series.write();
        if let Some(aggregator) = series.get(name) {
            // created by another thread between the two locks
            return Ok(Arc::clone(aggregator));
        }

        let aggregator = Arc::new(Mutex::new((self.factory)(name, record)?));
        series.insert(name.to_string(), Arc::clone(&aggregator));
        debug!("Created {} aggregator for '{}'", self.family, name);
        Ok(aggregator)
    }

    /// Forward a record to the aggregator of `name`, creating it first if
    /// needed.
    ///
    /// A factory failure is a wiring defect and returned as a fatal
    /// configuration error. A record the aggregator rejects is counted as
    /// dropped; the rejection is returned so the caller can log it.
    pub fn record(&self, name: &str, record: &MetricRecord) -> Result<()> {
        let aggregator = self.get_or_create(name, record).map_err(|e| match e {
            AggregationError::Configuration(_) => e,
            other => AggregationError::config(format!(
                "failed to create {} aggregator for '{}': {}",
                self.family, name, other
            )),
        })?;

        let outcome = aggregator.lock().process_record(record);
        if outcome.is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    /// Snapshot of every series, sorted by name.
    ///
    /// A series whose finalize fails or panics is logged and replaced by an
    /// [`SeriesSnapshot::Empty`] fragment; all others are unaffected.
    pub fn finalize_all(&self, window: &ReportWindow) -> Vec<SeriesSnapshot> {
        self.finalize_with(window, Aggregator::finalize)
    }

    /// Sorted snapshots produced by `finalize`, one failure isolated per
    /// series
    fn finalize_with<F>(&self, window: &ReportWindow, finalize: F) -> Vec<SeriesSnapshot>
    where
        F: Fn(&Aggregator, &ReportWindow) -> Result<SeriesSnapshot>,
    {
        let mut entries: Vec<(String, SharedAggregator)> = self
            .series
            .read()
            .iter()
            .map(|(name, aggregator)| (name.clone(), Arc::clone(aggregator)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        entries
            .into_iter()
            .map(|(name, aggregator)| {
                let guard = aggregator.lock();
                let outcome = catch_unwind(AssertUnwindSafe(|| finalize(&*guard, window)));

                let reason = match outcome {
                    Ok(Ok(snapshot)) => return snapshot,
                    Ok(Err(e)) => e.to_string(),
                    Err(panic) => panic_message(panic.as_ref()),
                };
                let failure = AggregationError::Finalize {
                    series: name.clone(),
                    reason: reason.clone(),
                };
                error!("{} ({} series)", failure, self.family);
                SeriesSnapshot::Empty { name, reason }
            })
            .collect()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during finalize".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::TimerAggregator;
    use crate::config::AggregationConfig;
    use crate::record::RecordKind;

    fn timer_registry() -> SeriesRegistry {
        let config = AggregationConfig::default();
        SeriesRegistry::new(
            "custom timers",
            Box::new(move |name, _| Ok(Aggregator::Timer(TimerAggregator::new(name, &config)))),
        )
    }

    fn window() -> ReportWindow {
        ReportWindow {
            start: 0,
            end: 10_000,
            chart_width: 10,
        }
    }

    #[test]
    fn test_one_aggregator_per_name() {
        let registry = timer_registry();
        for name in ["b", "a", "b", "c", "a", "b"] {
            let record = MetricRecord::timer(RecordKind::CustomTimer, name, 0, 10);
            registry.record(name, &record).unwrap();
        }

        assert_eq!(registry.len(), 3);
        let snapshots = registry.finalize_all(&window());
        let names: Vec<&str> = snapshots.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(snapshots[1].timer().unwrap().count, 3);
    }

    #[test]
    fn test_rejected_records_are_counted() {
        let registry = timer_registry();
        let mut bad = MetricRecord::timer(RecordKind::CustomTimer, "a", 0, 10);
        bad.value = f64::INFINITY;

        assert!(registry.record("a", &bad).is_err());
        assert_eq!(registry.dropped(), 1);
        assert_eq!(registry.finalize_all(&window())[0].timer().unwrap().count, 0);
    }

    #[test]
    fn test_factory_failure_is_fatal() {
        let registry = SeriesRegistry::new(
            "broken",
            Box::new(|name, _| Err(AggregationError::malformed(name, "no variant"))),
        );
        let record = MetricRecord::timer(RecordKind::CustomTimer, "a", 0, 10);

        let err = registry.record("a", &record).unwrap_err();
        assert!(err.is_fatal());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failing_series_do_not_affect_others() {
        let registry = timer_registry();
        for name in ["d", "panics", "a", "errors"] {
            let record = MetricRecord::timer(RecordKind::CustomTimer, name, 0, 10);
            registry.record(name, &record).unwrap();
        }

        let snapshots = registry.finalize_with(&window(), |aggregator, window| {
            match aggregator.name() {
                "panics" => panic!("corrupt state"),
                "errors" => Err(AggregationError::config("missing threshold")),
                _ => aggregator.finalize(window),
            }
        });

        let names: Vec<&str> = snapshots.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "d", "errors", "panics"]);
        assert_eq!(snapshots[0].timer().unwrap().count, 1);
        assert_eq!(snapshots[1].timer().unwrap().count, 1);

        match &snapshots[2] {
            SeriesSnapshot::Empty { reason, .. } => assert!(reason.contains("missing threshold")),
            other => panic!("expected an empty fragment, got {:?}", other),
        }
        match &snapshots[3] {
            SeriesSnapshot::Empty { reason, .. } => assert_eq!(reason, "corrupt state"),
            other => panic!("expected an empty fragment, got {:?}", other),
        }

        // the panicking series stays usable
        let again = registry.finalize_all(&window());
        assert_eq!(again[3].timer().unwrap().count, 1);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
