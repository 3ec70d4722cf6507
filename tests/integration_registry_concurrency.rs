//! Concurrent ingestion from several reader threads.

use report_aggregator::{
    AggregationConfig, Aggregator, ConcurrentUsersTable, Family, MetricRecord, RecordKind,
    ReportPipeline, ReportWindow, SeriesRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const THREADS: usize = 8;
const RECORDS_PER_THREAD: i64 = 2_000;
const SERIES: i64 = 16;

#[test]
fn test_one_aggregator_per_name_under_contention() {
    let created = Arc::new(AtomicUsize::new(0));
    let config = AggregationConfig::default();
    let users = ConcurrentUsersTable::shared();

    let counter = Arc::clone(&created);
    let registry = SeriesRegistry::new(
        "custom timers",
        Box::new(move |name, record| {
            counter.fetch_add(1, Ordering::SeqCst);
            Aggregator::for_record(name, record, &config, &users)
        }),
    );

    crossbeam::scope(|scope| {
        for thread in 0..THREADS {
            let registry = &registry;
            scope.spawn(move |_| {
                for i in 0..RECORDS_PER_THREAD {
                    // every thread walks the names from a different offset
                    let series = (i + thread as i64) % SERIES;
                    let name = format!("Timer {:02}", series);
                    let record =
                        MetricRecord::timer(RecordKind::CustomTimer, &name, i, 10 + series);
                    registry.record(&name, &record).unwrap();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(created.load(Ordering::SeqCst), SERIES as usize);
    assert_eq!(registry.len(), SERIES as usize);
    assert_eq!(registry.dropped(), 0);

    let window = ReportWindow {
        start: 0,
        end: RECORDS_PER_THREAD,
        chart_width: 10,
    };
    let snapshots = registry.finalize_all(&window);
    let total: u64 = snapshots.iter().map(|s| s.timer().unwrap().count).sum();
    assert_eq!(total, THREADS as u64 * RECORDS_PER_THREAD as u64);

    let names: Vec<&str> = snapshots.iter().map(|s| s.name()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    // each series only ever saw one runtime
    for snapshot in &snapshots {
        let timer = snapshot.timer().unwrap();
        assert_eq!(timer.min, timer.max);
    }
}

#[test]
fn test_pipeline_shared_between_readers() {
    let pipeline = ReportPipeline::new(AggregationConfig::default()).unwrap();

    crossbeam::scope(|scope| {
        for agent in 0..THREADS as u32 {
            let pipeline = &pipeline;
            scope.spawn(move |_| {
                for i in 0..500i64 {
                    let timestamp = i * 100;
                    let action = MetricRecord::timer(RecordKind::Action, "Login", timestamp, 250);
                    pipeline.ingest(&action).unwrap();

                    let transaction =
                        MetricRecord::timer(RecordKind::Transaction, "TLogin", timestamp, 1_000)
                            .with_user_number(agent);
                    pipeline.ingest(&transaction).unwrap();

                    if i % 50 == 0 {
                        let mut broken = action.clone();
                        broken.timestamp = -1;
                        pipeline.ingest(&broken).unwrap();
                    }
                }
            });
        }
    })
    .unwrap();

    let report = pipeline.finalize();
    assert_eq!(report.dropped.malformed, THREADS as u64 * 10);
    assert_eq!(report.records, THREADS as u64 * (1_000 + 10));

    let login = report.series(Family::Actions, "Login").unwrap().timer().unwrap();
    assert_eq!(login.count, THREADS as u64 * 500);

    let transaction = report.series(Family::Transactions, "TLogin").unwrap().timer().unwrap();
    let users = transaction.chart("Concurrent Users").unwrap();
    let peak = users.points.iter().map(|p| p.max).fold(0.0, f64::max);
    assert_eq!(peak, THREADS as f64);
}
