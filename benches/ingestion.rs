use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use report_aggregator::stats::{FixedRangeHistogram, QuantileEstimator, TopKTracker};
use report_aggregator::{
    AggregationConfig, MetricRecord, RecordKind, ReportPipeline, RequestDetails,
};

fn request_records(count: usize, series: usize) -> Vec<MetricRecord> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            let name = format!("Request {}", i % series);
            let runtime = rng.gen_range(10..5_000);
            MetricRecord::timer(RecordKind::Request, &name, i as i64 * 10, runtime).with_request(
                RequestDetails {
                    url: format!("https://shop.example/item/{}", rng.gen_range(0..1_000)),
                    bytes_received: rng.gen_range(500..50_000),
                    ..Default::default()
                },
            )
        })
        .collect()
}

fn bench_pipeline_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_ingest");

    for series in [1, 100] {
        let records = request_records(10_000, series);
        group.throughput(Throughput::Elements(records.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(series), &records, |b, records| {
            b.iter(|| {
                let pipeline = ReportPipeline::new(AggregationConfig::default()).unwrap();
                for record in records {
                    pipeline.ingest(black_box(record)).unwrap();
                }
                black_box(pipeline.finalize())
            })
        });
    }
    group.finish();
}

fn bench_leaves(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let values: Vec<f64> = (0..10_000).map(|_| rng.gen_range(0.0..10_000.0)).collect();

    c.bench_function("quantile_p95", |b| {
        b.iter(|| {
            let mut estimator = QuantileEstimator::new(95.0);
            for &v in &values {
                estimator.add_value(v);
            }
            black_box(estimator.result())
        })
    });

    c.bench_function("dynamic_histogram", |b| {
        b.iter(|| {
            let mut histogram = FixedRangeHistogram::dynamic(100, 1.0);
            for &v in &values {
                histogram.add_value(v);
            }
            black_box(histogram.to_series())
        })
    });

    c.bench_function("topk_update", |b| {
        b.iter(|| {
            let mut tracker = TopKTracker::new(50);
            for (i, &v) in values.iter().enumerate() {
                tracker.update(&i.to_string(), v as i64, ());
            }
            black_box(tracker.len())
        })
    });
}

criterion_group!(benches, bench_pipeline_ingest, bench_leaves);
criterion_main!(benches);
