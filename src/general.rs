//! # General Report
//!
//! Report-wide series that cut across every request and transaction
//! series: hits and transferred bytes per second, request runtime over
//! time and the transaction error rate.
//!
//! The pipeline feeds every accepted request and transaction record into
//! one [`GeneralAggregator`]; everything else is ignored here.

use crate::aggregator::{ChartPoint, ChartSeries, ChartStyle, ReportWindow};
use crate::record::{MetricRecord, RecordKind};
use crate::stats::{CellMode, ResampledBucket, ScaledDownsampler, TimeBucketDownsampler};
use crate::utils::round3;
use serde::Serialize;
use std::collections::BTreeMap;

/// Totals and charts over all requests and transactions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSnapshot {
    /// Number of requests
    pub hits: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub transactions: u64,
    pub failed_transactions: u64,
    pub charts: Vec<ChartSeries>,
}

impl GeneralSnapshot {
    pub fn chart(&self, name: &str) -> Option<&ChartSeries> {
        self.charts.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct GeneralAggregator {
    hits: u64,
    bytes_sent: u64,
    bytes_received: u64,
    transactions: u64,
    failed_transactions: u64,
    bytes_sent_series: TimeBucketDownsampler,
    bytes_received_series: TimeBucketDownsampler,
    request_series: TimeBucketDownsampler,
    request_runtime: ScaledDownsampler,
    transaction_series: TimeBucketDownsampler,
    failed_transaction_series: TimeBucketDownsampler,
}

impl GeneralAggregator {
    pub fn new(chart_width: usize) -> Self {
        Self {
            hits: 0,
            bytes_sent: 0,
            bytes_received: 0,
            transactions: 0,
            failed_transactions: 0,
            bytes_sent_series: TimeBucketDownsampler::new(CellMode::Counter),
            bytes_received_series: TimeBucketDownsampler::new(CellMode::Counter),
            request_series: TimeBucketDownsampler::new(CellMode::Counter),
            request_runtime: ScaledDownsampler::new(chart_width),
            transaction_series: TimeBucketDownsampler::new(CellMode::Counter),
            failed_transaction_series: TimeBucketDownsampler::new(CellMode::Counter),
        }
    }

    /// Account one accepted record.
    ///
    /// Requests are counted when they end, their sent bytes once connect
    /// and send time have passed. Transactions are counted when they end.
    pub fn process_record(&mut self, record: &MetricRecord) {
        let end = record.end_timestamp;

        match record.kind {
            RecordKind::Request => {
                self.hits += 1;
                self.request_series.add_or_update_value(end, 1.0);
                self.request_runtime
                    .add_or_update_value(end, record.runtime() as f64);

                if let Some(details) = record.request.as_ref() {
                    let sent = details.bytes_sent.max(0);
                    let received = details.bytes_received.max(0);
                    let send_completed = record
                        .timestamp
                        .saturating_add(details.connect_time)
                        .saturating_add(details.send_time)
                        .clamp(record.timestamp, end);

                    self.bytes_sent = self.bytes_sent.saturating_add(sent as u64);
                    self.bytes_received = self.bytes_received.saturating_add(received as u64);
                    self.bytes_sent_series
                        .add_or_update_value(send_completed, sent as f64);
                    self.bytes_received_series
                        .add_or_update_value(end, received as f64);
                }
            }
            RecordKind::Transaction => {
                self.transactions += 1;
                self.transaction_series.add_or_update_value(end, 1.0);
                if record.failed {
                    self.failed_transactions += 1;
                    self.failed_transaction_series.add_or_update_value(end, 1.0);
                }
            }
            _ => {}
        }
    }

    pub fn finalize(&self, window: &ReportWindow) -> GeneralSnapshot {
        let resample = |series: &TimeBucketDownsampler| {
            series.resample(window.start, window.end, window.chart_width)
        };
        let transactions = resample(&self.transaction_series);
        let failed = resample(&self.failed_transaction_series);

        let charts = vec![
            ChartSeries::from_buckets(
                "Received Bytes/s",
                ChartStyle::MinMax,
                "Bytes",
                &resample(&self.bytes_received_series),
            ),
            ChartSeries::from_buckets(
                "Sent Bytes/s",
                ChartStyle::MinMax,
                "Bytes",
                &resample(&self.bytes_sent_series),
            ),
            ChartSeries::from_buckets(
                "Requests/s",
                ChartStyle::MinMax,
                "Requests",
                &resample(&self.request_series),
            ),
            ChartSeries::from_buckets(
                "Request Runtime",
                ChartStyle::MinMax,
                "Runtime [ms]",
                &self.request_runtime.buckets(),
            ),
            ChartSeries::from_buckets(
                "Transaction Errors/s",
                ChartStyle::Bar,
                "Errors",
                &failed,
            ),
            ChartSeries {
                name: "Transaction Error Rate".to_string(),
                style: ChartStyle::Line,
                y_axis_title: "Error Rate [%]".to_string(),
                points: error_rate(&failed, &transactions),
            },
        ];

        GeneralSnapshot {
            hits: self.hits,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            transactions: self.transactions,
            failed_transactions: self.failed_transactions,
            charts,
        }
    }
}

/// Failed share of the transactions that ended in each bucket, in percent.
///
/// Both inputs must be resampled against the same window and width.
fn error_rate(failed: &[ResampledBucket], total: &[ResampledBucket]) -> Vec<ChartPoint> {
    let failed: BTreeMap<i64, f64> = failed.iter().map(|b| (b.time, b.sum)).collect();

    total
        .iter()
        .filter(|bucket| bucket.sum > 0.0)
        .map(|bucket| {
            let errors = failed.get(&bucket.time).copied().unwrap_or(0.0);
            let rate = round3(errors * 100.0 / bucket.sum);
            ChartPoint {
                time: bucket.time,
                value: rate,
                min: rate,
                max: rate,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RequestDetails;

    fn window() -> ReportWindow {
        ReportWindow {
            start: 0,
            end: 9_999,
            chart_width: 10,
        }
    }

    #[test]
    fn test_request_throughput() {
        let mut general = GeneralAggregator::new(10);
        for i in 0..20_i64 {
            let record = MetricRecord::timer(RecordKind::Request, "Home.1", i * 500, 100)
                .with_request(RequestDetails {
                    bytes_sent: 100,
                    bytes_received: 1_000,
                    connect_time: 10,
                    send_time: 5,
                    ..Default::default()
                });
            general.process_record(&record);
        }

        let snapshot = general.finalize(&window());
        assert_eq!(snapshot.hits, 20);
        assert_eq!(snapshot.bytes_sent, 2_000);
        assert_eq!(snapshot.bytes_received, 20_000);

        // two requests end in every second
        let requests = snapshot.chart("Requests/s").unwrap();
        assert_eq!(requests.points.len(), 10);
        assert!(requests.points.iter().all(|p| p.value == 2.0));

        let received = snapshot.chart("Received Bytes/s").unwrap();
        assert!(received.points.iter().all(|p| p.max == 2_000.0));

        let runtime = snapshot.chart("Request Runtime").unwrap();
        assert!(runtime.points.iter().all(|p| p.value == 100.0));
    }

    #[test]
    fn test_transaction_error_rate() {
        let mut general = GeneralAggregator::new(10);
        for i in 0..8_i64 {
            // first second: 4 transactions, 1 failed; fourth second: 4, 3 failed
            let start = if i < 4 { 0 } else { 3_000 };
            let failed = i == 0 || i > 4;
            let record = MetricRecord::timer(RecordKind::Transaction, "TCheckout", start, 500)
                .with_failed(failed);
            general.process_record(&record);
        }
        general.process_record(&MetricRecord::timer(RecordKind::Action, "Checkout", 0, 10));

        let snapshot = general.finalize(&window());
        assert_eq!(snapshot.transactions, 8);
        assert_eq!(snapshot.failed_transactions, 4);
        assert_eq!(snapshot.hits, 0);

        let rate = snapshot.chart("Transaction Error Rate").unwrap();
        let values: Vec<(i64, f64)> = rate.points.iter().map(|p| (p.time, p.value)).collect();
        assert_eq!(values, vec![(0, 25.0), (3_000, 75.0)]);

        let errors = snapshot.chart("Transaction Errors/s").unwrap();
        assert_eq!(errors.points.first().unwrap().max, 1.0);
        assert_eq!(errors.points.last().unwrap().max, 3.0);
    }

    #[test]
    fn test_empty_general_report() {
        let snapshot = GeneralAggregator::new(10).finalize(&window());
        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.charts.len(), 6);
        assert!(snapshot.charts.iter().all(|c| c.points.is_empty()));
    }
}
