//! Request series: the timing core plus runtime segmentation, byte and
//! network timing statistics, response size over time and distinct URLs.

use super::timer::{TimerAggregator, TimerSnapshot};
use super::{ChartSeries, ChartStyle, ReportWindow};
use crate::config::AggregationConfig;
use crate::record::MetricRecord;
use crate::stats::{
    DistinctUrlTracker, FixedRangeHistogram, IntervalCount, RunningStatistics, ScaledDownsampler,
    SegmentationCounter, UrlList,
};
use crate::utils::{round3, Rates};
use serde::Serialize;

/// Bins of the runtime histogram bounded by the segmentation boundaries
const SEGMENTED_HISTOGRAM_BINS: usize = 101;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatisticsReport {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub deviation: f64,
}

impl StatisticsReport {
    fn from_stats(stats: &RunningStatistics) -> Self {
        Self {
            min: stats.min(),
            max: stats.max(),
            mean: round3(stats.mean()),
            deviation: round3(stats.std_dev()),
        }
    }
}

/// Statistics of a summed quantity such as transferred bytes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedStatistics {
    #[serde(flatten)]
    pub statistics: StatisticsReport,
    pub total_count: f64,
    #[serde(flatten)]
    pub rates: Rates,
}

impl ExtendedStatistics {
    fn from_stats(stats: &RunningStatistics, duration: i64) -> Self {
        Self {
            statistics: StatisticsReport::from_stats(stats),
            total_count: stats.sum(),
            rates: Rates::new(stats.sum(), duration),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    #[serde(flatten)]
    pub timer: TimerSnapshot,
    pub count_per_interval: Vec<IntervalCount>,
    pub bytes_sent: ExtendedStatistics,
    pub bytes_received: ExtendedStatistics,
    pub dns_time: StatisticsReport,
    pub connect_time: StatisticsReport,
    pub send_time: StatisticsReport,
    pub server_busy_time: StatisticsReport,
    pub receive_time: StatisticsReport,
    pub time_to_first_bytes: StatisticsReport,
    pub time_to_last_bytes: StatisticsReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<UrlList>,
}

/// Per-field statistics of the request details
#[derive(Debug, Clone, Default)]
struct DetailStatistics {
    bytes_sent: RunningStatistics,
    bytes_received: RunningStatistics,
    dns_time: RunningStatistics,
    connect_time: RunningStatistics,
    send_time: RunningStatistics,
    server_busy_time: RunningStatistics,
    receive_time: RunningStatistics,
    time_to_first_bytes: RunningStatistics,
    time_to_last_bytes: RunningStatistics,
}

#[derive(Debug)]
pub struct RequestAggregator {
    timer: TimerAggregator,
    /// Present when runtime interval boundaries are configured
    segmentation: Option<(SegmentationCounter, FixedRangeHistogram)>,
    details: DetailStatistics,
    response_size: ScaledDownsampler,
    urls: Option<DistinctUrlTracker>,
}

impl RequestAggregator {
    pub fn new(name: &str, config: &AggregationConfig) -> Self {
        let boundaries = &config.runtime_interval_boundaries;
        let segmentation = boundaries.last().map(|&last| {
            // one extra bin beyond the largest boundary collects the slow tail
            let high = last as f64 * SEGMENTED_HISTOGRAM_BINS as f64
                / (SEGMENTED_HISTOGRAM_BINS - 1) as f64;
            (
                SegmentationCounter::new(boundaries),
                FixedRangeHistogram::fixed_range(0.0, high, SEGMENTED_HISTOGRAM_BINS),
            )
        });
        let urls = config.count_distinct_urls.then(|| {
            DistinctUrlTracker::new(config.max_retained_urls, config.url_replacement_policy)
        });

        Self {
            timer: TimerAggregator::new(name, config),
            segmentation,
            details: DetailStatistics::default(),
            response_size: ScaledDownsampler::new(config.chart_width),
            urls,
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

        let runtime = record.runtime();
        if let Some((counter, histogram)) = self.segmentation.as_mut() {
            counter.add_value(runtime);
            histogram.add_value(runtime as f64);
        }

        let Some(details) = record.request.as_ref() else {
            return;
        };

        self.response_size
            .add_or_update_value(record.end_timestamp, details.bytes_received as f64);

        if let Some(urls) = self.urls.as_mut() {
            urls.add(details.url_without_fragment(), details.url_hash());
        }

        let stats = &mut self.details;
        stats.bytes_sent.add_value(details.bytes_sent as f64);
        stats.bytes_received.add_value(details.bytes_received as f64);
        stats.dns_time.add_value(details.dns_time as f64);
        stats.connect_time.add_value(details.connect_time as f64);
        stats.send_time.add_value(details.send_time as f64);
        stats.server_busy_time.add_value(details.server_busy_time as f64);
        stats.receive_time.add_value(details.receive_time as f64);
        stats.time_to_first_bytes.add_value(details.time_to_first_bytes as f64);
        stats.time_to_last_bytes.add_value(details.time_to_last_bytes as f64);
    }

    pub fn finalize(&self, window: &ReportWindow) -> RequestSnapshot {
        let mut timer = self.timer.finalize(window);
        let duration = window.duration_secs();

        let count_per_interval = match &self.segmentation {
            Some((counter, histogram)) => {
                // the bounded distribution replaces the dynamic one
                timer.histogram = histogram.to_series();
                counter.intervals()
            }
            None => Vec::new(),
        };

        timer.charts.push(ChartSeries::from_buckets(
            "Response Size",
            ChartStyle::MinMax,
            "Bytes",
            &self.response_size.buckets(),
        ));

        let stats = &self.details;
        RequestSnapshot {
            timer,
            count_per_interval,
            bytes_sent: ExtendedStatistics::from_stats(&stats.bytes_sent, duration),
            bytes_received: ExtendedStatistics::from_stats(&stats.bytes_received, duration),
            dns_time: StatisticsReport::from_stats(&stats.dns_time),
            connect_time: StatisticsReport::from_stats(&stats.connect_time),
            send_time: StatisticsReport::from_stats(&stats.send_time),
            server_busy_time: StatisticsReport::from_stats(&stats.server_busy_time),
            receive_time: StatisticsReport::from_stats(&stats.receive_time),
            time_to_first_bytes: StatisticsReport::from_stats(&stats.time_to_first_bytes),
            time_to_last_bytes: StatisticsReport::from_stats(&stats.time_to_last_bytes),
            urls: self.urls.as_ref().map(DistinctUrlTracker::to_url_list),
        }
    }
}
