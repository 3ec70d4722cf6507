use super::{ChartSeries, ChartStyle, ReportWindow};
use crate::config::AggregationConfig;
use crate::record::MetricRecord;
use crate::stats::{
    FixedRangeHistogram, HistogramBin, PercentileSet, QuantileEstimator, RunningStatistics,
    ScaledDownsampler,
};
use crate::utils::{chart_id, round3, Rates};
use serde::Serialize;
use std::collections::BTreeMap;

const DEFAULT_Y_AXIS_TITLE: &str = "Value";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomValueSnapshot {
    pub name: String,
    pub description: String,
    pub chart_title: String,
    pub y_axis_title: String,
    /// File name stem a renderer should use for this series' charts
    pub chart_filename: String,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub standard_deviation: f64,
    pub median: f64,
    pub percentiles: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub rates: Rates,
    pub histogram: Vec<HistogramBin>,
    pub charts: Vec<ChartSeries>,
}

/// Sampled numeric values such as CPU usage or queue length
#[derive(Debug, Clone)]
pub struct CustomValueAggregator {
    name: String,
    description: String,
    chart_title: String,
    y_axis_title: String,
    chart_filename: String,
    stats: RunningStatistics,
    median: QuantileEstimator,
    percentiles: PercentileSet,
    histogram: FixedRangeHistogram,
    values: ScaledDownsampler,
}

impl CustomValueAggregator {
    pub fn new(name: &str, config: &AggregationConfig) -> Self {
        let described = config.custom_values.get(name);

        Self {
            name: name.to_string(),
            description: described.map(|d| d.description.clone()).unwrap_or_default(),
            chart_title: described
                .and_then(|d| d.chart_title.clone())
                .unwrap_or_else(|| name.to_string()),
            y_axis_title: described
                .and_then(|d| d.y_axis_title.clone())
                .unwrap_or_else(|| DEFAULT_Y_AXIS_TITLE.to_string()),
            chart_filename: chart_id(name),
            stats: RunningStatistics::new(),
            median: QuantileEstimator::new(50.0),
            percentiles: PercentileSet::new(&config.percentiles),
            // sampled values are often fractional
            histogram: FixedRangeHistogram::dynamic(config.histogram_bins, 0.001),
            values: ScaledDownsampler::new(config.chart_width),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> u64 {
        self.stats.count()
    }

    pub fn process_record(&mut self, record: &MetricRecord) {
        let value = record.value;
        self.values.add_or_update_value(record.timestamp, value);
        self.stats.add_value(value);
        self.median.add_value(value);
        self.percentiles.add_value(value);
        self.histogram.add_value(value);
    }

    pub fn finalize(&self, window: &ReportWindow) -> CustomValueSnapshot {
        let count = self.stats.count();

        CustomValueSnapshot {
            name: self.name.clone(),
            description: self.description.clone(),
            chart_title: self.chart_title.clone(),
            y_axis_title: self.y_axis_title.clone(),
            chart_filename: self.chart_filename.clone(),
            count,
            min: round3(self.stats.min()),
            max: round3(self.stats.max()),
            mean: round3(self.stats.mean()),
            standard_deviation: round3(self.stats.std_dev()),
            median: round3(self.median.result().unwrap_or(0.0)),
            percentiles: self
                .percentiles
                .values()
                .into_iter()
                .map(|p| (p.key, round3(p.value)))
                .collect(),
            rates: Rates::new(count as f64, window.duration_secs()),
            histogram: self.histogram.to_series(),
            charts: vec![ChartSeries::from_buckets(
                &self.name,
                ChartStyle::MinMax,
                &self.y_axis_title,
                &self.values.buckets(),
            )],
        }
    }
}
