use crate::error::{AggregationError, Result};
use crate::record::{split_web_vital_name, MetricRecord};
use crate::stats::QuantileEstimator;
use crate::utils::round3;
use serde::Serialize;
use std::collections::BTreeMap;

/// Classification of a vital against its two thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalRating {
    Good,
    NeedsImprovement,
    Poor,
}

impl VitalRating {
    fn classify(value: f64, good: f64, poor: f64) -> Self {
        if value <= good {
            VitalRating::Good
        } else if value > poor {
            VitalRating::Poor
        } else {
            VitalRating::NeedsImprovement
        }
    }
}

/// Known vitals: name, good threshold, poor threshold, whether the raw
/// value is a time in ms that is reported in seconds
const VITALS: [(&str, f64, f64, bool); 6] = [
    ("CLS", 0.1, 0.25, false),
    ("FCP", 1.8, 3.0, true),
    ("FID", 0.1, 0.3, true),
    ("INP", 0.2, 0.5, true),
    ("LCP", 2.5, 4.0, true),
    ("TTFB", 0.8, 1.8, true),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebVitalSnapshot {
    /// Estimated 75th percentile
    pub score: f64,
    pub rating: VitalRating,
    pub good_count: u64,
    pub needs_improvement_count: u64,
    pub poor_count: u64,
}

#[derive(Debug, Clone)]
struct WebVitalStatistic {
    good_threshold: f64,
    poor_threshold: f64,
    p75: QuantileEstimator,
    good: u64,
    needs_improvement: u64,
    poor: u64,
}

impl WebVitalStatistic {
    fn new(good_threshold: f64, poor_threshold: f64) -> Self {
        Self {
            good_threshold,
            poor_threshold,
            p75: QuantileEstimator::new(75.0),
            good: 0,
            needs_improvement: 0,
            poor: 0,
        }
    }

    fn add_value(&mut self, value: f64) {
        match VitalRating::classify(value, self.good_threshold, self.poor_threshold) {
            VitalRating::Good => self.good += 1,
            VitalRating::NeedsImprovement => self.needs_improvement += 1,
            VitalRating::Poor => self.poor += 1,
        }
        self.p75.add_value(value);
    }

    fn snapshot(&self) -> Option<WebVitalSnapshot> {
        let p75 = self.p75.result()?;
        Some(WebVitalSnapshot {
            score: round3(p75),
            rating: VitalRating::classify(p75, self.good_threshold, self.poor_threshold),
            good_count: self.good,
            needs_improvement_count: self.needs_improvement,
            poor_count: self.poor,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebVitalsSnapshot {
    pub name: String,
    /// Vitals with at least one sample, keyed by their short name
    pub vitals: BTreeMap<String, WebVitalSnapshot>,
}

/// All Web Vitals measured for one page
#[derive(Debug, Clone)]
pub struct WebVitalsAggregator {
    name: String,
    vitals: Vec<(&'static str, bool, WebVitalStatistic)>,
    count: u64,
}

impl WebVitalsAggregator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vitals: VITALS
                .iter()
                .map(|&(vital, good, poor, timing)| {
                    (vital, timing, WebVitalStatistic::new(good, poor))
                })
                .collect(),
            count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Records of unknown vitals are rejected and leave the state untouched
    pub fn process_record(&mut self, record: &MetricRecord) -> Result<()> {
        let vital = split_web_vital_name(&record.series_name)
            .map(|(_, vital)| vital)
            .unwrap_or_default();

        let (_, timing, statistic) = self
            .vitals
            .iter_mut()
            .find(|(name, _, _)| *name == vital)
            .ok_or_else(|| {
                AggregationError::malformed(
                    &record.series_name,
                    format!("unknown web vital '{}'", vital),
                )
            })?;

        let value = if *timing {
            record.value / 1000.0
        } else {
            record.value
        };
        statistic.add_value(value);
        self.count += 1;
        Ok(())
    }

    pub fn finalize(&self) -> WebVitalsSnapshot {
        WebVitalsSnapshot {
            name: self.name.clone(),
            vitals: self
                .vitals
                .iter()
                .filter_map(|(name, _, statistic)| {
                    statistic.snapshot().map(|s| (name.to_string(), s))
                })
                .collect(),
        }
    }
}
