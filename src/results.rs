use crate::config::AggregationConfig;
use crate::pipeline::{DroppedRecords, Family, ReportSnapshot};
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// System information for reproducibility
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub rust_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
        }
    }
}

/// Run metadata written next to the report
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub records: u64,
    pub dropped: DroppedRecords,
    pub series: usize,
    pub processing_time: Duration,
    pub system_info: SystemInfo,
}

impl ReportMetadata {
    pub fn new(report: &ReportSnapshot, processing_time: Duration) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            records: report.records,
            dropped: report.dropped,
            series: report.series_count(),
            processing_time,
            system_info: SystemInfo::default(),
        }
    }
}

/// The complete file contents
#[derive(Debug, Serialize)]
pub struct FinalReport<'a> {
    pub metadata: ReportMetadata,
    pub config: &'a AggregationConfig,
    pub report: &'a ReportSnapshot,
}

/// One line of the console summary
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub family: Family,
    pub name: String,
    pub count: u64,
    pub errors: u64,
    pub mean: f64,
    pub max: f64,
}

/// Summary lines of every timer-based series, families in report order
pub fn summarize(report: &ReportSnapshot) -> Vec<SeriesSummary> {
    Family::ALL
        .iter()
        .flat_map(|&family| {
            report.family(family).iter().filter_map(move |series| {
                let timer = series.timer()?;
                Some(SeriesSummary {
                    family,
                    name: timer.name.clone(),
                    count: timer.count,
                    errors: timer.errors,
                    mean: timer.mean,
                    max: timer.max,
                })
            })
        })
        .collect()
}

/// Writes finalized reports to a JSON file
pub struct ReportWriter {
    output_file: PathBuf,
}

impl ReportWriter {
    pub fn new(output_file: &Path) -> Result<Self> {
        if let Some(parent) = output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {:?}", parent))?;
        }
        Ok(Self {
            output_file: output_file.to_path_buf(),
        })
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Serialize the report with its metadata and the effective config
    pub fn write(
        &self,
        report: &ReportSnapshot,
        config: &AggregationConfig,
        processing_time: Duration,
    ) -> Result<ReportMetadata> {
        let final_report = FinalReport {
            metadata: ReportMetadata::new(report, processing_time),
            config,
            report,
        };

        let json = serde_json::to_string_pretty(&final_report)
            .context("Failed to serialize report")?;
        debug!("Serialized report: {} bytes", json.len());

        let mut file = std::fs::File::create(&self.output_file)
            .with_context(|| format!("Failed to create {:?}", self.output_file))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to write {:?}", self.output_file))?;

        info!("Report written to: {:?}", self.output_file);
        Ok(final_report.metadata)
    }
}
