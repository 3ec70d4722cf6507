//! # Report Aggregator - Main Entry Point
//!
//! Reads JSON-lines metric records, aggregates them per series and writes
//! the finalized report as JSON.
//!
//! ## Flow
//!
//! 1. **Initialize logging**: colored tracing output, `RUST_LOG` aware
//! 2. **Build the config**: optional JSON file, then command-line overrides
//! 3. **Read**: a reader thread parses lines and sends records over a
//!    bounded channel, so parsing overlaps with aggregation
//! 4. **Aggregate**: the main thread feeds every record into the pipeline
//! 5. **Finalize and write**: snapshot all series, write the report and
//!    print a summary table
//!
//! Unparseable lines and malformed records are counted and skipped; only
//! configuration and IO failures abort the run.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::{bounded, Receiver, Sender};
use report_aggregator::{
    cli::Args,
    logging::init_logging,
    results::{summarize, ReportWriter},
    utils::{format_duration, format_record_rate, print_table_row, print_table_separator},
    MetricRecord, ReportPipeline,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Records in flight between the reader thread and the pipeline
const CHANNEL_CAPACITY: usize = 8192;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("Starting Report Aggregator v{}", report_aggregator::VERSION);
    debug!("Arguments: {:?}", args);

    let config = args
        .aggregation_config()
        .context("Invalid aggregation configuration")?;
    let pipeline = ReportPipeline::new(config.clone())?;
    let writer = ReportWriter::new(&args.output_file)?;

    let input: Box<dyn BufRead + Send> = match args.input_path() {
        Some(path) => {
            info!("Reading records from {:?}", path);
            let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
            Box::new(BufReader::new(file))
        }
        None => {
            info!("Reading records from stdin");
            Box::new(BufReader::new(std::io::stdin()))
        }
    };

    let started = Instant::now();
    let (sender, receiver) = bounded(CHANNEL_CAPACITY);
    let reader = thread::spawn(move || read_records(input, sender));

    aggregate(&pipeline, receiver)?;

    let unparsed = match reader.join() {
        Ok(outcome) => outcome?,
        Err(_) => anyhow::bail!("Record reader thread panicked"),
    };
    if unparsed > 0 {
        warn!("Skipped {} unparseable lines", unparsed);
    }

    let report = pipeline.finalize();
    let elapsed = started.elapsed();
    let metadata = writer.write(&report, &config, elapsed)?;

    print_summary(&report, elapsed);
    info!(
        "Processed {} records into {} series in {}",
        metadata.records,
        metadata.series,
        format_duration(elapsed)
    );
    Ok(())
}

/// Parse every line and hand the records over; returns the number of lines
/// that were not valid records.
fn read_records(input: Box<dyn BufRead + Send>, sender: Sender<MetricRecord>) -> Result<u64> {
    let mut unparsed = 0;

    for (number, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", number + 1))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<MetricRecord>(line) {
            Ok(record) => {
                if sender.send(record).is_err() {
                    // pipeline side stopped early; its error is reported there
                    break;
                }
            }
            Err(e) => {
                unparsed += 1;
                debug!("Line {}: {}", number + 1, e);
            }
        }
    }
    Ok(unparsed)
}

/// Drains the channel until the reader hangs up
fn aggregate(pipeline: &ReportPipeline, receiver: Receiver<MetricRecord>) -> Result<()> {
    for record in receiver {
        pipeline
            .ingest(&record)
            .context("Aggregation aborted")?;
    }
    Ok(())
}

fn print_summary(report: &report_aggregator::ReportSnapshot, elapsed: std::time::Duration) {
    let widths = [14, 40, 10, 8, 12, 12];

    println!();
    print_table_separator(&widths);
    print_table_row(
        &["Family", "Series", "Count", "Errors", "Mean [ms]", "Max [ms]"],
        &widths,
    );
    print_table_separator(&widths);
    for row in summarize(report) {
        print_table_row(
            &[
                row.family.name(),
                &row.name,
                &row.count.to_string(),
                &row.errors.to_string(),
                &format!("{:.1}", row.mean),
                &format!("{:.0}", row.max),
            ],
            &widths,
        );
    }
    print_table_separator(&widths);

    let rate = report.records as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    println!(
        "{} records, {} dropped, {} ({})",
        report.records,
        report.dropped.total(),
        format_duration(elapsed),
        format_record_rate(rate)
    );
}
