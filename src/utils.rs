//! # Utility Functions and Helper Module
//!
//! Small helpers shared by the aggregators, the report writer and the
//! command-line front end.
//!
//! ## Key Functionality Categories
//!
//! - **Report numbers**: Decimal rounding and percentile keys exactly as they
//!   appear in the report
//! - **Rates**: Per-second/minute/hour/day rates over the report window
//! - **Formatting**: Human-readable durations and counts for console output
//! - **Display Helpers**: Table formatting for the run summary
//!
//! ## Usage Examples
//!
//! ```rust
//! use report_aggregator::utils::*;
//!
//! assert_eq!(format_percentile_key(99.9), "p99.9");
//! assert_eq!(round_half_even(2.0625, 3), 2.062);
//! assert_eq!(duration_secs(0, 250), 1);
//! ```

use std::time::Duration;
use uuid::Uuid;

/// Number of decimal places of every fractional report value
pub const DECIMAL_PLACES: usize = 3;

/// Derive the chart file name of a series
///
/// Custom value charts are named by a name-based UUID v5 so that arbitrary
/// sampler names never end up in file names. The same name always yields
/// the same id.
///
/// ## Parameters
/// * `series_name` - Name of the series the chart belongs to
///
/// ## Returns
/// * Hyphenated UUID string, 36 characters long
///
/// ## Examples
///
/// ```rust
/// # use report_aggregator::utils::chart_id;
/// assert_eq!(chart_id("CPU"), chart_id("CPU"));
/// assert_ne!(chart_id("CPU"), chart_id("Heap"));
/// ```
pub fn chart_id(series_name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, series_name.as_bytes()).to_string()
}

/// Format a percentile as a report key
///
/// Integral percentiles lose their fractional part, everything else keeps
/// its shortest decimal representation rounded to three places.
///
/// ## Examples
///
/// ```rust
/// # use report_aggregator::utils::format_percentile_key;
/// assert_eq!(format_percentile_key(50.0), "p50");
/// assert_eq!(format_percentile_key(99.9), "p99.9");
/// assert_eq!(format_percentile_key(99.99), "p99.99");
/// ```
pub fn format_percentile_key(percentile: f64) -> String {
    let rounded = round_half_even(percentile, DECIMAL_PLACES);
    if rounded.fract() == 0.0 {
        format!("p{}", rounded as i64)
    } else {
        format!("p{}", rounded)
    }
}

/// Round to `places` decimal places using banker's rounding
///
/// The value is first turned into its shortest decimal representation, so
/// `2.0625` (exactly representable) rounds to `2.062` and `0.1 + 0.2`
/// rounds to `0.3`. NaN and infinite values are reported as zero.
///
/// ## Examples
///
/// ```rust
/// # use report_aggregator::utils::round_half_even;
/// assert_eq!(round_half_even(1.2345, 3), 1.234);
/// assert_eq!(round_half_even(1.2355, 3), 1.236);
/// assert_eq!(round_half_even(-0.0005, 3), -0.0);
/// assert_eq!(round_half_even(f64::NAN, 3), 0.0);
/// ```
pub fn round_half_even(value: f64, places: usize) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }

    // Display never uses exponent notation for f64
    let text = format!("{}", value.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some(parts) => parts,
        None => return value,
    };
    if frac_part.len() <= places {
        return value;
    }

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part[..places].bytes())
        .map(|b| b - b'0')
        .collect();
    let next = frac_part.as_bytes()[places] - b'0';
    let rest_nonzero = frac_part[places + 1..].bytes().any(|b| b != b'0');
    let last_odd = digits.last().map(|d| d % 2 == 1).unwrap_or(false);

    if next > 5 || (next == 5 && (rest_nonzero || last_odd)) {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let split = digits.len() - places;
    let mut rounded = String::with_capacity(digits.len() + 2);
    rounded.extend(digits[..split].iter().map(|d| char::from(b'0' + d)));
    if places > 0 {
        rounded.push('.');
        rounded.extend(digits[split..].iter().map(|d| char::from(b'0' + d)));
    }

    let magnitude: f64 = rounded.parse().unwrap_or(0.0);
    if value.is_sign_negative() {
        -magnitude
    } else {
        magnitude
    }
}

/// Round a report value to [`DECIMAL_PLACES`]
pub fn round3(value: f64) -> f64 {
    round_half_even(value, DECIMAL_PLACES)
}

/// Length of the report window in whole seconds, never less than one
///
/// All rates divide by this value, so an empty or sub-second window can
/// never produce a division by zero.
pub fn duration_secs(start: i64, end: i64) -> i64 {
    ((end - start) / 1000).max(1)
}

/// `part` as a percentage of `total`, zero when nothing was counted
pub fn percentage(part: u64, total: u64) -> f64 {
    if part == 0 {
        0.0
    } else {
        round3(part as f64 * 100.0 / total.max(1) as f64)
    }
}

/// Count or sum expressed per second, minute, hour and day
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rates {
    pub count_per_second: f64,
    pub count_per_minute: f64,
    pub count_per_hour: f64,
    pub count_per_day: f64,
}

impl Rates {
    /// Rates of `amount` over `duration` seconds
    pub fn new(amount: f64, duration: i64) -> Self {
        let duration = duration.max(1) as f64;
        Self {
            count_per_second: round3(amount / duration),
            count_per_minute: round3(amount * 60.0 / duration),
            count_per_hour: round3(amount * 3_600.0 / duration),
            count_per_day: round3(amount * 86_400.0 / duration),
        }
    }
}

/// Format a duration in a human-readable way
///
/// ## Examples
///
/// ```rust
/// # use report_aggregator::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Format a record rate for the run summary
///
/// ## Examples
///
/// ```rust
/// # use report_aggregator::utils::format_record_rate;
/// assert_eq!(format_record_rate(500.0), "500 rec/s");
/// assert_eq!(format_record_rate(1500.0), "1.50K rec/s");
/// assert_eq!(format_record_rate(1500000.0), "1.50M rec/s");
/// ```
pub fn format_record_rate(records_per_second: f64) -> String {
    if records_per_second < 1_000.0 {
        format!("{:.0} rec/s", records_per_second)
    } else if records_per_second < 1_000_000.0 {
        format!("{:.2}K rec/s", records_per_second / 1_000.0)
    } else {
        format!("{:.2}M rec/s", records_per_second / 1_000_000.0)
    }
}

/// Print a table row with proper formatting
///
/// ```text
/// +----------------+-----------+
/// | Family         | Series    |
/// +----------------+-----------+
/// | Requests       | 12        |
/// +----------------+-----------+
/// ```
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    print!("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        print!(" {:width$} |", column, width = width);
    }
    println!();
}

/// Print a table separator matching [`print_table_row`]
pub fn print_table_separator(widths: &[usize]) {
    print!("+");
    for &width in widths {
        print!("{}", "-".repeat(width + 2));
        print!("+");
    }
    println!();
}
