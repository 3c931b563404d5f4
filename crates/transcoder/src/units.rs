//! Byte count formatting.
//!
//! All units are decimal: 1 KB = 1000 bytes.

use std::fmt;
use thiserror::Error;

/// Error type for size conversions.
#[derive(Debug, Error, PartialEq)]
pub enum SizeError {
    /// Byte counts cannot be negative
    #[error("Negative byte count: {0}")]
    Negative(f64),

    /// NaN or infinite input
    #[error("Byte count is not a finite number: {0}")]
    NotFinite(f64),
}

/// Display unit for byte counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
}

impl SizeUnit {
    pub fn divisor(&self) -> f64 {
        match self {
            SizeUnit::Bytes => 1.0,
            SizeUnit::Kilobytes => 1_000.0,
            SizeUnit::Megabytes => 1_000_000.0,
            SizeUnit::Gigabytes => 1_000_000_000.0,
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeUnit::Bytes => write!(f, "B"),
            SizeUnit::Kilobytes => write!(f, "KB"),
            SizeUnit::Megabytes => write!(f, "MB"),
            SizeUnit::Gigabytes => write!(f, "GB"),
        }
    }
}

/// Converts a byte count into `unit`.
///
/// Callers are expected to hand in sizes they read from the filesystem, so
/// an error here means a bookkeeping bug upstream.
pub fn convert_unit(bytes: f64, unit: SizeUnit) -> Result<f64, SizeError> {
    if !bytes.is_finite() {
        return Err(SizeError::NotFinite(bytes));
    }
    if bytes < 0.0 {
        return Err(SizeError::Negative(bytes));
    }
    Ok(bytes / unit.divisor())
}

/// Two decimals at most, trailing zeros dropped.
fn format_amount(value: f64) -> String {
    let text = format!("{:.2}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Renders `bytes` in the largest unit whose value is at least 1.
///
/// `auto_convert_unit(1500)` is `"1.5 KB"`, `auto_convert_unit(0)` is `"0 B"`.
pub fn auto_convert_unit(bytes: u64) -> String {
    for unit in [SizeUnit::Gigabytes, SizeUnit::Megabytes, SizeUnit::Kilobytes] {
        if let Ok(value) = convert_unit(bytes as f64, unit) {
            if value >= 1.0 {
                return format!("{} {}", format_amount(value), unit);
            }
        }
    }
    format!("{} {}", bytes, SizeUnit::Bytes)
}

/// Human-readable savings between an original and a new size.
///
/// Growth is reported as `"loose 0 B"` rather than a negative amount.
pub fn size_delta_text(original_bytes: u64, new_bytes: u64) -> String {
    match original_bytes.checked_sub(new_bytes) {
        Some(saved) => format!("saved {}", auto_convert_unit(saved)),
        None => format!("loose {}", auto_convert_unit(0)),
    }
}
