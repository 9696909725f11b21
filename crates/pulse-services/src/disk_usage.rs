//! Disk capacity from an external `df`-style command.
//!
//! Expected layout: a header line, then one line per filesystem with the
//! columns `device size used available use% mount`. The default command is
//! `df -P -BM`, which prints sizes in MiB with an `M` suffix and keeps every
//! filesystem on a single line.

use pulse_core::DiskConfig;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::command::{self, CommandError};
use crate::host_metrics::round_to;

const MIN_LINES: usize = 2;
const MIN_FIELDS: usize = 4;
const SIZE_COLUMN: usize = 1;
const AVAILABLE_COLUMN: usize = 3;

#[derive(Error, Debug)]
pub enum DiskUsageError {
    #[error("Disk usage command failed: {0}")]
    CommandFailed(#[from] CommandError),
    #[error("Disk usage output has {0} line(s), expected a header and a device line")]
    TooFewLines(usize),
    #[error("No device line starting with {0:?}")]
    NoDeviceLine(String),
    #[error("Device line has too few fields: {0:?}")]
    TooFewFields(String),
    #[error("Size field is not numeric: {0:?}")]
    NotNumeric(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    pub free_gb: f64,
    pub total_gb: f64,
}

fn ansi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[mG]").expect("invalid ANSI escape regex"))
}

/// Run the configured disk usage command and parse the primary device
pub fn read_disk_usage(config: &DiskConfig) -> Result<DiskUsage, DiskUsageError> {
    let output = command::run(&config.command, &config.args)?;
    parse_disk_usage(&output, &config.device_prefix)
}

pub fn parse_disk_usage(output: &str, device_prefix: &str) -> Result<DiskUsage, DiskUsageError> {
    let clean = ansi_pattern().replace_all(output, "");
    let lines: Vec<&str> = clean.lines().filter(|l| !l.trim().is_empty()).collect();

    if lines.len() < MIN_LINES {
        return Err(DiskUsageError::TooFewLines(lines.len()));
    }

    let line = lines
        .iter()
        .find(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|device| device.starts_with(device_prefix))
        })
        .ok_or_else(|| DiskUsageError::NoDeviceLine(device_prefix.to_string()))?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_FIELDS {
        return Err(DiskUsageError::TooFewFields(line.to_string()));
    }

    let total_gb = parse_size_gb(fields[SIZE_COLUMN])?;
    let free_gb = parse_size_gb(fields[AVAILABLE_COLUMN])?;

    Ok(DiskUsage {
        free_gb: round_to(free_gb, 1),
        total_gb: round_to(total_gb, 1),
    })
}

/// Convert a size field with an optional `K`/`M`/`G`/`T` suffix to GiB.
/// A bare number is in the command's block unit, MiB.
fn parse_size_gb(field: &str) -> Result<f64, DiskUsageError> {
    let not_numeric = || DiskUsageError::NotNumeric(field.to_string());

    let (digits, unit) = match field.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&field[..idx], c.to_ascii_uppercase()),
        _ => (field, 'M'),
    };

    let value: f64 = digits.parse().map_err(|_| not_numeric())?;
    if !value.is_finite() {
        return Err(not_numeric());
    }

    let scale = match unit {
        'K' => 1.0 / (1024.0 * 1024.0),
        'M' => 1.0 / 1024.0,
        'G' => 1.0,
        'T' => 1024.0,
        _ => return Err(not_numeric()),
    };

    Ok(value * scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DF_OUTPUT: &str = "\
Filesystem     1048576-blocks   Used Available Capacity Mounted on
tmpfs                   1591M     3M     1588M       1% /run
/dev/nvme0n1p2        475914M 210233M   241451M      47% /
/dev/nvme0n1p1           511M     7M      505M       2% /boot/efi";

    #[test]
    fn test_parse_first_device_line() {
        let usage = parse_disk_usage(DF_OUTPUT, "/dev/").unwrap();
        assert_eq!(usage.total_gb, 464.8);
        assert_eq!(usage.free_gb, 235.8);
    }

    #[test]
    fn test_parse_strips_ansi_and_gig_suffix() {
        let output = "\x1b[1mFilesystem  Size  Used  Avail  Use%  Mounted on\x1b[0m\n\
                      \x1b[32m/dev/sda1\x1b[0m  100G  50G  50G  50%  /";
        let usage = parse_disk_usage(output, "/dev/").unwrap();
        assert_eq!(usage.total_gb, 100.0);
        assert_eq!(usage.free_gb, 50.0);
    }

    #[test]
    fn test_bare_numbers_are_mib() {
        let output = "Filesystem 1M-blocks Used Available\n/dev/sda1 2048 1024 1024";
        let usage = parse_disk_usage(output, "/dev/").unwrap();
        assert_eq!(usage.total_gb, 2.0);
        assert_eq!(usage.free_gb, 1.0);
    }

    #[test]
    fn test_too_few_lines() {
        let err = parse_disk_usage("Filesystem Size Used Avail", "/dev/").unwrap_err();
        assert!(matches!(err, DiskUsageError::TooFewLines(1)));
    }

    #[test]
    fn test_missing_device_line() {
        let output = "Filesystem Size Used Avail\ntmpfs 10M 1M 9M 10% /run";
        let err = parse_disk_usage(output, "/dev/").unwrap_err();
        assert!(matches!(err, DiskUsageError::NoDeviceLine(_)));
    }

    #[test]
    fn test_too_few_fields() {
        let output = "Filesystem Size Used Avail\n/dev/sda1 100G 50G";
        let err = parse_disk_usage(output, "/dev/").unwrap_err();
        assert!(matches!(err, DiskUsageError::TooFewFields(_)));
    }

    #[test]
    fn test_non_numeric_fields() {
        let output = "Filesystem Size Used Avail\n/dev/sda1 lots 50G 50G 50% /";
        let err = parse_disk_usage(output, "/dev/").unwrap_err();
        assert!(matches!(err, DiskUsageError::NotNumeric(_)));

        let output = "Filesystem Size Used Avail\n/dev/sda1 100X 50G 50G 50% /";
        let err = parse_disk_usage(output, "/dev/").unwrap_err();
        assert!(matches!(err, DiskUsageError::NotNumeric(_)));
    }

    #[test]
    fn test_command_failure() {
        let config = DiskConfig {
            command: "pulse-definitely-missing-df".to_string(),
            ..DiskConfig::default()
        };
        let err = read_disk_usage(&config).unwrap_err();
        assert!(matches!(err, DiskUsageError::CommandFailed(_)));
    }
}
