use anyhow::Result;
use clap::ValueEnum;
use pulse_core::metrics::DATE_FORMAT;
use pulse_core::{MetricsSnapshot, StoredRecord};
use std::fmt::Write;

const CSV_HEADER: &str = "id,time_lapse,captured_on,monitoring_time,cpu_percent,gpu_load,ram_free_mb,ram_total_mb,disk_free_gb,disk_total_gb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

pub fn render_records(records: &[StoredRecord], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Csv => Ok(render_csv(records)),
        OutputFormat::Table => Ok(render_table(records)),
    }
}

fn render_csv(records: &[StoredRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for record in records {
        let s = &record.snapshot;
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{}",
            record.id,
            s.time_lapse,
            s.captured_on.format(DATE_FORMAT),
            s.monitoring_time,
            s.cpu_percent,
            s.gpu_load,
            s.ram_free_mb,
            s.ram_total_mb,
            s.disk_free_gb,
            s.disk_total_gb,
        );
    }
    out
}

fn render_table(records: &[StoredRecord]) -> String {
    if records.is_empty() {
        return "  No metrics recorded yet.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:-<96}", "");
    let _ = writeln!(
        out,
        "  {:>5} {:<10} {:>5} {}",
        "ID",
        "Date",
        "Every",
        table_header()
    );
    let _ = writeln!(out, "{:-<96}", "");
    for record in records {
        let s = &record.snapshot;
        let _ = writeln!(
            out,
            "  {:>5} {:<10} {:>4}s {}",
            record.id,
            s.captured_on.format(DATE_FORMAT),
            s.time_lapse,
            snapshot_columns(s)
        );
    }
    let _ = writeln!(out, "{:-<96}", "");
    let _ = writeln!(out, "  {} record(s)", records.len());
    out
}

pub fn table_header() -> String {
    format!(
        "{:>7} {:>6} {:>6} {:>10} {:>10} {:>9} {:>9}",
        "Elapsed", "CPU%", "GPU%", "RAM free", "RAM total", "Disk free", "Disk size"
    )
}

/// One fixed-width line for a live snapshot, aligned with [`table_header`]
pub fn snapshot_columns(s: &MetricsSnapshot) -> String {
    format!(
        "{:>7} {:>6.1} {:>6.1} {:>8.0}MB {:>8.0}MB {:>7.1}GB {:>7.1}GB",
        s.monitoring_time,
        s.cpu_percent,
        s.gpu_load,
        s.ram_free_mb,
        s.ram_total_mb,
        s.disk_free_gb,
        s.disk_total_gb
    )
}
