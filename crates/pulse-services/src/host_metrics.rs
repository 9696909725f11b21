use pulse_core::DiskConfig;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::{error, warn};

use crate::disk_usage::{self, DiskUsageError};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// CPU, RAM and disk figures from OS counters and the disk usage command
pub struct HostMetricsReader {
    system: System,
    disk: DiskConfig,
}

impl HostMetricsReader {
    pub fn new(disk: DiskConfig) -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        // CPU usage is a delta, so the first sample needs a baseline
        system.refresh_cpu_usage();

        Self { system, disk }
    }

    /// Global CPU utilization since the previous call
    pub fn cpu_percent(&mut self) -> Option<f64> {
        self.system.refresh_cpu_usage();
        if self.system.cpus().is_empty() {
            error!("No CPUs reported by the OS");
            return None;
        }

        let usage = f64::from(self.system.global_cpu_usage());
        usage.is_finite().then_some(round_to(usage, 1))
    }

    /// Available and total RAM in MB, (0.0, 0.0) if the counters are unusable
    pub fn read_ram(&mut self) -> (f64, f64) {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            error!("OS reported zero total memory");
            return (0.0, 0.0);
        }

        let available = self.system.available_memory();
        (
            round_to(available as f64 / BYTES_PER_MB, 2),
            round_to(total as f64 / BYTES_PER_MB, 2),
        )
    }

    /// Free and total disk in GB for the primary device, (0.0, 0.0) on any failure
    pub fn read_disk(&self) -> (f64, f64) {
        match disk_usage::read_disk_usage(&self.disk) {
            Ok(usage) => (usage.free_gb, usage.total_gb),
            Err(e) => {
                log_disk_failure(&e);
                (0.0, 0.0)
            }
        }
    }
}

fn log_disk_failure(e: &DiskUsageError) {
    match e {
        DiskUsageError::CommandFailed(cause) => {
            warn!("Disk usage command failed: {}", cause)
        }
        DiskUsageError::TooFewLines(count) => {
            warn!(lines = count, "No disk usage information available")
        }
        DiskUsageError::NoDeviceLine(prefix) => {
            warn!(prefix = %prefix, "No primary device line in disk usage output")
        }
        DiskUsageError::TooFewFields(line) => {
            warn!(line = %line, "Malformed disk usage line")
        }
        DiskUsageError::NotNumeric(field) => {
            warn!(field = %field, "Could not convert disk size to a number")
        }
    }
}
