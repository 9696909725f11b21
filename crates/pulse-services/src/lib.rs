mod command;
mod disk_usage;
mod gpu_detector;
mod gpu_load;
mod host_metrics;
mod monitor;
mod store;
mod system_info;

pub use command::CommandError;
pub use disk_usage::{parse_disk_usage, read_disk_usage, DiskUsage, DiskUsageError};
pub use gpu_detector::{detect as detect_gpu, parse_device_listing, DetectionError};
pub use gpu_load::{
    source_for, AmdBusyPercentSource, GpuLoadError, GpuLoadReader, GpuLoadSource,
    IntelFrequencySource, NvidiaSmiSource,
};
pub use host_metrics::HostMetricsReader;
pub use monitor::{
    MetricsProbe, MonitorError, MonitorEvent, MonitorHandle, MonitorLoop, ProbeError, RawSample,
    SessionState, SystemProbe,
};
pub use store::{MetricsStore, StoreError};
pub use system_info::collect_system_info;

// Re-export core types so front ends only import from services
pub use pulse_core::{
    format_elapsed, GpuIdentity, GpuVendor, MetricsSnapshot, PulseConfig, StoredRecord,
    SystemInfo,
};
