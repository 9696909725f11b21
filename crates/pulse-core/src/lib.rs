// Domain modules
pub mod config;
pub mod error;
pub mod gpu;
pub mod metrics;
pub mod system;

pub use config::{DiskConfig, GpuConfig, MonitorConfig, PulseConfig, StorageConfig};
pub use error::{PulseError, Result};
pub use gpu::{GpuIdentity, GpuVendor};
pub use metrics::{format_elapsed, MetricsSnapshot, StoredRecord, ValidationError};
pub use system::SystemInfo;
