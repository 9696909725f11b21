use crate::{PulseError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gpu: GpuConfig,
    #[serde(default)]
    pub disk: DiskConfig,
}

impl PulseConfig {
    /// Load a config file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;

        if config.monitor.interval_secs == 0 {
            return Err(PulseError::Config(
                "monitor.interval_secs must be positive".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulse")
            .join("config.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 1 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub enumerate_command: String,
    pub enumerate_args: Vec<String>,
    pub nvidia_smi: String,
    pub query_timeout_ms: u64,
    pub amd_busy_path: PathBuf,
    pub intel_freq_path: PathBuf,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            enumerate_command: "lspci".to_string(),
            enumerate_args: vec!["-vnn".to_string()],
            nvidia_smi: "nvidia-smi".to_string(),
            query_timeout_ms: 2000,
            amd_busy_path: PathBuf::from("/sys/class/drm/renderD128/device/gpu_busy_percent"),
            intel_freq_path: PathBuf::from("/sys/class/drm/renderD128/device/gt_cur_freq_mhz"),
        }
    }
}

/// Disk usage command. The default `df -P -BM` reports sizes in MiB with an `M` suffix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    pub command: String,
    pub args: Vec<String>,
    pub device_prefix: String,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            command: "df".to_string(),
            args: vec!["-P".to_string(), "-BM".to_string()],
            device_prefix: "/dev/".to_string(),
        }
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pulse")
        .join("system_monitoring.db")
}
