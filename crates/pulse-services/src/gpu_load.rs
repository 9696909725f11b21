use pulse_core::{GpuConfig, GpuIdentity, GpuVendor};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{self, CommandError};
use crate::gpu_detector;

#[derive(Error, Debug)]
pub enum GpuLoadError {
    #[error("GPU query failed: {0}")]
    Query(#[from] CommandError),
    #[error("GPU attribute {0:?} not found")]
    MissingFile(PathBuf),
    #[error("Failed to read GPU attribute {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Non-numeric GPU reading: {0:?}")]
    NotNumeric(String),
}

/// A point-in-time GPU utilization query, in percent
pub trait GpuLoadSource: Send + Sync {
    fn read(&self) -> Result<f64, GpuLoadError>;
}

/// NVIDIA utilization via `nvidia-smi`
pub struct NvidiaSmiSource {
    program: String,
    timeout: Duration,
}

impl NvidiaSmiSource {
    const ARGS: [&'static str; 2] = [
        "--query-gpu=utilization.gpu",
        "--format=csv,noheader,nounits",
    ];

    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl GpuLoadSource for NvidiaSmiSource {
    fn read(&self) -> Result<f64, GpuLoadError> {
        let args: Vec<String> = Self::ARGS.iter().map(|a| a.to_string()).collect();
        let output = command::run_with_timeout(&self.program, &args, self.timeout)?;
        // One line per GPU; the first is the primary adapter
        let line = output.lines().next().unwrap_or_default();
        parse_number(line)
    }
}

/// AMD busy percentage exposed by the amdgpu driver
pub struct AmdBusyPercentSource {
    path: PathBuf,
}

impl AmdBusyPercentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GpuLoadSource for AmdBusyPercentSource {
    fn read(&self) -> Result<f64, GpuLoadError> {
        read_attribute(&self.path)
    }
}

/// Intel current GT frequency in MHz, scaled down as a rough load figure
pub struct IntelFrequencySource {
    path: PathBuf,
}

impl IntelFrequencySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GpuLoadSource for IntelFrequencySource {
    fn read(&self) -> Result<f64, GpuLoadError> {
        Ok(read_attribute(&self.path)? / 100.0)
    }
}

fn read_attribute(path: &Path) -> Result<f64, GpuLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => GpuLoadError::MissingFile(path.to_path_buf()),
        _ => GpuLoadError::Read {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    parse_number(&raw)
}

fn parse_number(raw: &str) -> Result<f64, GpuLoadError> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(GpuLoadError::NotNumeric(trimmed.to_string())),
    }
}

/// Build the load source for a detected vendor
pub fn source_for(vendor: GpuVendor, config: &GpuConfig) -> Box<dyn GpuLoadSource> {
    match vendor {
        GpuVendor::Nvidia => Box::new(NvidiaSmiSource::new(
            config.nvidia_smi.clone(),
            Duration::from_millis(config.query_timeout_ms),
        )),
        GpuVendor::Amd => Box::new(AmdBusyPercentSource::new(config.amd_busy_path.clone())),
        GpuVendor::Intel => Box::new(IntelFrequencySource::new(config.intel_freq_path.clone())),
    }
}

/// Best-effort GPU load reader bound to the identity detected at startup
pub struct GpuLoadReader {
    identity: Option<GpuIdentity>,
    source: Option<Box<dyn GpuLoadSource>>,
}

impl GpuLoadReader {
    pub fn new(identity: Option<GpuIdentity>, config: &GpuConfig) -> Self {
        let source = identity
            .as_ref()
            .map(|identity| source_for(identity.vendor, config));
        Self { identity, source }
    }

    /// Detect the GPU once. A failed detection disables GPU telemetry for the
    /// lifetime of this reader.
    pub fn detect(config: &GpuConfig) -> Self {
        match gpu_detector::detect(config) {
            Ok(identity) => Self::new(Some(identity), config),
            Err(e) => {
                info!("GPU telemetry disabled: {}", e);
                Self::new(None, config)
            }
        }
    }

    /// Use an explicit load source, bypassing vendor dispatch
    pub fn with_source(identity: GpuIdentity, source: Box<dyn GpuLoadSource>) -> Self {
        Self {
            identity: Some(identity),
            source: Some(source),
        }
    }

    pub fn identity(&self) -> Option<&GpuIdentity> {
        self.identity.as_ref()
    }

    /// Current load in percent, 0.0 when unavailable
    pub fn read_load(&self) -> f64 {
        let (Some(identity), Some(source)) = (&self.identity, &self.source) else {
            debug!("No GPU identity, reporting zero load");
            return 0.0;
        };

        match source.read() {
            Ok(load) => load,
            Err(e) => {
                warn!(vendor = %identity.vendor, "GPU load unavailable: {}", e);
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn attribute_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn identity(vendor: GpuVendor) -> GpuIdentity {
        GpuIdentity {
            vendor,
            model: None,
        }
    }

    #[test]
    fn test_amd_reads_percent() {
        let file = attribute_file("37\n");
        let config = GpuConfig {
            amd_busy_path: file.path().to_path_buf(),
            ..GpuConfig::default()
        };
        let reader = GpuLoadReader::new(Some(identity(GpuVendor::Amd)), &config);
        assert_eq!(reader.read_load(), 37.0);
    }

    #[test]
    fn test_intel_scales_frequency() {
        let file = attribute_file("1150");
        let config = GpuConfig {
            intel_freq_path: file.path().to_path_buf(),
            ..GpuConfig::default()
        };
        let reader = GpuLoadReader::new(Some(identity(GpuVendor::Intel)), &config);
        assert_eq!(reader.read_load(), 11.5);
    }

    #[test]
    fn test_missing_file_yields_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = GpuConfig {
            amd_busy_path: dir.path().join("gpu_busy_percent"),
            ..GpuConfig::default()
        };
        let source = AmdBusyPercentSource::new(config.amd_busy_path.clone());
        assert!(matches!(source.read(), Err(GpuLoadError::MissingFile(_))));

        let reader = GpuLoadReader::new(Some(identity(GpuVendor::Amd)), &config);
        assert_eq!(reader.read_load(), 0.0);
    }

    #[test]
    fn test_non_numeric_yields_zero() {
        let file = attribute_file("busy");
        let source = IntelFrequencySource::new(file.path());
        assert!(matches!(source.read(), Err(GpuLoadError::NotNumeric(_))));

        let reader = GpuLoadReader::with_source(identity(GpuVendor::Intel), Box::new(source));
        assert_eq!(reader.read_load(), 0.0);
    }

    #[test]
    fn test_missing_nvidia_tool_yields_zero() {
        let config = GpuConfig {
            nvidia_smi: "pulse-definitely-missing-nvidia-smi".to_string(),
            ..GpuConfig::default()
        };
        let reader = GpuLoadReader::new(Some(identity(GpuVendor::Nvidia)), &config);
        assert_eq!(reader.read_load(), 0.0);
    }

    #[test]
    fn test_no_identity_skips_query() {
        struct Panicking;
        impl GpuLoadSource for Panicking {
            fn read(&self) -> Result<f64, GpuLoadError> {
                panic!("source must not be queried without an identity");
            }
        }

        let reader = GpuLoadReader {
            identity: None,
            source: Some(Box::new(Panicking)),
        };
        assert_eq!(reader.read_load(), 0.0);
        assert!(reader.identity().is_none());
    }

    #[test]
    fn test_parse_number_rejects_empty_and_nan() {
        assert!(parse_number("").is_err());
        assert!(parse_number("NaN").is_err());
        assert_eq!(parse_number(" 12.5 \n").unwrap(), 12.5);
    }
}
