use pulse_core::{GpuConfig, GpuIdentity, GpuVendor};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::command;

/// Device class marker of the primary display controller in `lspci` output
const DISPLAY_CLASS_MARKER: &str = "VGA";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("No GPU found in device listing")]
    NoGpuFound,
    #[error("Unknown GPU vendor in line: {0}")]
    UnknownVendor(String),
    #[error("Device enumeration failed: {0}")]
    ProbeFailed(String),
}

fn model_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\[(](.*?)[\])]").expect("invalid GPU model regex"))
}

/// Probe the installed GPU once via the device enumeration command
#[instrument(skip(config), fields(command = %config.enumerate_command))]
pub fn detect(config: &GpuConfig) -> Result<GpuIdentity, DetectionError> {
    let listing = command::run(&config.enumerate_command, &config.enumerate_args).map_err(|e| {
        error!("Device enumeration failed: {}", e);
        DetectionError::ProbeFailed(e.to_string())
    })?;

    match parse_device_listing(&listing) {
        Ok(identity) => {
            info!(
                vendor = %identity.vendor,
                model = identity.model.as_deref().unwrap_or("unknown"),
                "GPU detected"
            );
            Ok(identity)
        }
        Err(e) => {
            error!("GPU detection failed: {}", e);
            Err(e)
        }
    }
}

/// Find the display controller line naming a supported vendor
pub fn parse_device_listing(listing: &str) -> Result<GpuIdentity, DetectionError> {
    let display_lines: Vec<&str> = listing
        .lines()
        .filter(|line| line.contains(DISPLAY_CLASS_MARKER))
        .collect();

    let Some(first) = display_lines.first() else {
        return Err(DetectionError::NoGpuFound);
    };

    let matched = display_lines
        .iter()
        .find_map(|line| vendor_of(line).map(|vendor| (*line, vendor)));

    let Some((line, vendor)) = matched else {
        return Err(DetectionError::UnknownVendor(first.trim().to_string()));
    };

    let model = model_pattern()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    Ok(GpuIdentity { vendor, model })
}

fn vendor_of(line: &str) -> Option<GpuVendor> {
    GpuVendor::ALL
        .into_iter()
        .find(|vendor| line.contains(vendor.marker()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NVIDIA_LISTING: &str = "\
00:00.0 Host bridge: Intel Corporation Device 9b61 (rev 0c)
01:00.0 VGA compatible controller: NVIDIA Corporation TU106 (GeForce RTX 2060)
01:00.1 Audio device: NVIDIA Corporation TU106 High Definition Audio Controller (rev a1)";

    #[test]
    fn test_parse_nvidia() {
        let identity = parse_device_listing(NVIDIA_LISTING).unwrap();
        assert_eq!(identity.vendor, GpuVendor::Nvidia);
        assert_eq!(identity.model.as_deref(), Some("GeForce RTX 2060"));
    }

    #[test]
    fn test_parse_amd_takes_first_bracket() {
        let listing = "03:00.0 VGA compatible controller [0300]: Advanced Micro Devices, Inc. [AMD/ATI] Navi 21 [1002:73bf]";
        let identity = parse_device_listing(listing).unwrap();
        assert_eq!(identity.vendor, GpuVendor::Amd);
        assert_eq!(identity.model.as_deref(), Some("0300"));
    }

    #[test]
    fn test_parse_intel_without_model() {
        let listing = "00:02.0 VGA compatible controller: Intel Corporation UHD Graphics 620";
        let identity = parse_device_listing(listing).unwrap();
        assert_eq!(identity.vendor, GpuVendor::Intel);
        assert_eq!(identity.model, None);
    }

    #[test]
    fn test_parse_skips_unknown_vendor_when_supported_one_follows() {
        let listing = "\
00:01.0 VGA compatible controller: Matrox Electronics Systems Ltd. G200eR2
00:02.0 VGA compatible controller: Intel Corporation HD Graphics 530 (rev 06)";
        let identity = parse_device_listing(listing).unwrap();
        assert_eq!(identity.vendor, GpuVendor::Intel);
        assert_eq!(identity.model.as_deref(), Some("rev 06"));
    }

    #[test]
    fn test_parse_no_gpu() {
        let listing = "00:1f.3 Audio device: Intel Corporation Cannon Lake PCH cAVS (rev 10)";
        assert_eq!(parse_device_listing(listing), Err(DetectionError::NoGpuFound));
        assert_eq!(parse_device_listing(""), Err(DetectionError::NoGpuFound));
    }

    #[test]
    fn test_parse_unknown_vendor() {
        let listing = "00:01.0 VGA compatible controller: Matrox Electronics Systems Ltd. G200eR2";
        match parse_device_listing(listing) {
            Err(DetectionError::UnknownVendor(line)) => assert!(line.contains("Matrox")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_detect_reports_probe_failure() {
        let config = GpuConfig {
            enumerate_command: "pulse-definitely-missing-lspci".to_string(),
            ..GpuConfig::default()
        };
        assert!(matches!(detect(&config), Err(DetectionError::ProbeFailed(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_detect_reports_non_zero_exit() {
        let config = GpuConfig {
            enumerate_command: "sh".to_string(),
            enumerate_args: vec!["-c".to_string(), "exit 1".to_string()],
            ..GpuConfig::default()
        };
        assert!(matches!(detect(&config), Err(DetectionError::ProbeFailed(_))));
    }
}
