use pulse_core::SystemInfo;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

const UNKNOWN: &str = "Unknown";

/// Describe the host. Never fails; unknown values are reported as `Unknown`.
pub fn collect_system_info() -> SystemInfo {
    SystemInfo {
        os: non_empty(System::name()).unwrap_or_else(|| std::env::consts::OS.to_string()),
        hostname: non_empty(System::host_name()).unwrap_or_else(|| UNKNOWN.to_string()),
        desktop_environment: non_empty(std::env::var("XDG_CURRENT_DESKTOP").ok())
            .unwrap_or_else(|| "Undefined".to_string()),
        kernel: non_empty(System::kernel_version()).unwrap_or_else(|| UNKNOWN.to_string()),
        cpu: cpu_model(),
        architecture: std::env::consts::ARCH.to_string(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn cpu_model() -> String {
    if let Some(model) = std::fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|info| model_name(&info))
    {
        return model;
    }

    let system = System::new_with_specifics(
        RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing()),
    );
    system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn model_name(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, model)| model.trim().to_string())
        .filter(|model| !model.is_empty())
}
