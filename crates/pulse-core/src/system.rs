//! System-level types for host identification

use serde::{Deserialize, Serialize};

/// Static description of the host, shown alongside the metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub hostname: String,
    pub desktop_environment: String,
    pub kernel: String,
    pub cpu: String,
    pub architecture: String,
}

impl SystemInfo {
    pub fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("OS", self.os.as_str()),
            ("Hostname", self.hostname.as_str()),
            ("Desktop Environment", self.desktop_environment.as_str()),
            ("Kernel", self.kernel.as_str()),
            ("CPU", self.cpu.as_str()),
            ("Architecture", self.architecture.as_str()),
        ]
    }

    /// `Key: value` lines in display order
    pub fn display(&self) -> String {
        self.entries()
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_order() {
        let info = SystemInfo {
            os: "Linux".to_string(),
            hostname: "box".to_string(),
            desktop_environment: "GNOME".to_string(),
            kernel: "6.8.0".to_string(),
            cpu: "AMD Ryzen 7".to_string(),
            architecture: "x86_64".to_string(),
        };

        assert_eq!(
            info.display(),
            "OS: Linux\nHostname: box\nDesktop Environment: GNOME\nKernel: 6.8.0\nCPU: AMD Ryzen 7\nArchitecture: x86_64"
        );
    }
}
