//! Host description handed to the model with every interpretation prompt.

use std::path::PathBuf;

const OS_RELEASE: &str = "/etc/os-release";
const KERNEL_RELEASE: &str = "/proc/sys/kernel/osrelease";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub distro: Option<String>,
    pub distro_version: Option<String>,
    pub kernel: Option<String>,
    pub home_dir: Option<PathBuf>,
    pub shell: Option<String>,
}

impl SystemInfo {
    /// Reads what the host exposes. Missing sources leave the field empty.
    pub fn detect() -> Self {
        let (distro, distro_version) = std::fs::read_to_string(OS_RELEASE)
            .map(|text| parse_os_release(&text))
            .unwrap_or_default();
        let kernel = std::fs::read_to_string(KERNEL_RELEASE)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let info = Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            distro,
            distro_version,
            kernel,
            home_dir: dirs::home_dir(),
            shell: std::env::var("SHELL").ok().filter(|s| !s.is_empty()),
        };
        tracing::debug!("Detected host: {:?}", info);
        info
    }

    /// `## Host` block for the prompt.
    pub fn render(&self) -> String {
        let mut os = self.os.clone();
        if let Some(distro) = &self.distro {
            match &self.distro_version {
                Some(version) => os.push_str(&format!(" ({distro} {version})")),
                None => os.push_str(&format!(" ({distro})")),
            }
        }

        let mut lines = vec!["## Host".to_string(), format!("Operating system: {os}")];
        if let Some(kernel) = &self.kernel {
            lines.push(format!("Kernel: {kernel}"));
        }
        lines.push(format!("Architecture: {}", self.arch));
        if let Some(home) = &self.home_dir {
            lines.push(format!("Home directory: {}", home.display()));
        }
        if let Some(shell) = &self.shell {
            lines.push(format!("Shell: {shell}"));
        }
        lines.join("\n")
    }
}

/// `NAME` and `VERSION` from an os-release file.
fn parse_os_release(text: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut version = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "NAME" => name = Some(value),
            "VERSION" => version = Some(value),
            _ => {}
        }
    }
    (name, version)
}
