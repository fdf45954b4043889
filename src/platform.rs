//! Host platform: privilege, distribution detection and tool installation

use crate::config::ToolSettings;
use crate::error::{TuneError, TuneResult};
use crate::summary::Warnings;
use crate::system::{CommandSpec, HostSystem};
use crate::validation;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Distribution family, as far as nettune cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsFamily {
    /// Debian, Ubuntu and derivatives (apt-get available)
    Debian,
    Other(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsInfo {
    pub family: OsFamily,
    pub pretty_name: String,
}

impl OsInfo {
    pub fn supports_apt(&self) -> bool {
        self.family == OsFamily::Debian
    }
}

/// Parse `/etc/os-release` style `KEY=value` lines
pub fn parse_os_release(content: &str) -> OsInfo {
    let fields: HashMap<&str, String> = content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim().trim_matches('"').to_string()))
        .collect();

    let id = fields.get("ID").cloned().unwrap_or_default();
    let like = fields.get("ID_LIKE").cloned().unwrap_or_default();

    let family = if id.is_empty() {
        OsFamily::Unknown
    } else if id == "debian" || id == "ubuntu" || like.split_whitespace().any(|l| l == "debian" || l == "ubuntu") {
        OsFamily::Debian
    } else {
        OsFamily::Other(id.clone())
    };

    let pretty_name = fields
        .get("PRETTY_NAME")
        .cloned()
        .unwrap_or_else(|| if id.is_empty() { "unknown".to_string() } else { id });

    OsInfo { family, pretty_name }
}

/// Detect the distribution; unrecognized families only warn
pub async fn detect_os(host: &dyn HostSystem, os_release: &Path, warnings: &mut Warnings) -> OsInfo {
    let info = host
        .read_file(os_release)
        .await
        .map(|content| parse_os_release(&content))
        .unwrap_or(OsInfo { family: OsFamily::Unknown, pretty_name: "unknown".to_string() });

    match &info.family {
        OsFamily::Debian => info!("Detected {}", info.pretty_name),
        OsFamily::Other(id) => warnings.push(format!(
            "Unrecognized distribution '{}' ({}); continuing, package installation disabled",
            id, info.pretty_name
        )),
        OsFamily::Unknown => warnings.push(format!(
            "Could not read {}; continuing, package installation disabled",
            os_release.display()
        )),
    }

    info
}

/// Administrative rights are required before anything is touched
pub fn require_root(host: &dyn HostSystem) -> TuneResult<()> {
    if host.is_root() {
        return Ok(());
    }

    Err(TuneError::PermissionDenied(
        "nettune must run as root (try sudo)".to_string(),
    ))
}

/// Install troubleshooting tools through apt-get; failures only warn
pub async fn install_tools(
    host: &dyn HostSystem,
    os: &OsInfo,
    tools: &ToolSettings,
    dry_run: bool,
    warnings: &mut Warnings,
) {
    if tools.packages.is_empty() {
        return;
    }

    if !os.supports_apt() {
        info!("Skipping tool installation on {}", os.pretty_name);
        return;
    }

    let mut packages = Vec::new();
    for package in &tools.packages {
        match validation::validate_unit_name(package) {
            Ok(()) => packages.push(package.as_str()),
            Err(e) => warnings.push(format!("Ignoring package '{}': {}", package, e)),
        }
    }
    if packages.is_empty() {
        return;
    }

    if dry_run {
        info!("Would install: {}", packages.join(" "));
        return;
    }

    let timeout = tools.install_timeout();
    info!("Installing troubleshooting tools: {}", packages.join(" "));

    let update = CommandSpec::new("apt-get", &["update"])
        .env("DEBIAN_FRONTEND", "noninteractive")
        .timeout(timeout);
    let out = host.run(&update).await;
    if !out.outcome.is_success() {
        warnings.push(format!("apt-get update failed: {}", out.outcome));
    }

    let mut install = CommandSpec::new("apt-get", &["install", "-y", "--no-install-recommends"])
        .env("DEBIAN_FRONTEND", "noninteractive")
        .timeout(timeout);
    for package in packages {
        install = install.arg(package);
    }
    let out = host.run(&install).await;
    if !out.outcome.is_success() {
        warnings.push(format!("Tool installation failed: {}", out.outcome));
    }
}
