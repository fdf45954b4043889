//! Configuration management for nettune

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{TuneError, TuneResult};

/// Main nettune configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneConfig {
    /// Persisted file locations
    #[serde(default)]
    pub paths: TunePaths,
    /// Troubleshooting tool installation
    #[serde(default)]
    pub tools: ToolSettings,
    /// Timeout applied to every external command (seconds)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunePaths {
    /// Module autoload list (modules-load.d)
    #[serde(default = "default_modules_load_file")]
    pub modules_load_file: PathBuf,
    /// Congestion control sysctl fragment
    #[serde(default = "default_congestion_file")]
    pub congestion_file: PathBuf,
    /// Traffic tuning sysctl fragment
    #[serde(default = "default_tuning_file")]
    pub tuning_file: PathBuf,
    /// systemd-resolved drop-in fragment
    #[serde(default = "default_resolved_dropin")]
    pub resolved_dropin: PathBuf,
    /// Global resolver file, only inspected
    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: PathBuf,
    /// Directory that receives per-run backup sets
    #[serde(default = "default_backup_root")]
    pub backup_root: PathBuf,
    /// os-release file used for distribution detection
    #[serde(default = "default_os_release")]
    pub os_release: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Install troubleshooting tools unless --no-tools is given
    #[serde(default = "default_true")]
    pub install: bool,
    /// Packages installed through apt-get
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,
    /// Timeout for package manager commands (seconds)
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,
}

impl ToolSettings {
    /// Timeout for package manager commands
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

fn default_modules_load_file() -> PathBuf {
    PathBuf::from("/etc/modules-load.d/nettune-bbr.conf")
}

fn default_congestion_file() -> PathBuf {
    PathBuf::from("/etc/sysctl.d/60-nettune-bbr.conf")
}

fn default_tuning_file() -> PathBuf {
    PathBuf::from("/etc/sysctl.d/61-nettune-vpn.conf")
}

fn default_resolved_dropin() -> PathBuf {
    PathBuf::from("/etc/systemd/resolved.conf.d/nettune-dns.conf")
}

fn default_resolv_conf() -> PathBuf {
    PathBuf::from("/etc/resolv.conf")
}

fn default_backup_root() -> PathBuf {
    PathBuf::from("/root")
}

fn default_os_release() -> PathBuf {
    PathBuf::from("/etc/os-release")
}

fn default_command_timeout() -> u64 {
    120
}

fn default_install_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_packages() -> Vec<String> {
    [
        "iproute2",
        "ethtool",
        "conntrack",
        "dnsutils",
        "tcpdump",
        "mtr-tiny",
        "iperf3",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl Default for TunePaths {
    fn default() -> Self {
        Self {
            modules_load_file: default_modules_load_file(),
            congestion_file: default_congestion_file(),
            tuning_file: default_tuning_file(),
            resolved_dropin: default_resolved_dropin(),
            resolv_conf: default_resolv_conf(),
            backup_root: default_backup_root(),
            os_release: default_os_release(),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            install: default_true(),
            packages: default_packages(),
            install_timeout_secs: default_install_timeout(),
        }
    }
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            paths: TunePaths::default(),
            tools: ToolSettings::default(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl TuneConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> TuneResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| TuneError::Config(format!("Failed to read config {}: {}", path.as_ref().display(), e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> TuneResult<Self> {
        let config: TuneConfig = toml::from_str(content)
            .map_err(|e| TuneError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Persisted paths must be absolute so backups mirror them
    pub fn validate(&self) -> TuneResult<()> {
        let p = &self.paths;
        for path in [
            &p.modules_load_file,
            &p.congestion_file,
            &p.tuning_file,
            &p.resolved_dropin,
            &p.resolv_conf,
            &p.backup_root,
            &p.os_release,
        ] {
            if !path.is_absolute() {
                return Err(TuneError::Config(format!("Path must be absolute: {}", path.display())));
            }
        }

        if self.command_timeout_secs == 0 || self.tools.install_timeout_secs == 0 {
            return Err(TuneError::Config("Timeouts must be greater than zero".to_string()));
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Configuration with every persisted path rooted under `root` (used for staging and tests)
    pub fn rooted_at(root: &Path) -> Self {
        let rebase = |p: PathBuf| root.join(p.strip_prefix("/").unwrap_or(&p));
        let defaults = TunePaths::default();
        Self {
            paths: TunePaths {
                modules_load_file: rebase(defaults.modules_load_file),
                congestion_file: rebase(defaults.congestion_file),
                tuning_file: rebase(defaults.tuning_file),
                resolved_dropin: rebase(defaults.resolved_dropin),
                resolv_conf: rebase(defaults.resolv_conf),
                backup_root: rebase(defaults.backup_root),
                os_release: rebase(defaults.os_release),
            },
            ..Self::default()
        }
    }
}
