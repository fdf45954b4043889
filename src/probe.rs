//! Kernel and service capability probing
//!
//! Nothing here returns an error: an unreadable or missing capability is
//! reported as unavailable and the caller decides what to fall back to.

use crate::system::{CommandSpec, HostSystem, Outcome};
use crate::validation;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const AVAILABLE_CC_KEY: &str = "net.ipv4.tcp_available_congestion_control";

pub struct CapabilityProber {
    host: Arc<dyn HostSystem>,
    dry_run: bool,
}

impl CapabilityProber {
    pub fn new(host: Arc<dyn HostSystem>, dry_run: bool) -> Self {
        Self { host, dry_run }
    }

    /// Attempt to load a kernel module
    ///
    /// Loading is a mutation, so in dry-run mode it is only reported.
    pub async fn try_load_module(&self, name: &str) -> Outcome {
        if let Err(e) = validation::validate_module_name(name) {
            return Outcome::Failed(e.to_string());
        }

        if self.dry_run {
            info!("Would load kernel module {}", name);
            return Outcome::Success;
        }

        let out = self.host.run(&CommandSpec::new("modprobe", &[name])).await;
        match &out.outcome {
            Outcome::Success => debug!("Loaded kernel module {}", name),
            other => debug!("Module {} not loaded: {}", name, other),
        }
        out.outcome
    }

    /// Congestion control algorithms the kernel currently advertises
    pub async fn available_congestion_controls(&self) -> BTreeSet<String> {
        self.host
            .read_sysctl(AVAILABLE_CC_KEY)
            .await
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Whether the service manager knows a unit
    pub async fn has_service(&self, name: &str) -> bool {
        if validation::validate_unit_name(name).is_err() {
            return false;
        }

        let out = self
            .host
            .run(&CommandSpec::new("systemctl", &["cat", "--no-pager", name]))
            .await;
        out.outcome.is_success()
    }

    /// Names of currently loaded kernel modules
    pub async fn loaded_modules(&self) -> BTreeSet<String> {
        self.host
            .read_file(Path::new("/proc/modules"))
            .await
            .map(|content| parse_proc_modules(&content))
            .unwrap_or_default()
    }

    /// Whether a sysctl key exists on this kernel
    pub async fn sysctl_key_exists(&self, key: &str) -> bool {
        self.host.read_sysctl(key).await.is_some()
    }
}

/// First column of /proc/modules
pub fn parse_proc_modules(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}
