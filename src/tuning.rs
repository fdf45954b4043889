//! Kernel parameters for VPN-scale traffic
//!
//! Fixed values sized for 50-100 concurrent clients. No per-host scaling.

use crate::config::TunePaths;
use crate::error::TuneResult;
use crate::fragment::{ConfigFragment, FileWriter, FragmentStyle};
use crate::probe::CapabilityProber;
use crate::summary::RunSummary;
use crate::system::HostSystem;
use crate::sysctl;
use std::path::Path;
use tracing::{debug, info};

/// Module that provides the connection-tracking keys
pub const CONNTRACK_MODULE: &str = "nf_conntrack";

/// The VPN tuning table, in file order
pub const VPN_TUNING: &[(&str, &str)] = &[
    // Backlogs
    ("net.core.netdev_max_backlog", "16384"),
    ("net.core.somaxconn", "8192"),
    ("net.ipv4.tcp_max_syn_backlog", "8192"),
    // TCP behaviour
    ("net.ipv4.tcp_fastopen", "3"),
    ("net.ipv4.tcp_mtu_probing", "1"),
    ("net.ipv4.tcp_fin_timeout", "15"),
    ("net.ipv4.tcp_keepalive_time", "600"),
    ("net.ipv4.tcp_keepalive_intvl", "30"),
    ("net.ipv4.tcp_keepalive_probes", "5"),
    // Connection tracking
    ("net.netfilter.nf_conntrack_max", "262144"),
    // Socket buffers
    ("net.core.rmem_default", "262144"),
    ("net.core.wmem_default", "262144"),
    ("net.core.rmem_max", "67108864"),
    ("net.core.wmem_max", "67108864"),
    ("net.ipv4.tcp_rmem", "4096 262144 67108864"),
    ("net.ipv4.tcp_wmem", "4096 262144 67108864"),
];

pub fn tuning_fragment(path: &Path) -> ConfigFragment {
    VPN_TUNING
        .iter()
        .fold(
            ConfigFragment::new(path, "VPN traffic tuning", FragmentStyle::Sysctl),
            |fragment, (key, value)| fragment.set(key, value),
        )
}

pub struct TuningConfigurator<'a> {
    host: &'a dyn HostSystem,
    prober: &'a CapabilityProber,
    writer: &'a FileWriter,
    paths: &'a TunePaths,
}

impl<'a> TuningConfigurator<'a> {
    pub fn new(
        host: &'a dyn HostSystem,
        prober: &'a CapabilityProber,
        writer: &'a FileWriter,
        paths: &'a TunePaths,
    ) -> Self {
        Self { host, prober, writer, paths }
    }

    pub async fn configure(&self, summary: &mut RunSummary) -> TuneResult<()> {
        info!("Applying VPN traffic tuning");
        let fragment = tuning_fragment(&self.paths.tuning_file);
        sysctl::validate_fragment(&fragment)?;

        let loaded = self.prober.try_load_module(CONNTRACK_MODULE).await;
        debug!("Loading {}: {}", CONNTRACK_MODULE, loaded);

        let missing = sysctl::missing_keys(self.prober, &fragment).await;
        if !missing.is_empty() {
            summary.warnings.push(format!(
                "Kernel does not expose {}; those values apply once the feature is available",
                missing.join(", ")
            ));
        }

        let outcome = self.writer.write_fragment(&fragment).await?;
        summary.record(&fragment.path, outcome);

        let reload = sysctl::reload_system(self.host, self.writer.is_dry_run()).await;
        if !reload.is_success() {
            summary.warnings.push(format!("sysctl --system reported a problem: {}", reload));
        }

        summary.tuning_applied = true;
        Ok(())
    }
}
