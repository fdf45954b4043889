//! Read-back of the active kernel and resolver state

use crate::congestion::{Algorithm, CONGESTION_KEY, QDISC_KEY};
use crate::dns::RESOLVER_UNIT;
use crate::probe::CapabilityProber;
use crate::system::{CommandSpec, HostSystem};
use serde::Serialize;
use std::fmt;

pub const UNKNOWN: &str = "unknown";

/// Lines of resolver status included in the report
const RESOLVER_STATUS_LINES: usize = 15;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Report {
    pub kernel_release: String,
    pub available_congestion_controls: Vec<String>,
    pub congestion_control: String,
    pub default_qdisc: String,
    pub tcp_fastopen: String,
    pub tcp_mtu_probing: String,
    pub netdev_max_backlog: String,
    pub somaxconn: String,
    pub nf_conntrack_max: String,
    pub bbr_loaded: bool,
    pub bbr2_loaded: bool,
    /// `None` when the resolver service is not present
    pub resolver_status: Option<Vec<String>>,
}

pub struct Verifier<'a> {
    host: &'a dyn HostSystem,
    prober: &'a CapabilityProber,
}

impl<'a> Verifier<'a> {
    pub fn new(host: &'a dyn HostSystem, prober: &'a CapabilityProber) -> Self {
        Self { host, prober }
    }

    async fn sysctl(&self, key: &str) -> String {
        self.host
            .read_sysctl(key)
            .await
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Snapshot the current state; never mutates anything
    pub async fn verify(&self) -> Report {
        let modules = self.prober.loaded_modules().await;

        let resolver_status = if self.prober.has_service(RESOLVER_UNIT).await {
            let out = self
                .host
                .run(&CommandSpec::new("resolvectl", &["status", "--no-pager"]))
                .await;
            Some(if out.outcome.is_success() {
                out.head(RESOLVER_STATUS_LINES)
            } else {
                Vec::new()
            })
        } else {
            None
        };

        Report {
            kernel_release: self.sysctl("kernel.osrelease").await,
            available_congestion_controls: self
                .prober
                .available_congestion_controls()
                .await
                .into_iter()
                .collect(),
            congestion_control: self.sysctl(CONGESTION_KEY).await,
            default_qdisc: self.sysctl(QDISC_KEY).await,
            tcp_fastopen: self.sysctl("net.ipv4.tcp_fastopen").await,
            tcp_mtu_probing: self.sysctl("net.ipv4.tcp_mtu_probing").await,
            netdev_max_backlog: self.sysctl("net.core.netdev_max_backlog").await,
            somaxconn: self.sysctl("net.core.somaxconn").await,
            nf_conntrack_max: self.sysctl("net.netfilter.nf_conntrack_max").await,
            bbr_loaded: modules.contains(Algorithm::Bbr.module()),
            bbr2_loaded: modules.contains(Algorithm::Bbr2.module()),
            resolver_status,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        let available = if self.available_congestion_controls.is_empty() {
            UNKNOWN.to_string()
        } else {
            self.available_congestion_controls.join(" ")
        };

        writeln!(f, "Kernel:                    {}", self.kernel_release)?;
        writeln!(f, "Available congestion ctl:  {}", available)?;
        writeln!(f, "Congestion control:        {}", self.congestion_control)?;
        writeln!(f, "Default qdisc:             {}", self.default_qdisc)?;
        writeln!(f, "TCP Fast Open:             {}", self.tcp_fastopen)?;
        writeln!(f, "MTU probing:               {}", self.tcp_mtu_probing)?;
        writeln!(f, "netdev_max_backlog:        {}", self.netdev_max_backlog)?;
        writeln!(f, "somaxconn:                 {}", self.somaxconn)?;
        writeln!(f, "nf_conntrack_max:          {}", self.nf_conntrack_max)?;
        writeln!(f, "tcp_bbr loaded:            {}", yes_no(self.bbr_loaded))?;
        write!(f, "tcp_bbr2 loaded:           {}", yes_no(self.bbr2_loaded))?;

        match &self.resolver_status {
            None => write!(f, "\nResolver:                  {} not present", RESOLVER_UNIT)?,
            Some(lines) if lines.is_empty() => write!(f, "\nResolver:                  status unavailable")?,
            Some(lines) => {
                write!(f, "\nResolver status:")?;
                for line in lines {
                    write!(f, "\n  {}", line)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{CommandOutput, MockHostSystem};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unreadable_values_are_unknown() {
        let mut host = MockHostSystem::new();
        host.expect_read_sysctl().returning(|_| None);
        host.expect_read_file().returning(|_| None);
        host.expect_run().returning(|_| CommandOutput::unavailable("systemctl not found"));
        let host: Arc<dyn HostSystem> = Arc::new(host);
        let prober = CapabilityProber::new(host.clone(), false);

        let report = Verifier::new(host.as_ref(), &prober).verify().await;

        assert_eq!(report.kernel_release, UNKNOWN);
        assert_eq!(report.congestion_control, UNKNOWN);
        assert!(report.available_congestion_controls.is_empty());
        assert!(!report.bbr_loaded);
        assert!(report.resolver_status.is_none());
        assert!(report.to_string().contains("not present"));
    }

    #[tokio::test]
    async fn test_active_state() {
        let mut host = MockHostSystem::new();
        host.expect_read_sysctl().returning(|key| {
            let value = match key {
                "kernel.osrelease" => "6.8.0-45-generic",
                "net.ipv4.tcp_available_congestion_control" => "reno cubic bbr",
                "net.ipv4.tcp_congestion_control" => "bbr",
                "net.core.default_qdisc" => "fq",
                "net.core.somaxconn" => "8192",
                _ => return None,
            };
            Some(value.to_string())
        });
        host.expect_read_file()
            .returning(|_| Some("tcp_bbr 20480 3 - Live 0x0\n".to_string()));
        host.expect_run().returning(|cmd| {
            if cmd.program == "resolvectl" {
                CommandOutput::success("Global\n  Protocols: +LLMNR\nresolv.conf mode: stub\n")
            } else {
                CommandOutput::success("")
            }
        });
        let host: Arc<dyn HostSystem> = Arc::new(host);
        let prober = CapabilityProber::new(host.clone(), false);

        let report = Verifier::new(host.as_ref(), &prober).verify().await;

        assert_eq!(report.kernel_release, "6.8.0-45-generic");
        assert_eq!(report.available_congestion_controls, vec!["bbr", "cubic", "reno"]);
        assert_eq!(report.congestion_control, "bbr");
        assert_eq!(report.default_qdisc, "fq");
        assert_eq!(report.somaxconn, "8192");
        assert_eq!(report.tcp_fastopen, UNKNOWN);
        assert!(report.bbr_loaded);
        assert!(!report.bbr2_loaded);
        assert_eq!(report.resolver_status.as_ref().unwrap().len(), 3);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["congestion_control"], "bbr");
    }
}
