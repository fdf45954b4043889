//! DNS resolver configuration via systemd-resolved

use crate::config::{ToolSettings, TunePaths};
use crate::error::{TuneError, TuneResult};
use crate::fragment::{ConfigFragment, FileWriter, FragmentStyle};
use crate::probe::CapabilityProber;
use crate::summary::RunSummary;
use crate::system::{CommandSpec, HostSystem, Outcome};
use crate::validation;
use serde::Serialize;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub const RESOLVER_UNIT: &str = "systemd-resolved";

/// Lines of `resolvectl status` shown after a change
const STATUS_LINES: usize = 20;

/// Fallback servers used with a custom address list
const CUSTOM_FALLBACK: &[&str] = &["1.1.1.1", "9.9.9.9"];

/// Known resolver providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsProvider {
    Cloudflare,
    Quad9,
    Google,
}

impl DnsProvider {
    pub const ALL: [DnsProvider; 3] = [DnsProvider::Cloudflare, DnsProvider::Quad9, DnsProvider::Google];

    pub fn name(&self) -> &'static str {
        match self {
            DnsProvider::Cloudflare => "cloudflare",
            DnsProvider::Quad9 => "quad9",
            DnsProvider::Google => "google",
        }
    }

    pub fn primary(&self) -> &'static [&'static str] {
        match self {
            DnsProvider::Cloudflare => &["1.1.1.1", "1.0.0.1", "2606:4700:4700::1111", "2606:4700:4700::1001"],
            DnsProvider::Quad9 => &["9.9.9.9", "149.112.112.112", "2620:fe::fe", "2620:fe::9"],
            DnsProvider::Google => &["8.8.8.8", "8.8.4.4", "2001:4860:4860::8888", "2001:4860:4860::8844"],
        }
    }

    pub fn fallback(&self) -> &'static [&'static str] {
        match self {
            DnsProvider::Cloudflare => &["9.9.9.9", "8.8.8.8"],
            DnsProvider::Quad9 => &["1.1.1.1", "8.8.8.8"],
            DnsProvider::Google => &["1.1.1.1", "9.9.9.9"],
        }
    }
}

/// A named provider or an explicit ordered address list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsPolicy {
    Provider(DnsProvider),
    Custom(Vec<IpAddr>),
}

impl DnsPolicy {
    /// Primary and fallback server lists
    pub fn resolve(&self) -> (Vec<String>, Vec<String>) {
        let to_strings = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match self {
            DnsPolicy::Provider(provider) => (to_strings(provider.primary()), to_strings(provider.fallback())),
            DnsPolicy::Custom(addrs) => (
                addrs.iter().map(IpAddr::to_string).collect(),
                to_strings(CUSTOM_FALLBACK),
            ),
        }
    }
}

impl FromStr for DnsPolicy {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(provider) = DnsProvider::ALL
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(trimmed))
        {
            return Ok(DnsPolicy::Provider(*provider));
        }

        let items: Vec<&str> = trimmed
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return Err(TuneError::UnknownDnsProvider(s.to_string()));
        }

        items
            .iter()
            .map(|item| validation::validate_ip_address(item))
            .collect::<TuneResult<Vec<_>>>()
            .map(DnsPolicy::Custom)
            .map_err(|_| TuneError::UnknownDnsProvider(s.to_string()))
    }
}

/// What the DNS step did
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DnsOutcome {
    Configured {
        primary: Vec<String>,
        fallback: Vec<String>,
        restarted: bool,
    },
    Skipped {
        reason: String,
    },
}

pub fn resolved_fragment(path: &Path, primary: &[String], fallback: &[String]) -> ConfigFragment {
    ConfigFragment::new(path, "Resolve", FragmentStyle::Ini)
        .set("DNS", primary.join(" "))
        .set("FallbackDNS", fallback.join(" "))
        .set("DNSSEC", "no")
}

pub struct DnsConfigurator<'a> {
    host: &'a dyn HostSystem,
    prober: &'a CapabilityProber,
    writer: &'a FileWriter,
    paths: &'a TunePaths,
    tools: &'a ToolSettings,
    install_allowed: bool,
}

impl<'a> DnsConfigurator<'a> {
    pub fn new(
        host: &'a dyn HostSystem,
        prober: &'a CapabilityProber,
        writer: &'a FileWriter,
        paths: &'a TunePaths,
        tools: &'a ToolSettings,
        install_allowed: bool,
    ) -> Self {
        Self { host, prober, writer, paths, tools, install_allowed }
    }

    pub async fn configure_dns(&self, policy: &DnsPolicy, summary: &mut RunSummary) -> TuneResult<DnsOutcome> {
        let (primary, fallback) = policy.resolve();
        info!("Configuring DNS: {} (fallback {})", primary.join(" "), fallback.join(" "));

        if !self.ensure_resolver(summary).await {
            let reason = format!("{} is not available", RESOLVER_UNIT);
            summary.warnings.push(format!("{}; skipping DNS configuration", reason));
            return Ok(DnsOutcome::Skipped { reason });
        }

        self.check_resolv_conf(summary).await;

        let fragment = resolved_fragment(&self.paths.resolved_dropin, &primary, &fallback);
        let outcome = self.writer.write_fragment(&fragment).await?;
        summary.record(&fragment.path, outcome);

        let restarted = self.restart_resolver(summary).await;
        self.report_status().await;

        Ok(DnsOutcome::Configured { primary, fallback, restarted })
    }

    /// Make sure systemd-resolved exists, installing it when allowed
    async fn ensure_resolver(&self, summary: &mut RunSummary) -> bool {
        if self.prober.has_service(RESOLVER_UNIT).await {
            return true;
        }

        if !self.install_allowed {
            info!("{} not present and tool installation is disabled", RESOLVER_UNIT);
            return false;
        }

        if self.writer.is_dry_run() {
            info!("Would install {}", RESOLVER_UNIT);
            return true;
        }

        info!("{} not present, installing it", RESOLVER_UNIT);
        let install = CommandSpec::new("apt-get", &["install", "-y", "--no-install-recommends", RESOLVER_UNIT])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .timeout(self.tools.install_timeout());
        let out = self.host.run(&install).await;
        if !out.outcome.is_success() {
            summary.warnings.push(format!("Installing {} failed: {}", RESOLVER_UNIT, out.outcome));
            return false;
        }

        let enable = CommandSpec::new("systemctl", &["enable", "--now", RESOLVER_UNIT]);
        let out = self.host.run(&enable).await;
        if !out.outcome.is_success() {
            summary.warnings.push(format!("Enabling {} failed: {}", RESOLVER_UNIT, out.outcome));
        }

        self.prober.has_service(RESOLVER_UNIT).await
    }

    /// A plain /etc/resolv.conf may be rewritten per interface behind our back
    async fn check_resolv_conf(&self, summary: &mut RunSummary) {
        if self.host.is_symlink(&self.paths.resolv_conf).await == Some(false) {
            summary.warnings.push(format!(
                "{} is a regular file, not managed by {}; DHCP or another tool may still override DNS per interface",
                self.paths.resolv_conf.display(),
                RESOLVER_UNIT
            ));
        }
    }

    async fn restart_resolver(&self, summary: &mut RunSummary) -> bool {
        if self.writer.is_dry_run() {
            info!("Would restart {}", RESOLVER_UNIT);
            return false;
        }

        let out = self
            .host
            .run(&CommandSpec::new("systemctl", &["restart", RESOLVER_UNIT]))
            .await;
        match out.outcome {
            Outcome::Success => {
                info!("Restarted {}", RESOLVER_UNIT);
                true
            }
            other => {
                summary.warnings.push(format!(
                    "Restarting {} failed ({}); the new settings apply on next restart",
                    RESOLVER_UNIT, other
                ));
                false
            }
        }
    }

    /// Best-effort cache flush and status for the operator
    async fn report_status(&self) {
        if self.writer.is_dry_run() {
            return;
        }

        let flush = self
            .host
            .run(&CommandSpec::new("resolvectl", &["flush-caches"]))
            .await;
        if !flush.outcome.is_success() {
            info!("DNS cache flush skipped: {}", flush.outcome);
        }

        let status = self
            .host
            .run(&CommandSpec::new("resolvectl", &["status", "--no-pager"]))
            .await;
        if status.outcome.is_success() {
            for line in status.head(STATUS_LINES) {
                info!("  {}", line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("cloudflare".parse::<DnsPolicy>().unwrap(), DnsPolicy::Provider(DnsProvider::Cloudflare));
        assert_eq!("Quad9".parse::<DnsPolicy>().unwrap(), DnsPolicy::Provider(DnsProvider::Quad9));
        assert_eq!(" GOOGLE ".parse::<DnsPolicy>().unwrap(), DnsPolicy::Provider(DnsProvider::Google));
    }

    #[test]
    fn test_custom_list_parsing() {
        let policy: DnsPolicy = "10.0.0.53, 2001:db8::53,192.168.1.1".parse().unwrap();
        let (primary, fallback) = policy.resolve();
        assert_eq!(primary, vec!["10.0.0.53", "2001:db8::53", "192.168.1.1"]);
        assert_eq!(fallback, vec!["1.1.1.1", "9.9.9.9"]);
    }

    #[test]
    fn test_unknown_provider() {
        for bad in ["foo", "", ",", "1.1.1.1,foo", "1.1.1.1;reboot", "cloudflare,google"] {
            let err = bad.parse::<DnsPolicy>().unwrap_err();
            assert!(matches!(err, TuneError::UnknownDnsProvider(_)), "{:?}", bad);
            assert!(err.is_usage());
        }
    }

    #[test]
    fn test_provider_tables() {
        let (primary, fallback) = DnsPolicy::Provider(DnsProvider::Cloudflare).resolve();
        assert_eq!(primary[0], "1.1.1.1");
        assert_eq!(fallback, vec!["9.9.9.9", "8.8.8.8"]);

        for provider in DnsProvider::ALL {
            for addr in provider.primary().iter().chain(provider.fallback()) {
                assert!(addr.parse::<IpAddr>().is_ok(), "{}", addr);
            }
            // fallback must not repeat the primary provider
            assert!(provider.fallback().iter().all(|a| !provider.primary().contains(a)));
        }
    }

    #[test]
    fn test_resolved_fragment() {
        let (primary, fallback) = DnsPolicy::Provider(DnsProvider::Quad9).resolve();
        let fragment = resolved_fragment(Path::new("/etc/systemd/resolved.conf.d/nettune-dns.conf"), &primary, &fallback);
        assert_eq!(
            fragment.render(),
            "[Resolve]\n\
             DNS=9.9.9.9 149.112.112.112 2620:fe::fe 2620:fe::9\n\
             FallbackDNS=1.1.1.1 8.8.8.8\n\
             DNSSEC=no\n"
        );
    }

    async fn configure_with(is_symlink: Option<bool>) -> RunSummary {
        use crate::backup::BackupManager;
        use crate::config::TuneConfig;
        use crate::system::{CommandOutput, MockHostSystem};
        use std::sync::Arc;

        let tmp = tempfile::TempDir::new().unwrap();
        let config = TuneConfig::rooted_at(tmp.path());

        let mut host = MockHostSystem::new();
        host.expect_run().returning(|_| CommandOutput::success(""));
        host.expect_is_symlink().returning(move |_| is_symlink);
        let host: Arc<dyn HostSystem> = Arc::new(host);

        let prober = CapabilityProber::new(host.clone(), false);
        let writer = FileWriter::new(BackupManager::new(config.paths.backup_root.clone()), false);
        let mut summary = RunSummary::default();

        let outcome = DnsConfigurator::new(host.as_ref(), &prober, &writer, &config.paths, &config.tools, false)
            .configure_dns(&DnsPolicy::Provider(DnsProvider::Cloudflare), &mut summary)
            .await
            .unwrap();
        assert!(matches!(outcome, DnsOutcome::Configured { restarted: true, .. }));
        summary
    }

    #[tokio::test]
    async fn test_plain_resolv_conf_warns() {
        let summary = configure_with(Some(false)).await;
        assert!(summary.warnings.contains("regular file"));
    }

    #[tokio::test]
    async fn test_linked_or_missing_resolv_conf_is_quiet() {
        assert!(configure_with(Some(true)).await.warnings.is_empty());
        assert!(configure_with(None).await.warnings.is_empty());
    }
}
