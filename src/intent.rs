//! Resolution of command-line flags into the set of actions to perform

use crate::congestion::Algorithm;
use crate::dns::DnsPolicy;
use crate::error::TuneResult;

/// Raw flag values as parsed from the command line / environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentFlags {
    pub bbr: bool,
    pub bbr2: bool,
    pub vpn_tuning: bool,
    pub dns: Option<String>,
    pub no_dns: bool,
    pub no_tools: bool,
    pub dry_run: bool,
}

/// What a run will do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIntent {
    pub congestion: Option<Algorithm>,
    pub vpn_tuning: bool,
    pub dns: Option<DnsPolicy>,
    pub install_tools: bool,
    pub dry_run: bool,
    /// Flag combinations that were resolved by a precedence rule
    pub notices: Vec<String>,
}

impl RunIntent {
    /// Resolve flags into an intent
    ///
    /// With no action flag (`--bbr`, `--bbr2`, `--vpn-tuning`, `--dns`) the
    /// default is BBR plus traffic tuning, DNS untouched. `--bbr2` wins over
    /// `--bbr`; `--no-dns` wins over `--dns`, and a `--dns` cancelled that way
    /// is not an action, so the default plan still applies. An unparseable
    /// `--dns` value is rejected even when `--no-dns` is also given.
    pub fn from_flags(flags: &IntentFlags, install_by_default: bool) -> TuneResult<Self> {
        let policy = flags
            .dns
            .as_deref()
            .map(str::parse::<DnsPolicy>)
            .transpose()?;

        let mut notices = Vec::new();
        let dns_requested = flags.dns.is_some() && !flags.no_dns;
        let any_action = flags.bbr || flags.bbr2 || flags.vpn_tuning || dns_requested;

        let (congestion, vpn_tuning) = if any_action {
            let congestion = if flags.bbr2 {
                if flags.bbr {
                    notices.push("Both --bbr and --bbr2 given; using --bbr2 (it falls back to bbr)".to_string());
                }
                Some(Algorithm::Bbr2)
            } else if flags.bbr {
                Some(Algorithm::Bbr)
            } else {
                None
            };
            (congestion, flags.vpn_tuning)
        } else {
            (Some(Algorithm::Bbr), true)
        };

        let dns = if flags.no_dns {
            if policy.is_some() {
                notices.push("--no-dns given together with --dns; skipping DNS configuration".to_string());
            }
            None
        } else {
            policy
        };

        Ok(Self {
            congestion,
            vpn_tuning,
            dns,
            install_tools: install_by_default && !flags.no_tools,
            dry_run: flags.dry_run,
            notices,
        })
    }

    /// One-line description for logs
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(algorithm) = self.congestion {
            parts.push(format!("congestion={}", algorithm));
        }
        if self.vpn_tuning {
            parts.push("vpn-tuning".to_string());
        }
        match &self.dns {
            Some(DnsPolicy::Provider(provider)) => parts.push(format!("dns={}", provider.name())),
            Some(DnsPolicy::Custom(addrs)) => parts.push(format!("dns={} custom server(s)", addrs.len())),
            None => parts.push("dns=skip".to_string()),
        }
        if !self.install_tools {
            parts.push("no-tools".to_string());
        }
        if self.dry_run {
            parts.push("dry-run".to_string());
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsProvider;
    use crate::error::TuneError;

    #[test]
    fn test_default_intent() {
        let intent = RunIntent::from_flags(&IntentFlags::default(), true).unwrap();
        assert_eq!(intent.congestion, Some(Algorithm::Bbr));
        assert!(intent.vpn_tuning);
        assert!(intent.dns.is_none());
        assert!(intent.install_tools);
        assert!(!intent.dry_run);
        assert!(intent.notices.is_empty());
    }

    #[test]
    fn test_modifiers_keep_default() {
        let flags = IntentFlags { dry_run: true, no_tools: true, no_dns: true, ..Default::default() };
        let intent = RunIntent::from_flags(&flags, true).unwrap();
        assert_eq!(intent.congestion, Some(Algorithm::Bbr));
        assert!(intent.vpn_tuning);
        assert!(!intent.install_tools);
        assert!(intent.dry_run);
    }

    #[test]
    fn test_explicit_actions_only() {
        let flags = IntentFlags { dns: Some("google".into()), ..Default::default() };
        let intent = RunIntent::from_flags(&flags, true).unwrap();
        assert_eq!(intent.congestion, None);
        assert!(!intent.vpn_tuning);
        assert_eq!(intent.dns, Some(DnsPolicy::Provider(DnsProvider::Google)));

        let flags = IntentFlags { vpn_tuning: true, ..Default::default() };
        let intent = RunIntent::from_flags(&flags, true).unwrap();
        assert_eq!(intent.congestion, None);
        assert!(intent.vpn_tuning);
    }

    #[test]
    fn test_bbr2_wins_over_bbr() {
        let flags = IntentFlags { bbr: true, bbr2: true, ..Default::default() };
        let intent = RunIntent::from_flags(&flags, true).unwrap();
        assert_eq!(intent.congestion, Some(Algorithm::Bbr2));
        assert_eq!(intent.notices.len(), 1);
    }

    #[test]
    fn test_no_dns_wins_over_dns() {
        let flags = IntentFlags { dns: Some("cloudflare".into()), no_dns: true, ..Default::default() };
        let intent = RunIntent::from_flags(&flags, true).unwrap();
        assert!(intent.dns.is_none());
        assert!(intent.notices[0].contains("--no-dns"));
        // A cancelled --dns is not an action: the default plan applies
        assert_eq!(intent.congestion, Some(Algorithm::Bbr));
        assert!(intent.vpn_tuning);

        let flags = IntentFlags { dns: Some("cloudflare".into()), no_dns: true, bbr2: true, ..Default::default() };
        let intent = RunIntent::from_flags(&flags, true).unwrap();
        assert_eq!(intent.congestion, Some(Algorithm::Bbr2));
        assert!(!intent.vpn_tuning);
        assert!(intent.dns.is_none());
    }

    #[test]
    fn test_unknown_dns_is_usage_error() {
        let flags = IntentFlags { dns: Some("foo".into()), ..Default::default() };
        let err = RunIntent::from_flags(&flags, true).unwrap_err();
        assert!(matches!(err, TuneError::UnknownDnsProvider(_)));

        let flags = IntentFlags { dns: Some("foo".into()), no_dns: true, ..Default::default() };
        assert!(RunIntent::from_flags(&flags, true).is_err());
    }

    #[test]
    fn test_install_policy() {
        let intent = RunIntent::from_flags(&IntentFlags::default(), false).unwrap();
        assert!(!intent.install_tools);
    }

    #[test]
    fn test_describe() {
        let intent = RunIntent::from_flags(&IntentFlags::default(), true).unwrap();
        assert_eq!(intent.describe(), "congestion=bbr, vpn-tuning, dns=skip");
    }
}
