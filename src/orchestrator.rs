//! Orchestrator - sequences one nettune run
//!
//! privilege check -> distribution detection -> tool installation ->
//! congestion control -> traffic tuning -> DNS -> verification.
//! Backups are taken on demand by the file writer. Only the privilege check
//! and failed writes abort a run; everything else is collected as warnings.

use crate::backup::BackupManager;
use crate::config::TuneConfig;
use crate::congestion::CongestionConfigurator;
use crate::dns::DnsConfigurator;
use crate::error::TuneResult;
use crate::fragment::FileWriter;
use crate::intent::RunIntent;
use crate::platform;
use crate::probe::CapabilityProber;
use crate::summary::RunSummary;
use crate::system::HostSystem;
use crate::tuning::TuningConfigurator;
use crate::verify::Verifier;
use std::sync::Arc;
use tracing::info;

pub struct Orchestrator {
    host: Arc<dyn HostSystem>,
    config: TuneConfig,
}

impl Orchestrator {
    pub fn new(host: Arc<dyn HostSystem>, config: TuneConfig) -> Self {
        Self { host, config }
    }

    pub async fn run(&self, intent: &RunIntent) -> TuneResult<RunSummary> {
        platform::require_root(self.host.as_ref())?;

        let mut summary = RunSummary {
            dry_run: intent.dry_run,
            ..RunSummary::default()
        };
        for notice in &intent.notices {
            summary.warnings.push(notice.clone());
        }
        info!("Plan: {}", intent.describe());

        let host = self.host.as_ref();
        let paths = &self.config.paths;
        let os = platform::detect_os(host, &paths.os_release, &mut summary.warnings).await;
        summary.os = Some(os.pretty_name.clone());

        let prober = CapabilityProber::new(self.host.clone(), intent.dry_run);
        let writer = FileWriter::new(BackupManager::new(paths.backup_root.clone()), intent.dry_run);

        if intent.install_tools {
            platform::install_tools(host, &os, &self.config.tools, intent.dry_run, &mut summary.warnings).await;
        } else {
            info!("Skipping troubleshooting tool installation");
        }

        if let Some(requested) = intent.congestion {
            let outcome = CongestionConfigurator::new(host, &prober, &writer, paths)
                .configure(requested, &mut summary)
                .await?;
            summary.congestion = Some(outcome);
        }

        if intent.vpn_tuning {
            TuningConfigurator::new(host, &prober, &writer, paths)
                .configure(&mut summary)
                .await?;
        }

        match &intent.dns {
            Some(policy) => {
                let install_allowed = intent.install_tools && os.supports_apt();
                let outcome = DnsConfigurator::new(host, &prober, &writer, paths, &self.config.tools, install_allowed)
                    .configure_dns(policy, &mut summary)
                    .await?;
                summary.dns = Some(outcome);
            }
            None => info!("DNS configuration unchanged"),
        }

        summary.previews = writer.take_previews().await;
        summary.backup_dir = writer.backup_dir().await;
        if let Some(dir) = &summary.backup_dir {
            info!("Previous files saved in {}", dir.display());
        }

        summary.report = Some(Verifier::new(host, &prober).verify().await);
        Ok(summary)
    }
}
