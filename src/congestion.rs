//! Congestion control and queueing discipline
//!
//! BBR needs the fair-queue qdisc for pacing, so both settings are always
//! written together. A BBR2 request falls back to BBR when the kernel does
//! not advertise `bbr2`, and the persisted module list follows the algorithm
//! that was actually selected.

use crate::config::TunePaths;
use crate::error::TuneResult;
use crate::fragment::{ConfigFragment, FileWriter, FragmentStyle};
use crate::probe::CapabilityProber;
use crate::summary::{RunSummary, Warnings};
use crate::system::{HostSystem, Outcome};
use crate::sysctl;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

pub const QDISC_KEY: &str = "net.core.default_qdisc";
pub const CONGESTION_KEY: &str = "net.ipv4.tcp_congestion_control";
pub const FAIR_QUEUE: &str = "fq";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Bbr,
    Bbr2,
}

impl Algorithm {
    /// Name the kernel uses for the algorithm
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Bbr => "bbr",
            Algorithm::Bbr2 => "bbr2",
        }
    }

    /// Kernel module providing the algorithm
    pub fn module(&self) -> &'static str {
        match self {
            Algorithm::Bbr => "tcp_bbr",
            Algorithm::Bbr2 => "tcp_bbr2",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CongestionOutcome {
    pub requested: Algorithm,
    pub selected: Algorithm,
    pub fell_back: bool,
}

/// Fragment that sets fq + the selected algorithm
pub fn congestion_fragment(path: &Path, algorithm: Algorithm) -> ConfigFragment {
    ConfigFragment::new(path, "congestion control", FragmentStyle::Sysctl)
        .set(QDISC_KEY, FAIR_QUEUE)
        .set(CONGESTION_KEY, algorithm.name())
}

/// Module autoload list for the selected algorithm
pub fn modules_fragment(path: &Path, algorithm: Algorithm) -> ConfigFragment {
    ConfigFragment::new(path, "congestion control module", FragmentStyle::List)
        .item(algorithm.module())
}

pub struct CongestionConfigurator<'a> {
    host: &'a dyn HostSystem,
    prober: &'a CapabilityProber,
    writer: &'a FileWriter,
    paths: &'a TunePaths,
}

impl<'a> CongestionConfigurator<'a> {
    pub fn new(
        host: &'a dyn HostSystem,
        prober: &'a CapabilityProber,
        writer: &'a FileWriter,
        paths: &'a TunePaths,
    ) -> Self {
        Self { host, prober, writer, paths }
    }

    /// Decide which algorithm this kernel can run
    pub async fn select(&self, requested: Algorithm, warnings: &mut Warnings) -> Algorithm {
        if requested == Algorithm::Bbr2 {
            let outcome = self.prober.try_load_module(Algorithm::Bbr2.module()).await;
            debug!("Loading {}: {}", Algorithm::Bbr2.module(), outcome);

            let available = self.prober.available_congestion_controls().await;
            if available.contains(Algorithm::Bbr2.name()) {
                return Algorithm::Bbr2;
            }

            warnings.push(format!(
                "bbr2 is not available on this kernel (available: {}), falling back to bbr",
                join_or_unknown(&available)
            ));
        }

        // Absence is fine: many kernels build tcp_bbr in
        match self.prober.try_load_module(Algorithm::Bbr.module()).await {
            Outcome::Success => {}
            other => info!("{} not loaded ({}), assuming it is built in", Algorithm::Bbr.module(), other),
        }

        let available = self.prober.available_congestion_controls().await;
        if !available.is_empty() && !available.contains(Algorithm::Bbr.name()) {
            warnings.push(format!(
                "bbr is not advertised by the kernel (available: {}); the setting may not take effect",
                join_or_unknown(&available)
            ));
        }

        Algorithm::Bbr
    }

    /// Select, persist and apply congestion control
    pub async fn configure(&self, requested: Algorithm, summary: &mut RunSummary) -> TuneResult<CongestionOutcome> {
        info!("Configuring congestion control (requested {})", requested);
        let selected = self.select(requested, &mut summary.warnings).await;

        let fragment = congestion_fragment(&self.paths.congestion_file, selected);
        sysctl::validate_fragment(&fragment)?;

        let modules = modules_fragment(&self.paths.modules_load_file, selected);
        let outcome = self.writer.write_fragment(&modules).await?;
        summary.record(&modules.path, outcome);

        let outcome = self.writer.write_fragment(&fragment).await?;
        summary.record(&fragment.path, outcome);

        let reload = sysctl::reload_system(self.host, self.writer.is_dry_run()).await;
        if !reload.is_success() {
            summary.warnings.push(format!("sysctl --system reported a problem: {}", reload));
        }

        info!("Congestion control: {} with {} qdisc", selected, FAIR_QUEUE);
        Ok(CongestionOutcome {
            requested,
            selected,
            fell_back: requested != selected,
        })
    }
}

fn join_or_unknown(set: &std::collections::BTreeSet<String>) -> String {
    if set.is_empty() {
        "unknown".to_string()
    } else {
        set.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}
