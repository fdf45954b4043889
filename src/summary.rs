//! Run summary and warning collection

use crate::congestion::CongestionOutcome;
use crate::dns::DnsOutcome;
use crate::fragment::{Preview, WriteOutcome};
use crate::verify::Report;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Non-fatal problems seen during a run
///
/// Every entry is also emitted as a WARN event when recorded.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Warnings(Vec<String>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.0.push(message);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.iter().any(|w| w.contains(needle))
    }
}

/// A persisted file touched during the run
#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub outcome: String,
}

impl FileChange {
    pub fn new(path: &Path, outcome: WriteOutcome) -> Self {
        Self {
            path: path.to_path_buf(),
            outcome: format!("{:?}", outcome).to_lowercase(),
        }
    }
}

/// Everything a run did, for the final output
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub os: Option<String>,
    pub files: Vec<FileChange>,
    /// Contents a dry run would have written
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previews: Vec<Preview>,
    pub backup_dir: Option<PathBuf>,
    pub congestion: Option<CongestionOutcome>,
    pub tuning_applied: bool,
    pub dns: Option<DnsOutcome>,
    pub report: Option<Report>,
    pub warnings: Warnings,
}

impl RunSummary {
    pub fn record(&mut self, path: &Path, outcome: WriteOutcome) {
        self.files.push(FileChange::new(path, outcome));
    }

    /// The final status line
    pub fn status_line(&self) -> String {
        let mode = if self.dry_run { " (dry run, nothing written)" } else { "" };
        format!(
            "nettune: completed{} with {} warning(s)",
            mode,
            self.warnings.len()
        )
    }
}
