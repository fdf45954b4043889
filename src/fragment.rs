//! Declarative configuration fragments and the idempotent file writer

use crate::backup::BackupManager;
use crate::error::{TuneError, TuneResult};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// World-readable, owner-writable
pub const FRAGMENT_MODE: u32 = 0o644;

/// How a fragment is rendered on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentStyle {
    /// sysctl.d: `# section` header, `key = value`
    Sysctl,
    /// systemd drop-in: `[section]` header, `key=value`
    Ini,
    /// modules-load.d: `# section` header, one key per line
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Option<String>,
}

/// A configuration file owned by nettune
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFragment {
    pub path: PathBuf,
    pub section: String,
    pub entries: Vec<Entry>,
    pub mode: u32,
    pub style: FragmentStyle,
}

impl ConfigFragment {
    pub fn new(path: &Path, section: &str, style: FragmentStyle) -> Self {
        Self {
            path: path.to_path_buf(),
            section: section.to_string(),
            entries: Vec::new(),
            mode: FRAGMENT_MODE,
            style,
        }
    }

    /// Append a `key = value` entry
    pub fn set(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.entries.push(Entry {
            key: key.to_string(),
            value: Some(value.to_string()),
        });
        self
    }

    /// Append a bare list item
    pub fn item(mut self, key: &str) -> Self {
        self.entries.push(Entry {
            key: key.to_string(),
            value: None,
        });
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.value.as_deref())
    }

    /// File contents, deterministic and newline-terminated
    pub fn render(&self) -> String {
        let mut out = String::new();
        match self.style {
            FragmentStyle::Ini => out.push_str(&format!("[{}]\n", self.section)),
            FragmentStyle::Sysctl | FragmentStyle::List => {
                out.push_str(&format!("# {} (managed by nettune)\n", self.section))
            }
        }

        for entry in &self.entries {
            match (&self.style, &entry.value) {
                (FragmentStyle::Sysctl, Some(value)) => {
                    out.push_str(&format!("{} = {}\n", entry.key, value))
                }
                (FragmentStyle::Ini, Some(value)) => {
                    out.push_str(&format!("{}={}\n", entry.key, value))
                }
                _ => {
                    out.push_str(&entry.key);
                    out.push('\n');
                }
            }
        }

        out
    }
}

/// What a write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
    DryRun,
}

/// Exactly one trailing newline
pub fn normalize_content(content: &str) -> String {
    let mut out = content.trim_end_matches(['\n', '\r']).to_string();
    out.push('\n');
    out
}

/// Content a dry run would have written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub path: PathBuf,
    pub mode: u32,
    pub content: String,
}

/// Writes persisted files, backing up what they replace
///
/// All writes go through one lock so writes within a process never interleave.
/// In dry-run mode nothing is touched; the would-be contents are kept as
/// [`Preview`]s for the caller to present.
pub struct FileWriter {
    backups: Mutex<BackupManager>,
    previews: Mutex<Vec<Preview>>,
    dry_run: bool,
}

impl FileWriter {
    pub fn new(backups: BackupManager, dry_run: bool) -> Self {
        Self {
            backups: Mutex::new(backups),
            previews: Mutex::new(Vec::new()),
            dry_run,
        }
    }

    /// Drain the dry-run previews collected so far, in write order
    pub async fn take_previews(&self) -> Vec<Preview> {
        std::mem::take(&mut *self.previews.lock().await)
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Backup set created during this run, if any
    pub async fn backup_dir(&self) -> Option<PathBuf> {
        self.backups.lock().await.dir().map(Path::to_path_buf)
    }

    pub async fn write_fragment(&self, fragment: &ConfigFragment) -> TuneResult<WriteOutcome> {
        self.write_file_with_mode(&fragment.path, &fragment.render(), fragment.mode)
            .await
    }

    pub async fn write_file(&self, path: &Path, content: &str) -> TuneResult<WriteOutcome> {
        self.write_file_with_mode(path, content, FRAGMENT_MODE).await
    }

    async fn write_file_with_mode(&self, path: &Path, content: &str, mode: u32) -> TuneResult<WriteOutcome> {
        let content = normalize_content(content);

        if self.dry_run {
            info!("Would write {} (mode {:o})", path.display(), mode);
            self.previews.lock().await.push(Preview {
                path: path.to_path_buf(),
                mode,
                content,
            });
            return Ok(WriteOutcome::DryRun);
        }

        let mut backups = self.backups.lock().await;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(parent, e))?;
        }

        backups.backup_file(path).await?;

        let existing = match fs::read_to_string(path).await {
            Ok(existing) => Some(existing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(write_error(path, e)),
        };

        if existing.as_deref() == Some(content.as_str()) {
            set_mode(path, mode).await?;
            debug!("{} already up to date", path.display());
            return Ok(WriteOutcome::Unchanged);
        }

        replace_atomically(path, &content, mode).await?;

        let outcome = if existing.is_some() {
            WriteOutcome::Updated
        } else {
            WriteOutcome::Created
        };
        info!("Wrote {} ({:?})", path.display(), outcome);
        Ok(outcome)
    }
}

/// Write a temporary sibling, sync it, then rename over the target
async fn replace_atomically(path: &Path, content: &str, mode: u32) -> TuneResult<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| TuneError::InvalidParameter(format!("Not a file path: {}", path.display())))?;
    let temp_path = path.with_file_name(format!(".{}.nettune-tmp", file_name.to_string_lossy()));

    // A stale temp file from an interrupted run may exist
    let _ = fs::remove_file(&temp_path).await;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .custom_flags(libc::O_NOFOLLOW)
        .open(&temp_path)
        .await
        .map_err(|e| write_error(&temp_path, e))?;

    file.write_all(content.as_bytes())
        .await
        .map_err(|e| write_error(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| write_error(&temp_path, e))?;
    drop(file);

    // umask may have narrowed the create mode
    set_mode(&temp_path, mode).await?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| write_error(path, e))
}

async fn set_mode(path: &Path, mode: u32) -> TuneResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| write_error(path, e))
}

fn write_error(path: &Path, source: std::io::Error) -> TuneError {
    TuneError::Write {
        path: path.to_path_buf(),
        source,
    }
}
