//! Per-run backup sets
//!
//! Before any persisted file is replaced, its current contents are copied
//! into a timestamped directory under the backup root. The copy keeps the
//! original absolute path below the set directory, so reverting is a plain
//! copy back.

use crate::error::{TuneError, TuneResult};
use chrono::Local;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Prefix of every backup set directory name
pub const BACKUP_PREFIX: &str = "nettune-backup-";

pub struct BackupManager {
    root: PathBuf,
    dir: Option<PathBuf>,
    /// original path -> copy inside the set
    saved: HashMap<PathBuf, PathBuf>,
}

impl BackupManager {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            dir: None,
            saved: HashMap::new(),
        }
    }

    /// Backup set directory, if one was created in this run
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Create the backup set on first call; later calls reuse it
    pub async fn ensure_backup(&mut self) -> TuneResult<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| write_error(&self.root, e))?;

        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let mut attempt = 0u32;
        let dir = loop {
            let name = if attempt == 0 {
                format!("{}{}", BACKUP_PREFIX, stamp)
            } else {
                format!("{}{}-{}", BACKUP_PREFIX, stamp, attempt)
            };
            let candidate = self.root.join(name);

            // create_dir (not create_dir_all) so an existing set is never reused
            match fs::create_dir(&candidate).await {
                Ok(()) => break candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(write_error(&candidate, e)),
            }
        };

        info!("Backup directory: {}", dir.display());
        self.dir = Some(dir.clone());
        Ok(dir)
    }

    /// Copy `path` into the backup set if it exists
    ///
    /// Returns the location of the copy, or `None` when the source does not
    /// exist. Each original is copied at most once per run.
    pub async fn backup_file(&mut self, path: &Path) -> TuneResult<Option<PathBuf>> {
        if let Some(copy) = self.saved.get(path) {
            return Ok(Some(copy.clone()));
        }

        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(TuneError::InvalidParameter(format!(
                    "Refusing to back up non-regular file {}",
                    path.display()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No existing {}, nothing to back up", path.display());
                return Ok(None);
            }
            Err(e) => return Err(TuneError::Io(e)),
        }

        let dir = self.ensure_backup().await?;
        let target = dir.join(path.strip_prefix("/").unwrap_or(path));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(parent, e))?;
        }

        fs::copy(path, &target)
            .await
            .map_err(|e| write_error(&target, e))?;

        debug!("Backed up {} -> {}", path.display(), target.display());
        self.saved.insert(path.to_path_buf(), target.clone());
        Ok(Some(target))
    }
}

fn write_error(path: &Path, source: std::io::Error) -> TuneError {
    TuneError::Write {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("backups");
        let mut backups = BackupManager::new(root.clone());

        let result = backups.backup_file(&tmp.path().join("absent.conf")).await.unwrap();

        assert!(result.is_none());
        assert!(backups.dir().is_none());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_ensure_backup_is_reused() {
        let tmp = TempDir::new().unwrap();
        let mut backups = BackupManager::new(tmp.path().to_path_buf());

        let first = backups.ensure_backup().await.unwrap();
        let second = backups.ensure_backup().await.unwrap();

        assert_eq!(first, second);
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(BACKUP_PREFIX));
    }

    #[tokio::test]
    async fn test_same_second_runs_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let mut run1 = BackupManager::new(tmp.path().to_path_buf());
        let mut run2 = BackupManager::new(tmp.path().to_path_buf());

        let a = run1.ensure_backup().await.unwrap();
        let b = run2.ensure_backup().await.unwrap();

        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_backup_mirrors_path_and_keeps_first_copy() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("etc/sysctl.d/60-test.conf");
        std::fs::create_dir_all(original.parent().unwrap()).unwrap();
        std::fs::write(&original, "net.core.somaxconn = 128\n").unwrap();

        let mut backups = BackupManager::new(tmp.path().join("root"));
        let copy = backups.backup_file(&original).await.unwrap().unwrap();

        assert!(copy.starts_with(backups.dir().unwrap()));
        assert!(copy.ends_with("etc/sysctl.d/60-test.conf"));
        assert_eq!(std::fs::read_to_string(&copy).unwrap(), "net.core.somaxconn = 128\n");

        // Changing the original must not refresh the copy within the same run
        std::fs::write(&original, "net.core.somaxconn = 8192\n").unwrap();
        let again = backups.backup_file(&original).await.unwrap().unwrap();
        assert_eq!(again, copy);
        assert_eq!(std::fs::read_to_string(&copy).unwrap(), "net.core.somaxconn = 128\n");

        // Original untouched by the backup itself
        assert_eq!(std::fs::read_to_string(&original).unwrap(), "net.core.somaxconn = 8192\n");
    }
}
