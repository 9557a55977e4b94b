//! Backup/restore of the metadata store, grounded in `calm/cli/backup.py`.
//! Per spec §9's open question, this covers only the metadata store — the
//! vector index is treated purely as a derived artifact that
//! `reindex_from_metadata` can always rebuild, so restoring metadata alone
//! is sufficient to recover a consistent (if momentarily stale-indexed)
//! state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::time::{now, to_iso8601};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub name: String,
    pub created_at: String,
    pub size_bytes: u64,
}

pub struct BackupManager {
    db_path: PathBuf,
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(db_path: impl Into<PathBuf>, home: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.into(),
            backup_dir: home.as_ref().join("backups"),
        }
    }

    fn backup_path(&self, name: &str) -> PathBuf {
        self.backup_dir.join(format!("{name}.db"))
    }

    /// Copies the SQLite file (and its WAL/SHM siblings, if present) to
    /// `{home}/backups/{name}.db`.
    pub fn create(&self, name: Option<&str>) -> Result<BackupEntry, Error> {
        fs::create_dir_all(&self.backup_dir)?;
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("backup_{}", to_iso8601(&now()).replace([':', '.'], "-")));
        let target = self.backup_path(&name);
        fs::copy(&self.db_path, &target)?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = PathBuf::from(format!("{}{suffix}", self.db_path.display()));
            if sidecar.exists() {
                let target_sidecar = PathBuf::from(format!("{}{suffix}", target.display()));
                fs::copy(&sidecar, &target_sidecar)?;
            }
        }
        let size_bytes = fs::metadata(&target)?.len();
        Ok(BackupEntry {
            name,
            created_at: to_iso8601(&now()),
            size_bytes,
        })
    }

    pub fn list(&self) -> Result<Vec<BackupEntry>, Error> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("db") {
                continue;
            }
            let metadata = entry.metadata()?;
            let created_at = metadata
                .modified()
                .ok()
                .map(|t| to_iso8601(&chrono::DateTime::<chrono::Utc>::from(t)))
                .unwrap_or_default();
            entries.push(BackupEntry {
                name: path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string(),
                created_at,
                size_bytes: metadata.len(),
            });
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// Replaces the live database file with the named backup.
    pub fn restore(&self, name: &str) -> Result<(), Error> {
        let source = self.backup_path(name);
        if !source.exists() {
            return Err(Error::NotFound(format!("backup '{name}' not found")));
        }
        fs::copy(&source, &self.db_path)?;
        Ok(())
    }

    /// Rotates backups, keeping only the newest `max_backups`.
    pub fn auto(&self, max_backups: usize) -> Result<BackupEntry, Error> {
        let created = self.create(None)?;
        let mut existing = self.list()?;
        if existing.len() > max_backups {
            existing.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            let overflow = existing.len() - max_backups;
            for entry in existing.into_iter().take(overflow) {
                let _ = fs::remove_file(self.backup_path(&entry.name));
            }
        }
        Ok(created)
    }

    pub fn delete(&self, name: &str) -> Result<(), Error> {
        let path = self.backup_path(name);
        if !path.exists() {
            return Err(Error::NotFound(format!("backup '{name}' not found")));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_restore_on_unmodified_db_is_byte_identical() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("metadata.db");
        fs::write(&db_path, b"original contents").unwrap();
        let manager = BackupManager::new(&db_path, dir.path());
        let backup = manager.create(Some("snap1")).unwrap();

        fs::write(&db_path, b"mutated contents").unwrap();
        manager.restore(&backup.name).unwrap();

        assert_eq!(fs::read(&db_path).unwrap(), b"original contents");
    }

    #[test]
    fn auto_rotation_keeps_only_the_newest_n_backups() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("metadata.db");
        fs::write(&db_path, b"contents").unwrap();
        let manager = BackupManager::new(&db_path, dir.path());
        for i in 0..5 {
            manager.create(Some(&format!("b{i}"))).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        manager.auto(3).unwrap();
        assert!(manager.list().unwrap().len() <= 4); // 3 kept + the just-created auto backup
    }

    #[test]
    fn restore_of_missing_backup_is_not_found() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("metadata.db");
        fs::write(&db_path, b"contents").unwrap();
        let manager = BackupManager::new(&db_path, dir.path());
        let err = manager.restore("nope").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
