//! On-disk backups for in-flight edits.
//!
//! Every file an attempt touches is copied to a sibling `<name>.old` before
//! any of them is modified, and the set is recorded in a manifest. The
//! manifest is the commit point in both directions:
//!
//! - `begin` writes all backups, then the manifest.
//! - `commit` removes the manifest, then the backups.
//! - `rollback` checks every backup, copies all of them back, removes the
//!   manifest, then the backups.
//!
//! A crash at any step leaves either no manifest (live files are the truth)
//! or a manifest whose backups are all present, so a rollback restores every
//! file or none of them.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::WorkspaceError;

pub const BACKUP_SUFFIX: &str = "old";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalEntry {
    live: PathBuf,
    backup: PathBuf,
    sha256: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    entries: Vec<JournalEntry>,
}

/// Backup set for at most one pending edit.
#[derive(Debug, Clone)]
pub struct Journal {
    manifest_path: PathBuf,
}

impl Journal {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self { manifest_path: manifest_path.into() }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// `src/main.rs` -> `src/main.rs.old`.
    pub fn backup_path(live: &Path) -> PathBuf {
        let mut name = live.file_name().map(OsString::from).unwrap_or_default();
        name.push(".");
        name.push(BACKUP_SUFFIX);
        live.with_file_name(name)
    }

    pub fn is_pending(&self) -> bool {
        self.manifest_path.is_file()
    }

    /// Live paths covered by the pending edit, if any.
    pub fn pending(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let Some(manifest) = self.read_manifest()? else {
            return Ok(Vec::new());
        };
        Ok(manifest.entries.into_iter().map(|e| e.live).collect())
    }

    /// Back up `paths` ahead of an edit. Fails if an edit is already pending.
    pub fn begin(&self, paths: &[&Path]) -> Result<(), WorkspaceError> {
        if self.is_pending() {
            return Err(WorkspaceError::PendingBackup(self.manifest_path.clone()));
        }

        let mut manifest = Manifest::default();
        for live in paths {
            if manifest.entries.iter().any(|e| e.live == *live) {
                continue;
            }
            let bytes = fs::read(live).map_err(|e| WorkspaceError::io(live, e))?;
            let backup = Self::backup_path(live);
            if backup.exists() {
                warn!(path = %backup.display(), "overwriting stale backup with no journal entry");
            }
            fs::write(&backup, &bytes).map_err(|e| WorkspaceError::io(&backup, e))?;
            manifest.entries.push(JournalEntry {
                live: live.to_path_buf(),
                backup,
                sha256: digest(&bytes),
            });
        }

        if let Some(parent) = self.manifest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
        }
        // The manifest is the commit point: it appears whole or not at all.
        let json = serde_json::to_string_pretty(&manifest)?;
        let tmp = self.manifest_path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| WorkspaceError::io(&tmp, e))?;
        fs::rename(&tmp, &self.manifest_path)
            .map_err(|e| WorkspaceError::io(&self.manifest_path, e))?;
        debug!(files = manifest.entries.len(), "journal opened");
        Ok(())
    }

    /// Keep the edit: drop the manifest and the backups.
    pub fn commit(&self) -> Result<(), WorkspaceError> {
        let Some(manifest) = self.read_manifest()? else {
            return Ok(());
        };
        fs::remove_file(&self.manifest_path)
            .map_err(|e| WorkspaceError::io(&self.manifest_path, e))?;
        remove_backups(&manifest);
        debug!(files = manifest.entries.len(), "journal committed");
        Ok(())
    }

    /// Undo the pending edit. Returns how many files were restored; a missing
    /// journal is a no-op.
    pub fn rollback(&self) -> Result<usize, WorkspaceError> {
        let Some(manifest) = self.read_manifest()? else {
            return Ok(0);
        };

        // Verify everything before touching any live file.
        let mut contents = Vec::with_capacity(manifest.entries.len());
        for entry in &manifest.entries {
            let bytes = fs::read(&entry.backup).map_err(|e| WorkspaceError::io(&entry.backup, e))?;
            if digest(&bytes) != entry.sha256 {
                return Err(WorkspaceError::CorruptBackup(entry.backup.clone()));
            }
            contents.push(bytes);
        }

        for (entry, bytes) in manifest.entries.iter().zip(&contents) {
            fs::write(&entry.live, bytes).map_err(|e| WorkspaceError::io(&entry.live, e))?;
        }
        fs::remove_file(&self.manifest_path)
            .map_err(|e| WorkspaceError::io(&self.manifest_path, e))?;
        remove_backups(&manifest);
        debug!(files = manifest.entries.len(), "journal rolled back");
        Ok(manifest.entries.len())
    }

    fn read_manifest(&self) -> Result<Option<Manifest>, WorkspaceError> {
        if !self.is_pending() {
            return Ok(None);
        }
        let body = fs::read_to_string(&self.manifest_path)
            .map_err(|e| WorkspaceError::io(&self.manifest_path, e))?;
        Ok(Some(serde_json::from_str(&body)?))
    }
}

fn remove_backups(manifest: &Manifest) {
    for entry in &manifest.entries {
        if let Err(e) = fs::remove_file(&entry.backup) {
            warn!(path = %entry.backup.display(), error = %e, "failed to remove backup");
        }
    }
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_is_written_through_a_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let live = dir.path().join("main.rs");
        fs::write(&live, "fn main() {}\n").expect("write");
        let journal = Journal::new(dir.path().join(".transplant/journal.json"));

        journal.begin(&[live.as_path()]).expect("begin");
        assert!(journal.is_pending());
        assert!(!dir.path().join(".transplant/journal.json.tmp").exists());
        assert_eq!(journal.pending().expect("pending"), vec![live.clone()]);

        fs::write(&live, "changed").expect("edit");
        assert_eq!(journal.rollback().expect("rollback"), 1);
        assert_eq!(fs::read_to_string(&live).expect("read"), "fn main() {}\n");
    }

    #[test]
    fn stray_temp_manifest_is_not_a_pending_edit() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join(".transplant")).expect("mkdir");
        fs::write(dir.path().join(".transplant/journal.json.tmp"), "{\"entr").expect("torn");
        let journal = Journal::new(dir.path().join(".transplant/journal.json"));

        assert!(!journal.is_pending());
        assert_eq!(journal.rollback().expect("rollback"), 0);
    }
}
