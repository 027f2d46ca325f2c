// src/transaction/journal.rs

//! The filesystem journal
//!
//! Per-transaction, in-memory record of every filesystem mutation the
//! executor performs: files moved into the target root (in creation order)
//! and files displaced into the workspace backup directory. These two lists
//! are the only authority rollback consults.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Journal of one transaction's filesystem mutations
#[derive(Debug, Default)]
pub struct FsJournal {
    /// Absolute paths moved into the target root, in creation order
    new_files_committed: Vec<PathBuf>,
    /// (original absolute path, backup path) for every displaced file
    backed_up_files: Vec<(PathBuf, PathBuf)>,
}

impl FsJournal {
    /// Record a file newly moved into the target root
    pub fn record_install(&mut self, dest: &Path) {
        self.new_files_committed.push(dest.to_path_buf());
    }

    /// Record a file moved out of the target root into the backup area
    pub fn record_backup(&mut self, original: &Path, backup: &Path) {
        self.backed_up_files
            .push((original.to_path_buf(), backup.to_path_buf()));
    }

    pub fn installed_count(&self) -> usize {
        self.new_files_committed.len()
    }

    pub fn backup_count(&self) -> usize {
        self.backed_up_files.len()
    }

    /// Undo everything: unlink the newly committed files in reverse order,
    /// then move every backed-up file back into place. Best-effort; an
    /// individual restore failure is logged and the rest continues, since a
    /// partial restore is still strictly better than none.
    pub fn rollback(&self) {
        debug!(
            "rolling back {} installs and restoring {} backups",
            self.new_files_committed.len(),
            self.backed_up_files.len()
        );

        for path in self.new_files_committed.iter().rev() {
            if let Err(e) = fs::remove_file(path) {
                if path.symlink_metadata().is_ok() {
                    error!("rollback: cannot remove {}: {e}", path.display());
                }
            }
        }

        for (original, backup) in &self.backed_up_files {
            if backup.symlink_metadata().is_err() {
                continue;
            }
            if let Some(parent) = original.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Err(e) = fs::rename(backup, original) {
                error!(
                    "rollback: cannot restore {} from {}: {e}",
                    original.display(),
                    backup.display()
                );
            }
        }
    }
}
