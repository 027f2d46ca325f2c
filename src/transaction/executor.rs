// src/transaction/executor.rs

//! Asset preparation and transaction execution
//!
//! `prepare_assets` downloads and verifies every artifact a plan needs.
//! `execute` drives the state machine: backups first (the undo log), then
//! pre-remove hooks, then per-package stage/hook/commit, then the single
//! atomic database commit, then best-effort post hooks. Any failure before
//! the database commit completes funnels through one rollback path that
//! restores the filesystem bit-for-bit.

use super::journal::FsJournal;
use super::{TransactionEngine, TransactionPlan, TransactionState};
use crate::archive;
use crate::crypto;
use crate::error::{Error, Result};
use crate::fetch::DownloadJob;
use crate::filesystem::path::safe_join;
use crate::filesystem::{self, move_file_atomic};
use crate::package::InstalledPackage;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl TransactionEngine {
    /// Download and verify every artifact the plan's install list needs.
    ///
    /// Mirror lists come from the originating repository's configuration.
    /// Before downloading, the aggregate announced size (HEAD) is checked
    /// against free space in the cache, and the installed-size delta
    /// against free space in the target root; an unknown aggregate skips
    /// the cache check. After downloading, each artifact's SHA-256 must
    /// match the repository-declared checksum; a mismatched artifact is
    /// deleted.
    pub fn prepare_assets(&self, plan: &TransactionPlan) -> Result<()> {
        if plan.to_install.is_empty() {
            return Ok(());
        }

        info!("downloading transaction assets");

        let mut jobs = Vec::with_capacity(plan.to_install.len());
        for item in &plan.to_install {
            let pkg = &item.package;
            let mirrors = self.repos.mirror_urls(&pkg.repo_name).ok_or_else(|| {
                Error::ResolutionFailed(format!(
                    "unknown repository '{}' for package '{}'",
                    pkg.repo_name, pkg.name
                ))
            })?;

            let urls = mirrors
                .iter()
                .map(|base| format!("{}/{}", base.trim_end_matches('/'), pkg.artifact_name()))
                .collect();
            jobs.push(DownloadJob::new(
                urls,
                item.artifact_path.clone(),
                format!("{}-{}", pkg.name, pkg.version),
            ));
        }

        self.check_free_space(plan, &jobs)?;

        self.fetcher.download_all(&jobs)?;
        info!("all assets downloaded successfully");

        if self.config().skip_crypto {
            warn!("skipping all package integrity checks as requested");
            return Ok(());
        }

        info!("verifying package integrity");
        for item in &plan.to_install {
            if let Err(e) = crypto::verify_file_checksum(
                &item.artifact_path,
                &item.package.checksum,
                &item.package.name,
            ) {
                let _ = fs::remove_file(&item.artifact_path);
                return Err(e);
            }
        }

        Ok(())
    }

    /// Free-space pre-flight for the cache (download size) and the target
    /// root (installed-size delta)
    fn check_free_space(&self, plan: &TransactionPlan, jobs: &[DownloadJob]) -> Result<()> {
        let download_size = self.fetcher.total_download_size(jobs);
        if download_size >= 0 {
            let cache_dir = self.config().cache_dir();
            let available = filesystem::available_space(&cache_dir)?;
            if download_size as u64 > available {
                return Err(Error::NotEnoughSpace {
                    path: cache_dir.display().to_string(),
                    required: download_size as u64,
                    available,
                });
            }
        } else {
            debug!("aggregate download size unknown, skipping cache space pre-check");
        }

        let new_size: i64 = plan
            .to_install
            .iter()
            .map(|i| i.package.installed_size)
            .sum();
        let removed_size: i64 = plan
            .to_remove
            .iter()
            .map(|p| p.package.installed_size)
            .sum();
        let delta = new_size - removed_size;

        if delta > 0 {
            let available = filesystem::available_space(&self.config().root)?;
            if delta as u64 > available {
                return Err(Error::NotEnoughSpace {
                    path: self.config().root.display().to_string(),
                    required: delta as u64,
                    available,
                });
            }
        }

        Ok(())
    }

    /// Execute a prepared plan atomically.
    ///
    /// On success the workspace is deleted and the store reflects the plan.
    /// On any failure before the database commit completes, the journal is
    /// rolled back and the system is restored to its pre-transaction state.
    pub fn execute(&mut self, plan: &TransactionPlan) -> Result<()> {
        if plan.is_empty() {
            return Ok(());
        }

        let _lock = self.acquire_lock()?;
        self.recover_abandoned_workspaces()?;

        let tx_id = Uuid::new_v4().to_string();
        let workspace = self.config().tx_dir().join(&tx_id);
        let backup_dir = workspace.join("backup");
        let staging_root = workspace.join("staging");
        fs::create_dir_all(&backup_dir)?;
        fs::create_dir_all(&staging_root)?;

        info!("executing transaction {tx_id}");
        let mut journal = FsJournal::default();

        match self.run_phases(plan, &backup_dir, &staging_root, &mut journal) {
            Ok(completed) => {
                enter(TransactionState::PostHooks);
                self.run_post_hooks(&completed, plan, &backup_dir);

                fs::remove_dir_all(&workspace)?;
                enter(TransactionState::Done);
                info!("transaction {tx_id} completed successfully");
                Ok(())
            }
            Err(e) => {
                error!("transaction {tx_id} failed: {e}; rolling back filesystem changes");
                enter(TransactionState::Rollback);
                journal.rollback();
                let _ = fs::remove_dir_all(&workspace);
                enter(TransactionState::Failed);
                info!("rollback complete, system restored to its original state");
                Err(e)
            }
        }
    }

    /// The BACKUP..COMMIT_DB region as a linear chain of early returns;
    /// `execute` runs the rollback whenever this returns an error.
    fn run_phases(
        &mut self,
        plan: &TransactionPlan,
        backup_dir: &Path,
        staging_root: &Path,
        journal: &mut FsJournal,
    ) -> Result<Vec<InstalledPackage>> {
        let root = self.config().root.clone();

        // BACKUP: move every file owned by a to-remove package out of the
        // live tree into backup/, preserving relative paths. Same-filesystem
        // moves are atomic renames; this also is the removal itself.
        enter(TransactionState::Backup);
        for pkg in &plan.to_remove {
            for file in &pkg.owned_files {
                let source = safe_join(&root, file)?;
                if source.symlink_metadata().is_err() {
                    continue;
                }
                let backup_path = safe_join(backup_dir, file)?;
                if let Some(parent) = backup_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                move_file_atomic(&source, &backup_path)?;
                journal.record_backup(&source, &backup_path);
            }
        }
        debug!("backed up {} files", journal.backup_count());

        // PRE_REMOVE: hooks run from their backup copy; the live tree no
        // longer has them
        enter(TransactionState::PreRemove);
        for pkg in &plan.to_remove {
            let Some(script) = &pkg.package.pre_remove else {
                continue;
            };
            let script_path = safe_join(backup_dir, script)?;
            if !script_path.is_file() {
                continue;
            }
            info!("running pre-remove hook for {}", pkg.name());
            self.sandbox.run_file(&script_path, &root)?;
        }

        // STAGE + PRE_INSTALL + COMMIT_FS, per package in install order
        let mut completed: Vec<InstalledPackage> = Vec::with_capacity(plan.to_install.len());
        for item in &plan.to_install {
            let pkg = &item.package;

            enter(TransactionState::Stage);
            let staging = staging_root.join(&pkg.name);
            if staging.exists() {
                fs::remove_dir_all(&staging)?;
            }
            fs::create_dir_all(&staging)?;
            let files = archive::extract(&item.artifact_path, &staging)?;

            if let Some(script) = &pkg.pre_install {
                enter(TransactionState::PreInstall);
                let script_path = safe_join(&staging, script)?;
                info!("running pre-install hook for {}", pkg.name);
                self.sandbox.run_file(&script_path, &root)?;
            }

            enter(TransactionState::CommitFs);
            for file in &files {
                let dest = safe_join(&root, file)?;
                // Second-chance conflict check right before the rename
                if dest.symlink_metadata().is_ok() {
                    return Err(Error::FileConflict(format!(
                        "file appeared during execution: {}",
                        dest.display()
                    )));
                }
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                move_file_atomic(&staging.join(file), &dest)?;
                journal.record_install(&dest);
            }
            fs::remove_dir_all(&staging)?;

            completed.push(InstalledPackage {
                package: pkg.clone(),
                install_date: chrono::Local::now().format("%Y-%m-%d").to_string(),
                owned_files: files,
            });
            info!("installed {} {}", pkg.name, pkg.version);
        }

        // COMMIT_DB: the single store write of the whole transaction
        enter(TransactionState::CommitDb);
        let names_to_remove: Vec<String> = plan
            .to_remove
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        self.store.atomic_update(&completed, &names_to_remove)?;
        debug!(
            "database commit: {} added, {} removed",
            completed.len(),
            names_to_remove.len()
        );

        Ok(completed)
    }

    /// POST_HOOKS: the system state is already committed, so a failing hook
    /// is logged as a warning and never rolls anything back.
    fn run_post_hooks(
        &self,
        completed: &[InstalledPackage],
        plan: &TransactionPlan,
        backup_dir: &Path,
    ) {
        let root = &self.config().root;

        for pkg in completed {
            let Some(script) = &pkg.package.post_install else {
                continue;
            };
            let script_path = match safe_join(root, script) {
                Ok(p) => p,
                Err(e) => {
                    warn!("post-install hook for {} skipped: {e}", pkg.name());
                    continue;
                }
            };
            if !script_path.is_file() {
                continue;
            }
            if let Err(e) = self.sandbox.run_file(&script_path, root) {
                warn!("post-install hook for {} failed: {e}", pkg.name());
            }
        }

        // Post-remove scripts live in the backup tree by now
        for pkg in &plan.to_remove {
            let Some(script) = &pkg.package.post_remove else {
                continue;
            };
            let script_path = match safe_join(backup_dir, script) {
                Ok(p) => p,
                Err(e) => {
                    warn!("post-remove hook for {} skipped: {e}", pkg.name());
                    continue;
                }
            };
            if !script_path.is_file() {
                continue;
            }
            if let Err(e) = self.sandbox.run_file(&script_path, root) {
                warn!("post-remove hook for {} failed: {e}", pkg.name());
            }
        }
    }
}

/// Log a state-machine transition
fn enter(state: TransactionState) {
    debug!("transaction state: {state:?}");
}
