// src/transaction/mod.rs

//! The transaction engine
//!
//! Takes a user intent ("install these", "remove these", "upgrade the
//! system") and drives it through planning, asset preparation, and atomic
//! execution with rollback, keeping three sources of truth consistent: the
//! on-disk filesystem, the installed-state database, and the artifact
//! cache.
//!
//! # Transaction lifecycle
//!
//! ```text
//! IDLE -> BACKUP -> PRE_REMOVE -> STAGE -> PRE_INSTALL -> COMMIT_FS -> COMMIT_DB -> POST_HOOKS -> DONE
//!                                                                          ^
//!                                                            point of no return
//! ```
//!
//! Any failure between BACKUP and the completion of COMMIT_DB transitions to
//! ROLLBACK -> FAILED and leaves the system bit-identical to its
//! pre-transaction state. Post-hook failures after COMMIT_DB are logged and
//! do not fail the transaction.

mod executor;
mod journal;
mod planner;

pub use journal::FsJournal;

use crate::archive;
use crate::crypto;
use crate::db::Store;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::filesystem::move_file_atomic;
use crate::index;
use crate::package::{InstalledPackage, Package};
use crate::repos::RepositoryManager;
use crate::script::ScriptSandbox;
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Engine configuration: the process-wide inputs, captured at construction
/// and immutable for the engine's lifetime. All state paths derive from the
/// target root.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory treated as `/` for all operations (normally `/`)
    pub root: PathBuf,
    /// Directory of trusted OpenPGP public keys
    pub key_dir: PathBuf,
    /// Bypass signature and checksum verification (with visible warnings)
    pub skip_crypto: bool,
}

impl EngineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            key_dir: PathBuf::from(crate::DEFAULT_KEY_DIR),
            skip_crypto: false,
        }
    }

    pub fn with_key_dir(mut self, key_dir: impl Into<PathBuf>) -> Self {
        self.key_dir = key_dir.into();
        self
    }

    pub fn with_skip_crypto(mut self, skip: bool) -> Self {
        self.skip_crypto = skip;
        self
    }

    /// `<root>/var/lib/aurora`
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("var/lib").join(crate::APP_NAME)
    }

    /// `<root>/var/lib/aurora/aurora.db`
    pub fn db_path(&self) -> PathBuf {
        self.state_dir().join(format!("{}.db", crate::APP_NAME))
    }

    /// `<root>/var/cache/aurora/pkg`
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("var/cache").join(crate::APP_NAME).join("pkg")
    }

    /// `<root>/var/cache/aurora/pkg/tx`
    pub fn tx_dir(&self) -> PathBuf {
        self.cache_dir().join("tx")
    }

    /// `<root>/etc/aurora/repos.conf`
    pub fn repos_conf(&self) -> PathBuf {
        self.root.join("etc").join(crate::APP_NAME).join("repos.conf")
    }

    /// `<root>/var/lib/aurora/lock`
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("lock")
    }
}

/// Execution state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Backup,
    PreRemove,
    Stage,
    PreInstall,
    CommitFs,
    CommitDb,
    PostHooks,
    Done,
    Rollback,
    Failed,
}

impl TransactionState {
    /// True for states before the database commit; a failure here rolls back
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Idle
                | Self::Backup
                | Self::PreRemove
                | Self::Stage
                | Self::PreInstall
                | Self::CommitFs
        )
    }
}

/// One package scheduled for installation, paired with the cache location
/// its artifact is (or will be) downloaded to
#[derive(Debug, Clone)]
pub struct PendingInstall {
    pub package: Package,
    pub artifact_path: PathBuf,
}

/// The complete plan of action for one system change.
///
/// `to_install` is topologically ordered: a dependency appears strictly
/// before its dependents.
#[derive(Debug, Clone, Default)]
pub struct TransactionPlan {
    pub to_install: Vec<PendingInstall>,
    pub to_remove: Vec<InstalledPackage>,
}

impl TransactionPlan {
    pub fn is_empty(&self) -> bool {
        self.to_install.is_empty() && self.to_remove.is_empty()
    }
}

/// Advisory transaction lock; released when dropped
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// The transaction engine
pub struct TransactionEngine {
    config: EngineConfig,
    store: Store,
    repos: RepositoryManager,
    fetcher: Fetcher,
    sandbox: ScriptSandbox,
}

impl TransactionEngine {
    /// Construct an engine for the given target root, creating the state
    /// and cache directories and opening the installed-state store.
    pub fn new(config: EngineConfig) -> Result<Self> {
        fs::create_dir_all(config.state_dir())?;
        fs::create_dir_all(config.cache_dir())?;

        let store = Store::open(&config.db_path())?;
        let repos = RepositoryManager::load(&config.repos_conf());
        let fetcher = Fetcher::new()?;
        let sandbox = ScriptSandbox::new()?;

        Ok(Self {
            config,
            store,
            repos,
            fetcher,
            sandbox,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Synchronize all configured repositories into the store
    pub fn sync(&mut self) -> Result<()> {
        self.repos.sync(
            &mut self.store,
            &self.fetcher,
            &self.config.key_dir,
            self.config.skip_crypto,
        )
    }

    /// Plan and execute an installation
    pub fn install(&mut self, names: &[String], force: bool) -> Result<()> {
        let plan = self.plan_install(names, force)?;
        if plan.is_empty() {
            info!("nothing to do: all requested packages are already installed");
            return Ok(());
        }
        self.prepare_assets(&plan)?;
        self.execute(&plan)
    }

    /// Plan and execute a removal
    pub fn remove(&mut self, names: &[String], force: bool) -> Result<()> {
        let plan = self.plan_remove(names, force)?;
        if plan.is_empty() {
            info!("nothing to do");
            return Ok(());
        }
        self.execute(&plan)
    }

    /// Sync, plan, and execute a full system upgrade
    pub fn update(&mut self, force: bool) -> Result<()> {
        let plan = self.plan_update(force)?;
        if plan.is_empty() {
            return Ok(());
        }
        self.prepare_assets(&plan)?;
        self.execute(&plan)
    }

    /// Install a package archive from the local filesystem.
    ///
    /// The archive's embedded metadata is extracted to memory, its checksum
    /// verified against the declared one, and the usual pre-flight checks
    /// (already installed, dependencies, conflicts, file conflicts) run
    /// before the shared execution path takes over.
    pub fn install_local(&mut self, archive_path: &Path, force: bool) -> Result<()> {
        info!("installing local package {}", archive_path.display());

        let meta = archive::read_metadata(archive_path)?;
        let pkg = index::parse_package_str(&meta)?;

        if self.config.skip_crypto {
            warn!("skipping local package integrity check as requested");
        } else {
            crypto::verify_file_checksum(archive_path, &pkg.checksum, &pkg.name)?;
        }

        if self.store.is_installed(&pkg.name)? {
            return Err(Error::PackageAlreadyInstalled(pkg.name));
        }

        for dep in &pkg.deps {
            if !self.is_dependency_satisfied(dep)? && !force {
                return Err(Error::ResolutionFailed(format!(
                    "unsatisfied dependency for '{}': {dep}",
                    pkg.name
                )));
            }
        }

        for conflict in &pkg.conflicts {
            if self.store.is_installed(conflict)? && !force {
                return Err(Error::ConflictDetected {
                    package: pkg.name.clone(),
                    conflicts_with: conflict.clone(),
                });
            }
        }

        let mut plan = TransactionPlan::default();
        for replace_name in &pkg.replaces {
            if let Some(target) = self.store.get_installed(replace_name)? {
                info!(
                    "package '{}' replaces '{}', scheduling it for removal",
                    pkg.name, replace_name
                );
                plan.to_remove.push(target);
            }
        }

        self.check_file_conflicts(std::slice::from_ref(&pkg), &plan.to_remove, force)?;

        plan.to_install.push(PendingInstall {
            package: pkg,
            artifact_path: archive_path.to_path_buf(),
        });

        self.execute(&plan)
    }

    /// True if a dependency name is met by an installed package or one of
    /// its provisions
    fn is_dependency_satisfied(&self, dep_name: &str) -> Result<bool> {
        if self.store.is_installed(dep_name)? {
            return Ok(true);
        }
        for installed in self.store.list_installed()? {
            if installed.package.provides.iter().any(|p| p == dep_name) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Acquire the system-wide transaction lock; fails fast if another
    /// transaction holds it.
    fn acquire_lock(&self) -> Result<LockGuard> {
        fs::create_dir_all(self.config.state_dir())?;
        let file = File::create(self.config.lock_path())?;
        file.try_lock_exclusive().map_err(|_| {
            Error::Filesystem(io::Error::new(
                io::ErrorKind::WouldBlock,
                "another transaction is already in progress",
            ))
        })?;
        Ok(LockGuard { file })
    }

    /// Detect workspaces left behind by an interrupted transaction and
    /// resume their rollback: every file under `backup/` is moved back to
    /// its original place in the target root, then the workspace is
    /// deleted.
    ///
    /// Files the interrupted transaction had newly committed cannot be
    /// enumerated from the workspace alone and are left in place; the
    /// database was never updated for them, so they surface as unowned
    /// files.
    fn recover_abandoned_workspaces(&self) -> Result<()> {
        let tx_dir = self.config.tx_dir();
        if !tx_dir.is_dir() {
            return Ok(());
        }

        for entry in fs::read_dir(&tx_dir)? {
            let workspace = entry?.path();
            if !workspace.is_dir() {
                continue;
            }

            warn!(
                "found abandoned transaction workspace {}, resuming rollback",
                workspace.display()
            );

            let backup_dir = workspace.join("backup");
            if backup_dir.is_dir() {
                self.restore_backup_tree(&backup_dir)?;
            }

            fs::remove_dir_all(&workspace)?;
            warn!("abandoned workspace cleaned up; files newly added by the interrupted transaction may remain");
        }

        Ok(())
    }

    fn restore_backup_tree(&self, backup_dir: &Path) -> Result<()> {
        for item in WalkDir::new(backup_dir) {
            let item = item.map_err(|e| {
                Error::Filesystem(io::Error::new(io::ErrorKind::Other, e.to_string()))
            })?;
            if item.file_type().is_dir() {
                continue;
            }
            let Ok(rel) = item.path().strip_prefix(backup_dir) else {
                continue;
            };
            let dest = self.config.root.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            debug!("restoring {} from abandoned backup", dest.display());
            move_file_atomic(item.path(), &dest)?;
        }
        Ok(())
    }

    /// Names of the packages scheduled for removal in a plan
    fn removal_names(plan: &TransactionPlan) -> HashSet<String> {
        plan.to_remove
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }
}
