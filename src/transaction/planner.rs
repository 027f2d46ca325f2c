// src/transaction/planner.rs

//! Transaction planning
//!
//! Three entry points build a `TransactionPlan` without touching disk or
//! database: `plan_install`, `plan_remove`, `plan_update`. Planning errors
//! surface to the caller with no side effects; the engine never enters
//! execution with a known conflict.

use super::{PendingInstall, TransactionEngine, TransactionPlan};
use crate::error::{Error, Result};
use crate::package::{InstalledPackage, Package};
use crate::resolver::Resolver;
use crate::version;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info};

impl TransactionEngine {
    /// Plan the installation of the named packages.
    ///
    /// The resolver produces the topologically sorted install closure;
    /// `conflicts` entries against installed packages fail the plan unless
    /// the conflicting package is itself being removed; `replaces` entries
    /// schedule the named installed packages for removal; the file-conflict
    /// check (§ the two-stage check below) runs last.
    pub fn plan_install(&self, names: &[String], force: bool) -> Result<TransactionPlan> {
        info!("planning installation transaction");

        for name in names {
            if self.store().is_installed(name)? && !force {
                return Err(Error::PackageAlreadyInstalled(name.clone()));
            }
        }

        let installed = self.store().list_installed()?;
        let repo = self.store().list_repo_packages()?;
        let resolved = Resolver::new(&installed, &repo).resolve(names)?;

        if resolved.is_empty() {
            return Ok(TransactionPlan::default());
        }

        let mut plan = TransactionPlan::default();

        // Replaces: installing a package implicitly removes what it replaces
        for pkg in &resolved {
            for replace_name in &pkg.replaces {
                if let Some(target) = self.store().get_installed(replace_name)? {
                    if !plan.to_remove.iter().any(|p| p.name() == replace_name) {
                        info!(
                            "package '{}' replaces '{}', scheduling it for removal",
                            pkg.name, replace_name
                        );
                        plan.to_remove.push(target);
                    }
                }
            }
        }

        // Conflicts: an installed conflict that is not leaving in this plan
        // aborts it
        let removing = Self::removal_names(&plan);
        for pkg in &resolved {
            for conflict in &pkg.conflicts {
                if removing.contains(conflict) {
                    continue;
                }
                if self.store().is_installed(conflict)? && !force {
                    return Err(Error::ConflictDetected {
                        package: pkg.name.clone(),
                        conflicts_with: conflict.clone(),
                    });
                }
            }
        }

        self.check_file_conflicts(&resolved, &plan.to_remove, force)?;

        let cache_dir = self.config().cache_dir();
        for pkg in resolved {
            let artifact_path = cache_dir.join(pkg.artifact_name());
            plan.to_install.push(PendingInstall {
                package: pkg,
                artifact_path,
            });
        }

        info!(
            "installation plan: {} to install, {} to remove",
            plan.to_install.len(),
            plan.to_remove.len()
        );
        Ok(plan)
    }

    /// Plan the removal of the named packages.
    ///
    /// Every name must be installed. Removal fails if any installed package
    /// outside the removal set depends on one of the targets, unless
    /// `force` is set.
    pub fn plan_remove(&self, names: &[String], force: bool) -> Result<TransactionPlan> {
        info!("planning removal transaction");

        let all_installed = self.store().list_installed()?;
        let targets: HashSet<&str> = names.iter().map(|n| n.as_str()).collect();
        let mut plan = TransactionPlan::default();

        for name in names {
            let target = all_installed
                .iter()
                .find(|p| p.name() == name)
                .ok_or_else(|| Error::PackageNotInstalled(name.clone()))?;
            plan.to_remove.push(target.clone());

            for other in &all_installed {
                if targets.contains(other.name()) {
                    continue;
                }
                if other.package.deps.iter().any(|d| d == name) && !force {
                    return Err(Error::DependencyViolation {
                        package: name.clone(),
                        required_by: other.name().to_string(),
                    });
                }
            }
        }

        info!("removal plan: {} to remove", plan.to_remove.len());
        Ok(plan)
    }

    /// Sync repositories, then plan the upgrade of every installed package
    /// whose repository counterpart carries a greater version. The old
    /// record goes on the removal list, the new one (plus any newly needed
    /// dependencies) on the install list, topologically ordered.
    pub fn plan_update(&mut self, force: bool) -> Result<TransactionPlan> {
        info!("planning system update");
        self.sync()?;

        let installed = self.store().list_installed()?;
        let mut plan = TransactionPlan::default();
        let mut targets: BTreeMap<String, Package> = BTreeMap::new();
        let mut new_deps: Vec<String> = Vec::new();

        for ipkg in &installed {
            let Some(repo_pkg) = self.store().get_repo_package(ipkg.name())? else {
                continue;
            };
            if version::compare(&repo_pkg.version, ipkg.version())? == Ordering::Greater {
                info!(
                    "upgrade found for {}: {} -> {}",
                    ipkg.name(),
                    ipkg.version(),
                    repo_pkg.version
                );
                plan.to_remove.push(ipkg.clone());
                new_deps.extend(repo_pkg.deps.iter().cloned());
                targets.insert(repo_pkg.name.clone(), repo_pkg);
            }
        }

        if targets.is_empty() {
            info!("system is already up to date");
            return Ok(plan);
        }

        // Resolve only the dependencies of the new versions; anything not
        // already satisfied joins the install set
        let repo = self.store().list_repo_packages()?;
        let resolved = Resolver::new(&installed, &repo).resolve(&new_deps)?;
        for pkg in resolved {
            targets.entry(pkg.name.clone()).or_insert(pkg);
        }

        let target_list: Vec<Package> = targets.values().cloned().collect();
        self.check_file_conflicts(&target_list, &plan.to_remove, force)?;

        let ordered = topo_order(&targets)?;
        let cache_dir = self.config().cache_dir();
        for pkg in ordered {
            let artifact_path = cache_dir.join(pkg.artifact_name());
            plan.to_install.push(PendingInstall {
                package: pkg,
                artifact_path,
            });
        }

        info!(
            "update plan: {} to install, {} to remove",
            plan.to_install.len(),
            plan.to_remove.len()
        );
        Ok(plan)
    }

    /// Two-stage file-conflict check.
    ///
    /// Stage 1: a path already owned by an installed package (that is not
    /// being removed in this plan) conflicts, always. Stage 2: a path that
    /// exists on the filesystem under the target root but is owned by no
    /// package conflicts unless `force` is set. Paths owned by packages
    /// being removed are exempt from both stages; their files leave during
    /// BACKUP.
    pub(super) fn check_file_conflicts(
        &self,
        new_packages: &[Package],
        to_remove: &[InstalledPackage],
        force: bool,
    ) -> Result<()> {
        debug!("checking for file conflicts");

        let removing: HashSet<&str> = to_remove.iter().map(|p| p.name()).collect();
        let mut removed_files: HashSet<&PathBuf> = HashSet::new();
        for pkg in to_remove {
            removed_files.extend(pkg.owned_files.iter());
        }

        let installed = self.store().list_installed()?;
        let mut owned: HashMap<&PathBuf, &str> = HashMap::new();
        for ipkg in &installed {
            if removing.contains(ipkg.name()) {
                continue;
            }
            for file in &ipkg.owned_files {
                owned.insert(file, ipkg.name());
            }
        }

        for pkg in new_packages {
            for file in &pkg.files {
                if let Some(owner) = owned.get(file) {
                    return Err(Error::FileConflict(format!(
                        "package '{}' wants '{}', which is already owned by '{owner}'",
                        pkg.name,
                        file.display()
                    )));
                }

                if removed_files.contains(file) {
                    continue;
                }

                let on_disk = self.config().root.join(file);
                if on_disk.symlink_metadata().is_ok() && !force {
                    return Err(Error::FileConflict(format!(
                        "package '{}' wants '{}', which already exists on the filesystem and is not owned by any package",
                        pkg.name,
                        file.display()
                    )));
                }
            }
        }

        debug!("no file conflicts found");
        Ok(())
    }
}

/// Topologically order an update's install set by the dependency edges that
/// stay inside the set. Dependencies on anything outside the map are
/// satisfied elsewhere and ignored here.
fn topo_order(targets: &BTreeMap<String, Package>) -> Result<Vec<Package>> {
    let mut ordered = Vec::with_capacity(targets.len());
    let mut visiting: HashSet<&str> = HashSet::new();
    let mut visited: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        name: &'a str,
        targets: &'a BTreeMap<String, Package>,
        ordered: &mut Vec<Package>,
        visiting: &mut HashSet<&'a str>,
        visited: &mut HashSet<&'a str>,
    ) -> Result<()> {
        if visited.contains(name) {
            return Ok(());
        }
        if visiting.contains(name) {
            return Err(Error::ResolutionFailed(format!(
                "circular dependency involving package '{name}' in update set"
            )));
        }
        let Some(pkg) = targets.get(name) else {
            return Ok(());
        };

        visiting.insert(name);
        for dep in &pkg.deps {
            visit(dep, targets, ordered, visiting, visited)?;
        }
        visiting.remove(name);

        visited.insert(name);
        ordered.push(pkg.clone());
        Ok(())
    }

    for name in targets.keys() {
        visit(name, targets, &mut ordered, &mut visiting, &mut visited)?;
    }

    Ok(ordered)
}
