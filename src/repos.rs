// src/repos.rs

//! Repository configuration and index synchronization
//!
//! Repositories are declared in `<root>/etc/aurora/repos.conf`, an INI-like
//! file: a `[section]` per repository, one or more `url = <base>` lines per
//! section forming the mirror list in order of appearance, `#` comments.
//!
//! Sync downloads each repository's `repo.yaml` (and its detached signature
//! unless crypto is skipped) with mirror fallback, verifies it against the
//! trusted key directory, parses it, tags every record with the repository
//! name, and replaces the store's repo table in one atomic write. A name
//! appearing in several repositories resolves to the record synced last.

use crate::crypto;
use crate::db::Store;
use crate::error::{Error, Result};
use crate::fetch::{DownloadJob, Fetcher};
use crate::index;
use crate::package::Package;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Index file name inside a repository
const INDEX_FILE: &str = "repo.yaml";

/// One configured repository: a name and its ordered mirror list
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub name: String,
    pub mirrors: Vec<String>,
}

/// Repository configuration plus the sync operation
pub struct RepositoryManager {
    config_path: PathBuf,
    repositories: Vec<Repository>,
}

impl RepositoryManager {
    /// Load the configuration file. A missing file is not an error; it
    /// yields an empty repository set (and a warning), so a freshly
    /// bootstrapped root still works for local installs.
    pub fn load(config_path: &Path) -> Self {
        let repositories = match fs::read_to_string(config_path) {
            Ok(content) => parse_config(&content),
            Err(e) => {
                warn!(
                    "cannot read repository config {}: {e}",
                    config_path.display()
                );
                Vec::new()
            }
        };

        Self {
            config_path: config_path.to_path_buf(),
            repositories,
        }
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Mirror base URLs for a repository, in configuration order
    pub fn mirror_urls(&self, repo_name: &str) -> Option<&[String]> {
        self.repositories
            .iter()
            .find(|r| r.name == repo_name)
            .map(|r| r.mirrors.as_slice())
    }

    /// Synchronize all configured repositories into the store.
    ///
    /// The repo table is replaced only when every repository synced cleanly;
    /// a failed repository leaves the previous sync state untouched.
    pub fn sync(
        &mut self,
        store: &mut Store,
        fetcher: &Fetcher,
        key_dir: &Path,
        skip_crypto: bool,
    ) -> Result<()> {
        // Re-read the config in case it changed since engine construction
        if let Ok(content) = fs::read_to_string(&self.config_path) {
            self.repositories = parse_config(&content);
        }

        let scratch = tempfile::tempdir()?;
        let mut all_packages: Vec<Package> = Vec::new();
        let mut first_error: Option<Error> = None;

        for repo in &self.repositories {
            info!("updating repository '{}'", repo.name);

            if repo.mirrors.is_empty() {
                warn!("repository '{}' has no mirrors, skipping", repo.name);
                continue;
            }

            match sync_one(repo, fetcher, scratch.path(), key_dir, skip_crypto) {
                Ok(mut packages) => {
                    info!(
                        "repository '{}' offers {} packages",
                        repo.name,
                        packages.len()
                    );
                    all_packages.append(&mut packages);
                }
                Err(e) => {
                    warn!("repository '{}' failed to sync: {e}", repo.name);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        store.replace_repo_packages(&all_packages)?;
        info!("synced {} packages to the local database", all_packages.len());
        Ok(())
    }
}

fn sync_one(
    repo: &Repository,
    fetcher: &Fetcher,
    scratch: &Path,
    key_dir: &Path,
    skip_crypto: bool,
) -> Result<Vec<Package>> {
    let index_urls: Vec<String> = repo
        .mirrors
        .iter()
        .map(|base| format!("{}/{INDEX_FILE}", base.trim_end_matches('/')))
        .collect();
    let sig_urls: Vec<String> = index_urls.iter().map(|u| format!("{u}.sig")).collect();

    let index_path = scratch.join(format!("{}.yaml", repo.name));
    let sig_path = scratch.join(format!("{}.yaml.sig", repo.name));

    let mut jobs = vec![DownloadJob::new(
        index_urls,
        index_path.clone(),
        format!("index: {}", repo.name),
    )];
    if !skip_crypto {
        jobs.push(DownloadJob::new(
            sig_urls,
            sig_path.clone(),
            format!("sig: {}", repo.name),
        ));
    }

    fetcher.download_all(&jobs)?;

    if skip_crypto {
        warn!(
            "skipping authenticity check for repository '{}' as requested",
            repo.name
        );
    } else {
        crypto::verify_detached_signature(&index_path, &sig_path, key_dir)?;
        info!("repository '{}' authenticity verified", repo.name);
    }

    let mut packages = index::parse_repository_index(&index_path)?;
    for pkg in &mut packages {
        pkg.repo_name = repo.name.clone();
    }
    Ok(packages)
}

/// Parse the INI-like repository configuration
fn parse_config(content: &str) -> Vec<Repository> {
    let mut repositories: Vec<Repository> = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_string();
            repositories.push(Repository {
                name,
                mirrors: Vec::new(),
            });
        } else if let Some(current) = repositories.last_mut() {
            if let Some((key, value)) = line.split_once('=') {
                if key.trim() == "url" {
                    current.mirrors.push(value.trim().to_string());
                }
            }
        }
    }

    repositories
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_sections_and_mirrors() {
        let conf = "\
# Aurora repositories
[core]
url = https://mirror-a.example.org/core
url = https://mirror-b.example.org/core

[extra]
url = https://mirror-a.example.org/extra
";
        let repos = parse_config(conf);
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].name, "core");
        assert_eq!(
            repos[0].mirrors,
            vec![
                "https://mirror-a.example.org/core",
                "https://mirror-b.example.org/core"
            ]
        );
        assert_eq!(repos[1].name, "extra");
        assert_eq!(repos[1].mirrors.len(), 1);
    }

    #[test]
    fn test_parse_config_ignores_comments_and_unknown_keys() {
        let conf = "\
[core]
# a comment inside a section
priority = 10
url = http://localhost/core
";
        let repos = parse_config(conf);
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].mirrors, vec!["http://localhost/core"]);
    }

    #[test]
    fn test_parse_config_url_before_section_ignored() {
        let conf = "url = http://orphan.example.org\n[core]\nurl = http://localhost/core\n";
        let repos = parse_config(conf);
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].mirrors.len(), 1);
    }

    #[test]
    fn test_load_missing_config_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RepositoryManager::load(&dir.path().join("repos.conf"));
        assert!(mgr.repositories().is_empty());
        assert!(mgr.mirror_urls("core").is_none());
    }
}
