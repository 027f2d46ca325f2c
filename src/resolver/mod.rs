// src/resolver/mod.rs

//! Dependency resolution
//!
//! Depth-first search with tri-state marking over the repository graph.
//! Output is the topologically sorted sequence of repository packages that
//! must be newly installed to satisfy a request: every dependency appears
//! strictly before its dependents, duplicates are eliminated, and anything
//! already satisfied (installed, provided by an installed package, or
//! already appended to the output) is omitted.
//!
//! Dependency strings are opaque names. Provider selection is a tagged
//! outcome, never polymorphism: an exact-name match wins unconditionally; a
//! single virtual provider wins; multiple virtual providers without an
//! exact name is an ambiguity the user must break by naming one explicitly.

use crate::error::{Error, Result};
use crate::package::{InstalledPackage, Package};
use std::collections::HashSet;
use tracing::debug;

/// Outcome of provider selection for one dependency name
#[derive(Debug)]
enum ProviderChoice {
    /// A repository package with exactly this name
    ExactName(Package),
    /// No exact name, but exactly one package provides the name virtually
    UniqueVirtual(Package),
    /// No exact name and several virtual providers
    Ambiguous(Vec<String>),
    /// Nothing satisfies the name
    None,
}

/// Read-only views the resolver works against
pub struct Resolver<'a> {
    installed: &'a [InstalledPackage],
    repo: &'a [Package],
}

impl<'a> Resolver<'a> {
    pub fn new(installed: &'a [InstalledPackage], repo: &'a [Package]) -> Self {
        Self { installed, repo }
    }

    /// Resolve the requested names into a topologically sorted install list
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Package>> {
        let mut sorted = Vec::new();
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();

        for name in names {
            if !visited.contains(name.as_str()) {
                self.visit(name, &mut sorted, &mut visiting, &mut visited)?;
            }
        }

        Ok(sorted)
    }

    /// True if a name is satisfied without installing anything new: by an
    /// installed package, an installed package's provision, or a package
    /// already on the output list.
    fn is_satisfied(&self, name: &str, sorted: &[Package]) -> bool {
        for pkg in sorted {
            if pkg.name == name || pkg.provides.iter().any(|p| p == name) {
                return true;
            }
        }
        for installed in self.installed {
            if installed.name() == name
                || installed.package.provides.iter().any(|p| p == name)
            {
                return true;
            }
        }
        false
    }

    fn select_provider(&self, name: &str) -> ProviderChoice {
        let mut exact: Option<Package> = None;
        let mut virtual_providers: Vec<Package> = Vec::new();

        for repo_pkg in self.repo {
            if repo_pkg.name == name {
                exact = Some(repo_pkg.clone());
                continue;
            }
            if repo_pkg.provides.iter().any(|p| p == name) {
                virtual_providers.push(repo_pkg.clone());
            }
        }

        if let Some(pkg) = exact {
            return ProviderChoice::ExactName(pkg);
        }
        match virtual_providers.len() {
            0 => ProviderChoice::None,
            1 => ProviderChoice::UniqueVirtual(virtual_providers.remove(0)),
            _ => ProviderChoice::Ambiguous(virtual_providers.into_iter().map(|p| p.name).collect()),
        }
    }

    fn visit(
        &self,
        name: &str,
        sorted: &mut Vec<Package>,
        visiting: &mut HashSet<String>,
        visited: &mut HashSet<String>,
    ) -> Result<()> {
        if visited.contains(name) {
            return Ok(());
        }
        if self.is_satisfied(name, sorted) {
            return Ok(());
        }

        let provider = match self.select_provider(name) {
            ProviderChoice::ExactName(pkg) => {
                debug!("resolved '{name}' to package '{}'", pkg.name);
                pkg
            }
            ProviderChoice::UniqueVirtual(pkg) => {
                debug!("resolved '{name}' to virtual provider '{}'", pkg.name);
                pkg
            }
            ProviderChoice::Ambiguous(providers) => {
                return Err(Error::AmbiguousProvider {
                    name: name.to_string(),
                    providers: providers.join(", "),
                });
            }
            ProviderChoice::None => {
                return Err(Error::ResolutionFailed(format!(
                    "no package satisfies dependency '{name}'"
                )));
            }
        };

        if visited.contains(&provider.name) {
            return Ok(());
        }
        if visiting.contains(&provider.name) {
            return Err(Error::ResolutionFailed(format!(
                "circular dependency involving package '{}'",
                provider.name
            )));
        }

        visiting.insert(provider.name.clone());
        for dep in &provider.deps {
            if let Err(e) = self.visit(dep, sorted, visiting, visited) {
                visiting.remove(&provider.name);
                return Err(e);
            }
        }
        visiting.remove(&provider.name);

        visited.insert(provider.name.clone());
        sorted.push(provider);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pkg(name: &str, deps: &[&str], provides: &[&str]) -> Package {
        Package {
            name: name.to_string(),
            version: "1.0".to_string(),
            arch: "any".to_string(),
            description: String::new(),
            installed_size: 0,
            checksum: "00".to_string(),
            repo_name: "core".to_string(),
            deps: deps.iter().map(|s| s.to_string()).collect(),
            makedepends: vec![],
            provides: provides.iter().map(|s| s.to_string()).collect(),
            conflicts: vec![],
            replaces: vec![],
            pre_install: None,
            post_install: None,
            pre_remove: None,
            post_remove: None,
            files: vec![PathBuf::from(format!("usr/bin/{name}"))],
        }
    }

    fn installed(name: &str, provides: &[&str]) -> InstalledPackage {
        InstalledPackage {
            package: pkg(name, &[], provides),
            install_date: "2025-11-02".to_string(),
            owned_files: vec![],
        }
    }

    fn names(result: &[Package]) -> Vec<&str> {
        result.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_linear_chain_is_topologically_sorted() {
        let repo = vec![pkg("a", &[], &[]), pkg("b", &["a"], &[])];
        let resolver = Resolver::new(&[], &repo);

        let result = resolver.resolve(&["b".to_string()]).unwrap();
        assert_eq!(names(&result), vec!["a", "b"]);
    }

    #[test]
    fn test_diamond_resolves_once() {
        let repo = vec![
            pkg("a", &[], &[]),
            pkg("b", &["a"], &[]),
            pkg("c", &["a"], &[]),
            pkg("d", &["b", "c"], &[]),
        ];
        let resolver = Resolver::new(&[], &repo);

        let result = resolver.resolve(&["d".to_string()]).unwrap();
        let result_names = names(&result);
        assert_eq!(result_names.len(), 4);
        assert_eq!(result_names[0], "a");
        assert_eq!(result_names[3], "d");
    }

    #[test]
    fn test_installed_dependency_is_omitted() {
        let repo = vec![pkg("a", &[], &[]), pkg("b", &["a"], &[])];
        let already = vec![installed("a", &[])];
        let resolver = Resolver::new(&already, &repo);

        let result = resolver.resolve(&["b".to_string()]).unwrap();
        assert_eq!(names(&result), vec!["b"]);
    }

    #[test]
    fn test_installed_provision_satisfies_dependency() {
        let repo = vec![pkg("app", &["ssl"], &[])];
        let already = vec![installed("openssl", &["ssl"])];
        let resolver = Resolver::new(&already, &repo);

        let result = resolver.resolve(&["app".to_string()]).unwrap();
        assert_eq!(names(&result), vec!["app"]);
    }

    #[test]
    fn test_exact_name_beats_virtual_provider() {
        let repo = vec![
            pkg("ssl", &[], &[]),
            pkg("openssl", &[], &["ssl"]),
            pkg("app", &["ssl"], &[]),
        ];
        let resolver = Resolver::new(&[], &repo);

        let result = resolver.resolve(&["app".to_string()]).unwrap();
        assert_eq!(names(&result), vec!["ssl", "app"]);
    }

    #[test]
    fn test_unique_virtual_provider_wins() {
        let repo = vec![pkg("openssl", &[], &["ssl"]), pkg("app", &["ssl"], &[])];
        let resolver = Resolver::new(&[], &repo);

        let result = resolver.resolve(&["app".to_string()]).unwrap();
        assert_eq!(names(&result), vec!["openssl", "app"]);
    }

    #[test]
    fn test_ambiguous_virtual_providers_fail() {
        let repo = vec![
            pkg("openssl", &[], &["ssl"]),
            pkg("libressl", &[], &["ssl"]),
            pkg("app", &["ssl"], &[]),
        ];
        let resolver = Resolver::new(&[], &repo);

        let err = resolver.resolve(&["app".to_string()]).unwrap_err();
        assert!(matches!(err, Error::AmbiguousProvider { .. }));
    }

    #[test]
    fn test_missing_dependency_fails() {
        let repo = vec![pkg("app", &["missing"], &[])];
        let resolver = Resolver::new(&[], &repo);

        let err = resolver.resolve(&["app".to_string()]).unwrap_err();
        assert!(matches!(err, Error::ResolutionFailed(_)));
    }

    #[test]
    fn test_unknown_package_fails() {
        let resolver = Resolver::new(&[], &[]);
        let err = resolver.resolve(&["ghost".to_string()]).unwrap_err();
        assert!(matches!(err, Error::ResolutionFailed(_)));
    }

    #[test]
    fn test_cycle_detected() {
        let repo = vec![pkg("a", &["b"], &[]), pkg("b", &["a"], &[])];
        let resolver = Resolver::new(&[], &repo);

        let err = resolver.resolve(&["a".to_string()]).unwrap_err();
        assert!(matches!(err, Error::ResolutionFailed(_)));
    }

    #[test]
    fn test_resolver_is_idempotent() {
        let repo = vec![
            pkg("a", &[], &[]),
            pkg("b", &["a"], &[]),
            pkg("c", &["b"], &[]),
        ];
        let resolver = Resolver::new(&[], &repo);

        let first = resolver.resolve(&["c".to_string()]).unwrap();
        let first_names: Vec<String> = first.iter().map(|p| p.name.clone()).collect();

        let second = resolver.resolve(&first_names).unwrap();
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn test_multiple_requests_share_dependencies() {
        let repo = vec![
            pkg("a", &[], &[]),
            pkg("b", &["a"], &[]),
            pkg("c", &["a"], &[]),
        ];
        let resolver = Resolver::new(&[], &repo);

        let result = resolver
            .resolve(&["b".to_string(), "c".to_string()])
            .unwrap();
        assert_eq!(names(&result), vec!["a", "b", "c"]);
    }
}
