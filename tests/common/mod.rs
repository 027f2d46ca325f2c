// tests/common/mod.rs

//! Shared fixtures for integration tests: scratch roots, package archive
//! builders, store seeding, and a local static-file server for network
//! scenarios.

#![allow(dead_code)]

use aurora::db::Store;
use aurora::{crypto, EngineConfig, InstalledPackage, Package, TransactionEngine};
use std::fs::{self, File};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tempfile::TempDir;

/// A minimal package record; tests fill in what they need
pub fn package(name: &str, version: &str) -> Package {
    Package {
        name: name.to_string(),
        version: version.to_string(),
        arch: "x86_64".to_string(),
        description: format!("{name} test package"),
        installed_size: 0,
        checksum: "0".repeat(64),
        repo_name: "core".to_string(),
        deps: vec![],
        makedepends: vec![],
        provides: vec![],
        conflicts: vec![],
        replaces: vec![],
        pre_install: None,
        post_install: None,
        pre_remove: None,
        post_remove: None,
        files: vec![],
    }
}

/// A fresh engine over a scratch target root.
///
/// Returns the tempdir holding everything, the config, and the engine. The
/// root lives at `<tmp>/root`; signature checks are skipped since the test
/// repositories are unsigned.
pub fn engine_fixture() -> (TempDir, EngineConfig, TransactionEngine) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir_all(&root).unwrap();

    let config = EngineConfig::new(&root)
        .with_key_dir(tmp.path().join("keys"))
        .with_skip_crypto(true);
    let engine = TransactionEngine::new(config.clone()).unwrap();
    (tmp, config, engine)
}

/// Build a package archive in `dest_dir` from (path, content, mode)
/// entries, fix up the package's `files` list and checksum, and return the
/// archive path.
///
/// The embedded `.AURORA_META` carries a placeholder checksum (an archive
/// cannot contain its own hash); the returned record carries the real one,
/// which is what repository indexes publish.
pub fn build_archive(dest_dir: &Path, pkg: &mut Package, entries: &[(&str, &str, u32)]) -> PathBuf {
    pkg.files = entries.iter().map(|(p, _, _)| PathBuf::from(p)).collect();

    let archive_path = dest_dir.join(pkg.artifact_name());
    fs::create_dir_all(dest_dir).unwrap();

    let file = File::create(&archive_path).unwrap();
    let encoder = zstd::Encoder::new(file, 0).unwrap();
    let mut builder = tar::Builder::new(encoder);

    let meta = serde_yaml::to_string(&pkg).unwrap();
    append_entry(&mut builder, ".AURORA_META", meta.as_bytes(), 0o644);
    for (path, content, mode) in entries {
        append_entry(&mut builder, path, content.as_bytes(), *mode);
    }

    let encoder = builder.into_inner().unwrap();
    encoder.finish().unwrap();

    pkg.checksum = crypto::sha256_file(&archive_path).unwrap();
    archive_path
}

fn append_entry<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    path: &str,
    content: &[u8],
    mode: u32,
) {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(mode);
    header.set_cksum();
    builder.append_data(&mut header, path, content).unwrap();
}

/// Replace the repo table with the given records via a separate store
/// connection
pub fn seed_repo(config: &EngineConfig, packages: &[Package]) {
    let mut store = Store::open(&config.db_path()).unwrap();
    store.replace_repo_packages(packages).unwrap();
}

/// Mark a package installed and materialize its owned files on disk
pub fn seed_installed(
    config: &EngineConfig,
    pkg: Package,
    files: &[(&str, &str)],
) -> InstalledPackage {
    for (path, content) in files {
        let dest = config.root.join(path);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, content).unwrap();
    }

    let installed = InstalledPackage {
        owned_files: files.iter().map(|(p, _)| PathBuf::from(p)).collect(),
        package: pkg,
        install_date: "2025-11-02".to_string(),
    };

    let store = Store::open(&config.db_path()).unwrap();
    store.add_installed(&installed).unwrap();
    installed
}

/// Installed package names, sorted
pub fn installed_names(engine: &TransactionEngine) -> Vec<String> {
    engine
        .store()
        .list_installed()
        .unwrap()
        .iter()
        .map(|p| p.name().to_string())
        .collect()
}

/// Write a repos.conf pointing one repository at the given mirror base URLs
pub fn write_repos_conf(config: &EngineConfig, repo_name: &str, mirrors: &[String]) {
    let conf_path = config.repos_conf();
    fs::create_dir_all(conf_path.parent().unwrap()).unwrap();

    let mut content = format!("[{repo_name}]\n");
    for mirror in mirrors {
        content.push_str(&format!("url = {mirror}\n"));
    }
    fs::write(&conf_path, content).unwrap();
}

/// Serve a directory over HTTP on an ephemeral local port.
///
/// The server thread is detached and lives for the rest of the test
/// process.
pub fn serve_dir(dir: PathBuf) -> SocketAddr {
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();

            let app = axum::Router::new()
                .fallback_service(tower_http::services::ServeDir::new(dir));
            axum::serve(listener, app).await.unwrap();
        });
    });

    rx.recv().unwrap()
}

/// Render a repository index document for the given packages
pub fn repo_index_yaml(packages: &[Package]) -> String {
    serde_yaml::to_string(packages).unwrap()
}
