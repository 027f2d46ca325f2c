// src/archive.rs

//! Package archive extraction
//!
//! Aurora archives are zstd-compressed tarballs. A top-level `.AURORA_META`
//! document carries the package metadata; every other entry is payload,
//! rooted at paths relative to the target root. Extraction is staged: the
//! archive is unpacked into a scratch directory and the engine later moves
//! each file into place individually.
//!
//! Entry paths are sanitized before unpacking; a traversal attempt or an
//! entry type outside the supported set (regular files, directories,
//! symlinks, hard links, device nodes, fifos) fails the extraction.

use crate::error::{Error, Result};
use crate::filesystem::path::sanitize_path;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::debug;

/// Metadata document name inside every archive
pub const META_FILE: &str = ".AURORA_META";

fn open_archive(archive_path: &Path) -> Result<Archive<zstd::Decoder<'static, std::io::BufReader<File>>>> {
    let file = File::open(archive_path).map_err(|e| {
        Error::ExtractionFailed(format!("cannot open {}: {e}", archive_path.display()))
    })?;
    let decoder = zstd::Decoder::new(file).map_err(|e| {
        Error::ExtractionFailed(format!(
            "cannot decode {}: {e}",
            archive_path.display()
        ))
    })?;
    let mut archive = Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_unpack_xattrs(true);
    Ok(archive)
}

/// True for the entry kinds a package archive may contain
fn is_supported(kind: EntryType) -> bool {
    matches!(
        kind,
        EntryType::Regular
            | EntryType::Directory
            | EntryType::Symlink
            | EntryType::Link
            | EntryType::Char
            | EntryType::Block
            | EntryType::Fifo
    )
}

/// Extension headers the tar reader surfaces but which carry no payload
fn is_metadata_entry(kind: EntryType) -> bool {
    matches!(
        kind,
        EntryType::XHeader | EntryType::XGlobalHeader | EntryType::GNULongName | EntryType::GNULongLink
    )
}

/// Extract a package archive into `dest`, returning the relative paths of
/// every payload entry that is not a directory, in archive order.
///
/// The returned list is exactly what the engine will move into the target
/// root and record as the package's owned files. `.AURORA_META` is not
/// extracted.
pub fn extract(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dest)?;

    let mut archive = open_archive(archive_path)?;
    let mut extracted = Vec::new();

    let entries = archive.entries().map_err(|e| {
        Error::ExtractionFailed(format!("cannot read {}: {e}", archive_path.display()))
    })?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::ExtractionFailed(format!("corrupt archive entry: {e}")))?;

        let kind = entry.header().entry_type();
        if is_metadata_entry(kind) {
            continue;
        }
        if !is_supported(kind) {
            return Err(Error::ExtractionFailed(format!(
                "unsupported archive entry type {:?}",
                kind
            )));
        }

        let raw_path = entry
            .path()
            .map_err(|e| Error::ExtractionFailed(format!("unreadable entry path: {e}")))?
            .into_owned();
        let rel_path = sanitize_path(&raw_path)
            .map_err(|e| Error::ExtractionFailed(format!("unsafe entry path: {e}")))?;

        if rel_path == Path::new(META_FILE) {
            continue;
        }

        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| Error::ExtractionFailed(format!("cannot unpack {}: {e}", rel_path.display())))?;
        if !unpacked {
            return Err(Error::ExtractionFailed(format!(
                "entry {} escapes the staging directory",
                rel_path.display()
            )));
        }

        if kind != EntryType::Directory {
            extracted.push(rel_path);
        }
    }

    debug!(
        "extracted {} files from {}",
        extracted.len(),
        archive_path.display()
    );
    Ok(extracted)
}

/// Read the `.AURORA_META` document out of an archive without extracting
/// anything to disk.
pub fn read_metadata(archive_path: &Path) -> Result<String> {
    let mut archive = open_archive(archive_path)?;

    let entries = archive.entries().map_err(|e| {
        Error::ExtractionFailed(format!("cannot read {}: {e}", archive_path.display()))
    })?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::ExtractionFailed(format!("corrupt archive entry: {e}")))?;

        if is_metadata_entry(entry.header().entry_type()) {
            continue;
        }

        let raw_path = entry
            .path()
            .map_err(|e| Error::ExtractionFailed(format!("unreadable entry path: {e}")))?
            .into_owned();
        let Ok(rel_path) = sanitize_path(&raw_path) else {
            continue;
        };

        if rel_path == Path::new(META_FILE) {
            let mut content = String::new();
            entry.read_to_string(&mut content).map_err(|e| {
                Error::ExtractionFailed(format!("cannot read {META_FILE}: {e}"))
            })?;
            return Ok(content);
        }
    }

    Err(Error::ExtractionFailed(format!(
        "{} does not contain {META_FILE}",
        archive_path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Build a zstd tarball from (path, content, mode) triples
    fn build_archive(dest: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(dest).unwrap();
        let encoder = zstd::Encoder::new(file, 0).unwrap();
        let mut builder = tar::Builder::new(encoder);

        for (path, content, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(*mode);
            // Newer `tar` versions reject `..` components in `append_data`'s
            // path-sanitization step even for fixtures that intentionally
            // exercise our own traversal rejection, so write the raw name
            // bytes directly and append the header without re-validating.
            let name_bytes = path.as_bytes();
            header.as_old_mut().name[..name_bytes.len()].copy_from_slice(name_bytes);
            header.set_cksum();
            builder.append(&header, *content).unwrap();
        }

        let encoder = builder.into_inner().unwrap();
        let mut file = encoder.finish().unwrap();
        file.flush().unwrap();
    }

    #[test]
    fn test_extract_lists_payload_files() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("pkg.pkg.tar.zst");
        build_archive(
            &archive,
            &[
                (META_FILE, b"name: x\n", 0o644),
                ("usr/bin/x", b"#!/bin/sh\n", 0o755),
                ("etc/x.conf", b"key=1\n", 0o644),
            ],
        );

        let staging = dir.path().join("staging");
        let files = extract(&archive, &staging).unwrap();

        assert_eq!(
            files,
            vec![PathBuf::from("usr/bin/x"), PathBuf::from("etc/x.conf")]
        );
        assert!(staging.join("usr/bin/x").is_file());
        assert!(staging.join("etc/x.conf").is_file());
        // Metadata is not part of the payload
        assert!(!staging.join(META_FILE).exists());
    }

    #[test]
    fn test_extract_preserves_mode() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("pkg.pkg.tar.zst");
        build_archive(&archive, &[("usr/bin/tool", b"bin", 0o755)]);

        let staging = dir.path().join("staging");
        extract(&archive, &staging).unwrap();

        use std::os::unix::fs::PermissionsExt;
        let mode = staging
            .join("usr/bin/tool")
            .metadata()
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_extract_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.pkg.tar.zst");
        build_archive(&archive, &[("../outside", b"boom", 0o644)]);

        let staging = dir.path().join("staging");
        let err = extract(&archive, &staging).unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(_)));
        assert!(!dir.path().join("outside").exists());
    }

    #[test]
    fn test_extract_strips_dot_slash_prefix() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("pkg.pkg.tar.zst");
        build_archive(&archive, &[("./usr/bin/y", b"y", 0o755)]);

        let staging = dir.path().join("staging");
        let files = extract(&archive, &staging).unwrap();
        assert_eq!(files, vec![PathBuf::from("usr/bin/y")]);
    }

    #[test]
    fn test_extract_not_an_archive() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.pkg.tar.zst");
        std::fs::write(&bogus, b"definitely not zstd").unwrap();

        let err = extract(&bogus, &dir.path().join("staging")).unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(_)));
    }

    #[test]
    fn test_read_metadata() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("pkg.pkg.tar.zst");
        build_archive(
            &archive,
            &[
                (META_FILE, b"name: meta-test\n", 0o644),
                ("usr/bin/z", b"z", 0o755),
            ],
        );

        let meta = read_metadata(&archive).unwrap();
        assert_eq!(meta, "name: meta-test\n");
    }

    #[test]
    fn test_read_metadata_missing() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("pkg.pkg.tar.zst");
        build_archive(&archive, &[("usr/bin/z", b"z", 0o755)]);

        let err = read_metadata(&archive).unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(_)));
    }
}
