// src/filesystem/mod.rs

//! Filesystem primitives shared by the transaction engine

pub mod path;

use crate::error::Result;
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Move a file atomically, falling back to copy+sync+delete for
/// cross-filesystem moves.
///
/// Handles the EXDEV error that occurs when source and destination are on
/// different filesystems (e.g., staging on /var and target on /usr). On the
/// fallback path the destination is fsynced before the source is removed.
pub fn move_file_atomic(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            tracing::debug!(
                "cross-filesystem move ({} -> {}), using copy fallback",
                src.display(),
                dst.display()
            );

            fs::copy(src, dst)?;

            let file = File::open(dst)?;
            file.sync_all()?;
            drop(file);

            // Not all filesystems support fsync on directories
            if let Some(parent) = dst.parent() {
                if let Ok(dir) = File::open(parent) {
                    let _ = dir.sync_all();
                }
            }

            fs::remove_file(src)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Free space in bytes on the filesystem holding `path`
pub fn available_space(path: &Path) -> Result<u64> {
    Ok(fs2::available_space(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_file_atomic_same_fs() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("source.txt");
        let dst = temp_dir.path().join("dest.txt");

        fs::write(&src, "test content").unwrap();
        move_file_atomic(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "test content");
    }

    #[test]
    fn test_move_file_atomic_preserves_content() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("binary_file");
        let dst = temp_dir.path().join("moved_binary");

        let content: Vec<u8> = (0..=255).collect();
        fs::write(&src, &content).unwrap();

        move_file_atomic(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), content);
    }

    #[test]
    fn test_available_space_nonzero() {
        let temp_dir = TempDir::new().unwrap();
        assert!(available_space(temp_dir.path()).unwrap() > 0);
    }
}
