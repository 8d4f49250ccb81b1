// src/fs/mod.rs

//! Filesystem helpers used to prepare and tear down the run directory.
//!
//! - [`clone`] mirrors script/data files into the run directory.
//! - [`fingerprint`] computes the content digest of the script files.
//! - [`cleanup`] tracks linked paths that must not outlive the run.
//! - [`collect`] classifies program arguments into script and data files.

pub mod cleanup;
pub mod clone;
pub mod collect;
pub mod fingerprint;

use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

pub use cleanup::CleanupSet;
pub use clone::{clone_file_or_dir, copy_or_link};
pub use collect::{collect_relative_files, is_script_file};
pub use fingerprint::fingerprint_for_files;

/// Sum up the filesystem size of `path`, directories included.
///
/// Symbolic links are not followed; a link counts with its own size.
pub fn compute_fs_size(path: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {:?}", path))?;
        let meta = entry
            .path()
            .symlink_metadata()
            .with_context(|| format!("reading metadata of {:?}", entry.path()))?;
        total += meta.len();
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn size_counts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"world!!").unwrap();

        let dirs_only = fs::metadata(dir.path()).unwrap().len()
            + fs::metadata(dir.path().join("sub")).unwrap().len();

        let size = compute_fs_size(dir.path()).unwrap();
        assert_eq!(size, dirs_only + 5 + 7);
    }

    #[test]
    fn size_of_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.bin");
        fs::write(&file, vec![0u8; 1234]).unwrap();
        assert_eq!(compute_fs_size(&file).unwrap(), 1234);
    }
}
