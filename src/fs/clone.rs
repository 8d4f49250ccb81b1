// src/fs/clone.rs

//! Clone files or directories into the run directory, by copy or by link.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::MlrunError;

/// Version-control and desktop metadata entries never mirrored into a run
/// directory.
const CLONE_SKIP_NAMES: &[&str] = &[
    ".git",
    ".svn",
    ".cvs",
    ".hg",
    ".DS_Store",
    ".directory",
    "Thumbs.db",
];

fn is_skipped(name: &std::ffi::OsStr) -> bool {
    name.to_str()
        .map(|n| CLONE_SKIP_NAMES.contains(&n))
        .unwrap_or(false)
}

/// Copy `source` to `target`, or create a symbolic link at `target` pointing
/// to `source` when `symlink` is set and the platform supports it.
pub fn copy_or_link(source: &Path, target: &Path, symlink: bool) -> Result<()> {
    if symlink && cfg!(unix) {
        make_symlink(source, target)
            .with_context(|| format!("linking {:?} -> {:?}", target, source))?;
    } else {
        fs::copy(source, target)
            .with_context(|| format!("copying {:?} -> {:?}", source, target))?;
    }
    Ok(())
}

#[cfg(unix)]
fn make_symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(not(unix))]
fn make_symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::copy(source, target).map(|_| ())
}

/// Clone `source` into `work_dir/target_path`.
///
/// Directories are mirrored recursively: every directory is created for
/// real and only the leaf files are copied or linked. Entries named in the
/// skip list (`.git`, `.hg`, ...) are ignored at every depth.
pub fn clone_file_or_dir(source: &Path, target_path: &Path, work_dir: &Path, symlink: bool) -> Result<()> {
    if !source.exists() {
        return Err(MlrunError::SourceNotFound(source.to_path_buf()).into());
    }

    let target_root = work_dir.join(target_path);
    if source.is_dir() {
        fs::create_dir_all(&target_root)
            .with_context(|| format!("creating dir {:?}", target_root))?;
        clone_dir(source, &target_root, symlink)
    } else {
        if let Some(parent) = target_root.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        copy_or_link(source, &target_root, symlink)?;
        debug!("cloned file: {:?}", source);
        Ok(())
    }
}

fn clone_dir(source_dir: &Path, target_dir: &Path, symlink: bool) -> Result<()> {
    let walker = WalkDir::new(source_dir)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_skipped(e.file_name()));

    for entry in walker {
        let entry = entry.with_context(|| format!("walking {:?}", source_dir))?;
        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .with_context(|| format!("relativizing {:?}", entry.path()))?;
        let dst = target_dir.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dst).with_context(|| format!("creating dir {:?}", dst))?;
        } else {
            copy_or_link(entry.path(), &dst, symlink)?;
            debug!("cloned file: {:?}", entry.path());
        }
    }
    Ok(())
}
