// src/fs/cleanup.rs

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Set of paths to remove once the run is over.
///
/// `drain` may be called any number of times: a path that is already gone
/// is silently forgotten, a path whose removal fails is kept for the next
/// drain.
#[derive(Debug, Default)]
pub struct CleanupSet {
    paths: BTreeSet<PathBuf>,
}

impl CleanupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Empty the set and try to remove every former entry, in path order.
    ///
    /// Returns the former contents. Entries whose removal failed for any
    /// reason other than "not found" are put back.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        let paths: Vec<PathBuf> = std::mem::take(&mut self.paths).into_iter().collect();

        for path in &paths {
            match remove_path(path) {
                Ok(()) => debug!("cleaned up {:?}", path),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    info!(path = ?path, error = %err, "failed to cleanup");
                    self.paths.insert(path.clone());
                }
            }
        }

        paths
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
