// src/fs/fingerprint.rs

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

const BUFFER_SIZE: usize = 16 * 1024;

/// Compute the fingerprint of the given files (relative to `root_dir`).
///
/// Returns `None` for an empty list. The list is sorted first, so the order
/// of `file_list` does not matter. For every file a header
/// `"<len>|<relative path>|<size>"` is hashed, followed by the file content.
pub fn fingerprint_for_files<I, S>(file_list: I, root_dir: &Path) -> Result<Option<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = file_list
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect();
    if names.is_empty() {
        return Ok(None);
    }
    names.sort();

    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; BUFFER_SIZE];

    for name in &names {
        let path = root_dir.join(name);
        let meta = path
            .metadata()
            .with_context(|| format!("reading metadata of {:?}", path))?;

        let header = format!("{}|{}|{}", name.len(), name, meta.len());
        hasher.update(header.as_bytes());

        let mut file = File::open(&path).with_context(|| format!("opening file for hashing: {:?}", path))?;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }

    let digest = hasher.finalize().to_hex().to_string();
    debug!(fingerprint = %digest, files = names.len(), "computed fingerprint");
    Ok(Some(digest))
}
