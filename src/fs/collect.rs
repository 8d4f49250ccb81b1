// src/fs/collect.rs

//! Find program arguments that refer to files below the current directory.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^.*\.(py|pl|rb|js|sh|r|bat|cmd|exe|jar)$").expect("valid script pattern")
});

/// Collect the arguments that name an existing file or directory below
/// `start_path`, as normalized relative paths (`/`-separated).
///
/// Arguments pointing outside `start_path` (or at `start_path` itself) are
/// ignored.
pub fn collect_relative_files<I, S>(args: I, start_path: &Path) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let start = normalize(start_path);
    let mut out = Vec::new();

    for arg in args {
        let arg = arg.as_ref();
        if arg.is_empty() {
            continue;
        }
        let full = normalize(&start.join(arg));
        let Ok(rel) = full.strip_prefix(&start) else {
            continue;
        };
        if rel.as_os_str().is_empty() || !full.exists() {
            continue;
        }
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        out.push(rel);
    }
    out
}

/// Whether `path` (relative to `start_path`) is an existing script file,
/// judged by its extension.
pub fn is_script_file(path: &str, start_path: &Path) -> bool {
    SCRIPT_FILE_PATTERN.is_match(path) && start_path.join(path).is_file()
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn collects_only_existing_paths_inside_start() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("train.py"), b"").unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/x.csv"), b"").unwrap();

        let outside = dir.path().parent().unwrap().to_string_lossy().into_owned();
        let found = collect_relative_files(
            [
                "python",
                "train.py",
                "./data/../data/x.csv",
                "data",
                "missing.txt",
                "--epochs=3",
                ".",
                outside.as_str(),
            ],
            dir.path(),
        );
        assert_eq!(found, vec!["train.py", "data/x.csv", "data"]);
    }

    #[test]
    fn script_detection_uses_extension_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Train.PY"), b"").unwrap();
        fs::write(dir.path().join("data.csv"), b"").unwrap();
        fs::create_dir(dir.path().join("pkg.py")).unwrap();

        assert!(is_script_file("Train.PY", dir.path()));
        assert!(!is_script_file("data.csv", dir.path()));
        assert!(!is_script_file("pkg.py", dir.path()));
        assert!(!is_script_file("absent.sh", dir.path()));
    }
}
