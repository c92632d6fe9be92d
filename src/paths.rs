//! Path helpers shared by the store and the orchestrator

use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against the current directory and remove `.` / `..` lexically
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        let base = std::env::current_dir().unwrap_or_default();
        normalize(&base.join(path))
    }
}

/// Resolve `path` relative to `base_dir` unless it is already absolute
pub fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base_dir.join(path))
    }
}

/// Lexical normalization: no file system access, symlinks are not resolved
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Directory containing `path`, or the empty path
pub fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}
