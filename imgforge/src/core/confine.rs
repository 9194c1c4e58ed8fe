//! Path confinement for chroot-style targets.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Map `path` into `root` as if `root` were `/`.
///
/// `path` is normalised lexically as an absolute path first, so `..` can never
/// climb above `root`. Relative paths are treated as relative to `/`. A
/// trailing separator is kept, since transfers read it as "contents of".
pub fn confine(root: &Path, path: &Path) -> PathBuf {
    let trailing = path.as_os_str().to_string_lossy().ends_with('/');
    let mut parts: Vec<&OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    let mut out = root.to_path_buf();
    if trailing && !parts.is_empty() {
        parts.push(OsStr::new(""));
    }
    for part in parts {
        out.push(part);
    }
    out
}
