//! Path containment checks for received file names
//!
//! The receiver writes only inside its configured destination directory.
//! Validation is lexical: the base is canonicalized once, the requested
//! path is resolved against it, and `.`/`..` components are eliminated
//! before the prefix check. The target file need not exist yet.

use std::path::{Component, Path, PathBuf};

/// Eliminate `.` components and resolve `..` against the preceding
/// component. A `..` with nothing left to pop is kept, which guarantees
/// the later prefix check fails.
fn lexical_normal(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Decide whether `requested` may be written under `base_dir`.
///
/// The base must exist (it is canonicalized); anything that fails to
/// resolve is denied. Relative requests are resolved against the base,
/// never against the process working directory.
pub fn is_path_safe(requested: &Path, base_dir: &Path) -> bool {
    let canonical_base = match base_dir.canonicalize() {
        Ok(p) => p,
        Err(_) => return false,
    };

    let absolute = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        canonical_base.join(requested)
    };

    lexical_normal(&absolute).starts_with(&canonical_base)
}
