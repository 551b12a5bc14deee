//! Filesystem enumeration for the sending side

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One file to transfer: where it lives locally and what the receiver
/// will call it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub local_path: PathBuf,
    pub remote_name: String,
}

/// Wire names always use forward slashes, whatever the local platform.
pub fn to_wire_name(name: &str) -> String {
    name.replace('\\', "/")
}

/// Expand `source` into transferable files. A regular file yields itself
/// under its file name; a directory yields every regular file beneath it
/// with a relative name rooted at the directory.
pub fn enumerate_files(source: &Path) -> Result<Vec<WalkEntry>> {
    if !source.exists() {
        bail!("path does not exist: {}", source.display());
    }

    if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("source has no file name")?;
        return Ok(vec![WalkEntry {
            local_path: source.to_path_buf(),
            remote_name: to_wire_name(&name),
        }]);
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(source) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("strip prefix from {}", entry.path().display()))?;
        entries.push(WalkEntry {
            local_path: entry.path().to_path_buf(),
            remote_name: to_wire_name(&relative.to_string_lossy()),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_file_uses_its_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alone.txt");
        std::fs::write(&path, b"x").unwrap();

        let entries = enumerate_files(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].local_path, path);
        assert_eq!(entries[0].remote_name, "alone.txt");
    }

    #[test]
    fn test_directory_yields_relative_names() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub/mid.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("sub/deeper/leaf.txt"), b"c").unwrap();

        let mut names: Vec<String> = enumerate_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|e| e.remote_name)
            .collect();
        names.sort();
        assert_eq!(names, ["sub/deeper/leaf.txt", "sub/mid.txt", "top.txt"]);
    }

    #[test]
    fn test_directories_themselves_are_not_yielded() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("empty/nested")).unwrap();
        assert!(enumerate_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        assert!(enumerate_files(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_backslashes_become_forward_slashes() {
        assert_eq!(to_wire_name(r"dir\sub\file.bin"), "dir/sub/file.bin");
        assert_eq!(to_wire_name("already/fine"), "already/fine");
    }
}
