//! Filesystem utilities.

use std::fs;
use std::path::{Component, Path};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Recursively copy a directory tree, preserving relative layout.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    ensure_dir(dst)?;

    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("unexpected path outside {}", src.display()))?;
        let target = dst.join(rel);

        let ty = entry.file_type();
        if ty.is_dir() {
            ensure_dir(&target)?;
        } else if ty.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = fs::read_link(src)
        .with_context(|| format!("failed to read symlink: {}", src.display()))?;
    std::os::unix::fs::symlink(&link, dst)
        .with_context(|| format!("failed to create symlink: {}", dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .map(|_| ())
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))
}

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write file: {}", path.display()))
}

/// Replace every occurrence of `from` with `to` in a text file.
///
/// Returns the number of replacements. Zero replacements is an error: an
/// edit that matches nothing means the source no longer looks the way the
/// recipe expects.
pub fn replace_in_file(path: &Path, from: &str, to: &str) -> Result<usize> {
    let contents = read_to_string(path)?;
    let count = contents.matches(from).count();
    if count == 0 {
        anyhow::bail!("`{}` not found in {}", from, path.display());
    }
    write_string(path, &contents.replace(from, to))?;
    Ok(count)
}

/// Whether `name` is a non-empty relative path that never climbs above its
/// base directory.
pub fn is_contained_relative(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && !path.is_absolute()
        && !path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(src.join("m4")).unwrap();
        std::fs::write(src.join("configure"), "#!/bin/sh\n").unwrap();
        std::fs::write(src.join("m4/ax_python.m4"), "dnl\n").unwrap();

        let dst = tmp.path().join("variants/python3/src");
        let copied = copy_tree(&src, &dst).unwrap();

        assert_eq!(copied, 2);
        assert!(dst.join("configure").exists());
        assert!(dst.join("m4/ax_python.m4").exists());
    }

    #[test]
    fn test_replace_in_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("configure");
        std::fs::write(&path, "LIBS=libboost_python libboost_python\n").unwrap();

        let n = replace_in_file(&path, "libboost_python", "libboost_python3").unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "LIBS=libboost_python3 libboost_python3\n"
        );
    }

    #[test]
    fn test_replace_in_file_requires_match() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("configure");
        std::fs::write(&path, "nothing here\n").unwrap();

        let err = replace_in_file(&path, "libboost_python", "x").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_remove_dir_all_if_exists_missing() {
        let tmp = TempDir::new().unwrap();
        assert!(remove_dir_all_if_exists(&tmp.path().join("absent")).is_ok());
    }

    #[test]
    fn test_is_contained_relative() {
        assert!(is_contained_relative("test.py"));
        assert!(is_contained_relative("data/graph..gt"));
        assert!(is_contained_relative("foo..bar"));
        assert!(!is_contained_relative("../evil.py"));
        assert!(!is_contained_relative("data/../../evil.py"));
        assert!(!is_contained_relative("/etc/passwd"));
        assert!(!is_contained_relative(""));
    }
}
