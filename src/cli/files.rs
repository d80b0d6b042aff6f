//! File collection for the scan command.
//!
//! The core scans exact file paths only; directory arguments are expanded
//! here. An extracted package is scanned as-is, so hidden files are included
//! and VCS ignore rules are not applied.

use anyhow::{bail, Result};
use ignore::WalkBuilder;
use std::path::PathBuf;

/// Expand files and directories into a sorted, duplicate-free file list
pub(super) fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            bail!("{} does not exist", path.display());
        }

        let walker = WalkBuilder::new(path)
            .hidden(false)
            .ignore(false)
            .parents(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .build();

        for entry in walker.filter_map(|e| e.ok()) {
            if entry.file_type().is_some_and(|t| t.is_file()) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directories_are_walked_including_hidden() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("pkg/sub")).expect("mkdir");
        std::fs::write(root.join("pkg/setup.py"), "x = 1").expect("write");
        std::fs::write(root.join("pkg/sub/.hidden.py"), "x = 1").expect("write");
        std::fs::write(root.join("pkg/.gitignore"), "*.py\n").expect("write");

        let files = collect_files(&[root.join("pkg"), root.join("pkg/setup.py")]).expect("collect");
        assert_eq!(
            files,
            vec![
                root.join("pkg/.gitignore"),
                root.join("pkg/setup.py"),
                root.join("pkg/sub/.hidden.py"),
            ]
        );
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        assert!(collect_files(&[dir.path().join("nope")]).is_err());
    }
}
