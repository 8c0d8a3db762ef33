//! Removing build artifacts from package directories.
//!
//! Each selected package directory is walked once. An entry whose name is
//! protected is skipped together with everything below it. An entry matching
//! a clean pattern is removed whole (directories recursively) and not
//! descended into. Symlinks are never followed.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use kumi_types::Package;
use serde::Serialize;
use thiserror::Error;

use crate::filter::glob::glob_match;
use crate::workspace::CleanConfig;

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("failed to clean {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One file or directory slated for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanTarget {
    pub package: String,
    pub path: PathBuf,
    pub is_dir: bool,
    /// Total size of the regular files at or below `path`.
    pub bytes: u64,
}

/// Outcome of [`clean_packages`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub bytes_freed: u64,
    /// Packages that had anything to remove, in input order.
    pub packages_cleaned: Vec<String>,
    pub targets: Vec<CleanTarget>,
    /// Nothing was deleted; the counts say what would have been.
    pub dry_run: bool,
}

/// Everything `config` would remove from `packages`.
///
/// A path reachable from two packages (nested members) is listed once,
/// under the first package that reaches it.
pub fn find_targets(packages: &[&Package], config: &CleanConfig) -> Result<Vec<CleanTarget>, CleanError> {
    let mut seen = BTreeSet::new();
    let mut targets = Vec::new();
    for package in packages {
        let mut found = Vec::new();
        walk(&package.path, Path::new(""), config, &mut found).map_err(|source| CleanError::Io {
            path: package.path.clone(),
            source,
        })?;
        for (path, is_dir) in found {
            if !seen.insert(path.clone()) {
                continue;
            }
            let bytes = size_of(&path).map_err(|source| CleanError::Io {
                path: path.clone(),
                source,
            })?;
            targets.push(CleanTarget {
                package: package.name.clone(),
                path,
                is_dir,
                bytes,
            });
        }
    }
    Ok(targets)
}

/// Remove the artifacts `config` matches in `packages`.
///
/// With `dry_run` nothing is deleted and the report describes what would be.
pub fn clean_packages(
    packages: &[&Package],
    config: &CleanConfig,
    dry_run: bool,
) -> Result<CleanReport, CleanError> {
    let targets = find_targets(packages, config)?;
    let mut report = CleanReport {
        dry_run,
        ..CleanReport::default()
    };

    for target in &targets {
        if !dry_run {
            let removed = if target.is_dir {
                std::fs::remove_dir_all(&target.path)
            } else {
                std::fs::remove_file(&target.path)
            };
            removed.map_err(|source| CleanError::Io {
                path: target.path.clone(),
                source,
            })?;
            tracing::debug!(package = %target.package, path = %target.path.display(), "removed");
        }
        if target.is_dir {
            report.dirs_removed += 1;
        } else {
            report.files_removed += 1;
        }
        report.bytes_freed += target.bytes;
        if !report.packages_cleaned.contains(&target.package) {
            report.packages_cleaned.push(target.package.clone());
        }
    }

    tracing::info!(
        files = report.files_removed,
        dirs = report.dirs_removed,
        bytes = report.bytes_freed,
        dry_run,
        "clean finished"
    );
    report.targets = targets;
    Ok(report)
}

fn walk(dir: &Path, relative: &Path, config: &CleanConfig, found: &mut Vec<(PathBuf, bool)>) -> io::Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if config.protected.iter().any(|p| glob_match(p, name)) {
            continue;
        }

        let file_type = entry.file_type()?;
        let rel = relative.join(name);
        if is_artifact(config, name, &rel) {
            found.push((entry.path(), file_type.is_dir()));
        } else if file_type.is_dir() {
            walk(&entry.path(), &rel, config, found)?;
        }
    }
    Ok(())
}

fn is_artifact(config: &CleanConfig, name: &str, relative: &Path) -> bool {
    config.patterns.iter().any(|pattern| {
        if pattern.contains('/') {
            relative.to_str().is_some_and(|rel| glob_match(pattern, rel))
        } else {
            glob_match(pattern, name)
        }
    })
}

/// Bytes in regular files at or below `path`, without following symlinks.
fn size_of(path: &Path) -> io::Result<u64> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_file() {
        return Ok(meta.len());
    }
    if !meta.is_dir() {
        return Ok(0);
    }
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        total += size_of(&entry?.path())?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, bytes: usize) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![b'x'; bytes]).unwrap();
    }

    fn package_with_artifacts() -> (TempDir, Package) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/core/__init__.py", 10);
        write(root, "src/core/__pycache__/__init__.cpython-312.pyc", 100);
        write(root, "src/core/stale.pyc", 7);
        write(root, "dist/core-0.1.0.tar.gz", 300);
        write(root, ".venv/lib/site/__pycache__/x.pyc", 50);
        write(root, ".pytest_cache/v/cache/nodeids", 20);
        let pkg = Package::new("core", root.to_path_buf(), "0.1.0");
        (dir, pkg)
    }

    #[test]
    fn test_targets_skip_protected_and_do_not_descend() {
        let (dir, pkg) = package_with_artifacts();
        let targets = find_targets(&[&pkg], &CleanConfig::default()).unwrap();

        let rel: Vec<(String, bool, u64)> = targets
            .iter()
            .map(|t| {
                let path = t.path.strip_prefix(dir.path()).unwrap();
                (path.display().to_string(), t.is_dir, t.bytes)
            })
            .collect();
        assert_eq!(
            rel,
            [
                (".pytest_cache".to_string(), true, 20),
                ("dist".to_string(), true, 300),
                ("src/core/__pycache__".to_string(), true, 100),
                ("src/core/stale.pyc".to_string(), false, 7),
            ]
        );
    }

    #[test]
    fn test_dry_run_reports_without_deleting() {
        let (dir, pkg) = package_with_artifacts();
        let report = clean_packages(&[&pkg], &CleanConfig::default(), true).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.dirs_removed, 3);
        assert_eq!(report.bytes_freed, 427);
        assert_eq!(report.packages_cleaned, ["core"]);
        assert!(dir.path().join("dist/core-0.1.0.tar.gz").exists());
    }

    #[test]
    fn test_clean_removes_artifacts_only() {
        let (dir, pkg) = package_with_artifacts();
        let report = clean_packages(&[&pkg], &CleanConfig::default(), false).unwrap();

        assert_eq!(report.bytes_freed, 427);
        assert!(!dir.path().join("dist").exists());
        assert!(!dir.path().join("src/core/__pycache__").exists());
        assert!(!dir.path().join("src/core/stale.pyc").exists());
        assert!(dir.path().join("src/core/__init__.py").exists());
        assert!(dir.path().join(".venv/lib/site/__pycache__/x.pyc").exists());

        let again = clean_packages(&[&pkg], &CleanConfig::default(), false).unwrap();
        assert_eq!(again, CleanReport::default());
    }

    #[test]
    fn test_slash_patterns_match_relative_paths() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "coverage/report.xml", 5);
        write(dir.path(), "coverage/keep.txt", 5);
        write(dir.path(), "docs/coverage/report.xml", 5);
        let pkg = Package::new("core", dir.path().to_path_buf(), "0.1.0");
        let config = CleanConfig {
            patterns: vec!["coverage/*.xml".to_string()],
            protected: Vec::new(),
        };

        let targets = find_targets(&[&pkg], &config).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].path, dir.path().join("coverage/report.xml"));
    }

    #[test]
    fn test_nested_members_list_each_path_once() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "inner/build/out.whl", 9);
        let outer = Package::new("outer", dir.path().to_path_buf(), "1.0.0");
        let inner = Package::new("inner", dir.path().join("inner"), "1.0.0");

        let report = clean_packages(&[&outer, &inner], &CleanConfig::default(), true).unwrap();
        assert_eq!(report.dirs_removed, 1);
        assert_eq!(report.packages_cleaned, ["outer"]);
    }
}
