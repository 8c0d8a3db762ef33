//! Workspace discovery and loading.
//!
//! ```text
//!   kumi.toml ──> WorkspaceConfig ──> member globs ──> member dirs
//!                                                        │
//!                               pyproject.toml (each) <──┘
//!                                        │
//!                  ignore ──> Vec<Package> ──> DependencyGraph
//! ```
//!
//! A [`Workspace`] is an immutable snapshot: reload to pick up edits.

mod config;
mod manifest;

pub use config::{
    CONFIG_FILE, CleanConfig, CommandDefaults, Script, VersioningConfig, WorkspaceConfig,
};
pub use manifest::{MANIFEST_FILE, Manifest, parse_manifest, read_manifest, requirement_name};

use std::collections::{BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use kumi_types::Package;
use thiserror::Error;

use crate::filter::glob::{expand_braces, glob_match, is_glob};
use crate::filter::ignore::should_ignore;
use crate::graph::{DependencyGraph, GraphError};

/// Errors from discovering or loading a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("no kumi.toml found in {} or any parent directory", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A loaded workspace: root, config, and the resolved package graph.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config: WorkspaceConfig,
    graph: DependencyGraph,
}

impl Workspace {
    /// Find the nearest workspace root at or above `start` and load it.
    pub fn discover(start: &Path) -> Result<Self, WorkspaceError> {
        let root = Self::find_root(start)?;
        Self::load(&root)
    }

    /// The nearest directory at or above `start` containing `kumi.toml`.
    pub fn find_root(start: &Path) -> Result<PathBuf, WorkspaceError> {
        let start = canonical(start)?;
        start
            .ancestors()
            .find(|dir| dir.join(CONFIG_FILE).is_file())
            .map(Path::to_path_buf)
            .ok_or(WorkspaceError::NotFound(start))
    }

    /// Load the workspace rooted at `root`.
    pub fn load(root: &Path) -> Result<Self, WorkspaceError> {
        let root = canonical(root)?;
        let config = WorkspaceConfig::load_from(&root.join(CONFIG_FILE))?;

        let mut manifests = Vec::new();
        for dir in member_dirs(&root, &config.packages)? {
            let manifest = read_manifest(&dir)?;
            manifests.push((dir, manifest));
        }

        let members: HashSet<String> = manifests.iter().map(|(_, m)| m.name.clone()).collect();
        let packages: Vec<Package> = manifests
            .into_iter()
            .map(|(dir, m)| {
                let deps = m.requirements.into_iter().filter(|r| members.contains(r));
                let pkg = Package::new(m.name, dir, m.version).with_dependencies(deps);
                match m.description {
                    Some(desc) => pkg.with_description(desc),
                    None => pkg,
                }
            })
            .collect();

        let ws = Self::from_parts(root, config, packages)?;
        tracing::info!(root = %ws.root.display(), packages = ws.graph.len(), "loaded workspace");
        Ok(ws)
    }

    /// Assemble a workspace from packages already in hand. Packages matching
    /// the config's `ignore` list are dropped, along with edges to them.
    pub fn from_parts(
        root: impl Into<PathBuf>,
        config: WorkspaceConfig,
        packages: Vec<Package>,
    ) -> Result<Self, WorkspaceError> {
        let (kept, dropped): (Vec<Package>, Vec<Package>) = packages
            .into_iter()
            .partition(|p| !should_ignore(p, &config.ignore));
        for pkg in &dropped {
            tracing::debug!(package = %pkg.name, "ignored by workspace config");
        }

        // Edges to ignored packages go; anything else unresolved is still an error.
        let dropped: HashSet<String> = dropped.into_iter().map(|p| p.name).collect();
        let kept: Vec<Package> = kept
            .into_iter()
            .map(|p| {
                let deps: Vec<String> = p
                    .workspace_dependencies
                    .iter()
                    .filter(|d| !dropped.contains(*d))
                    .cloned()
                    .collect();
                p.with_dependencies(deps)
            })
            .collect();

        Ok(Self {
            root: root.into(),
            config,
            graph: DependencyGraph::new(kept)?,
        })
    }

    /// Display name: the configured name, else the root directory name.
    pub fn name(&self) -> &str {
        self.config
            .name
            .as_deref()
            .or_else(|| self.root.file_name().and_then(|n| n.to_str()))
            .unwrap_or("workspace")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// All packages in name order.
    pub fn packages(&self) -> impl ExactSizeIterator<Item = &Package> + '_ {
        self.graph.packages()
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.graph.get(name)
    }

    /// The package whose directory contains `path` (absolute). The deepest
    /// package directory wins when members nest.
    pub fn package_for_path(&self, path: &Path) -> Option<&Package> {
        self.packages()
            .filter(|p| path.starts_with(&p.path))
            .max_by_key(|p| p.path.components().count())
    }
}

fn canonical(path: &Path) -> Result<PathBuf, WorkspaceError> {
    std::fs::canonicalize(path).map_err(|source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Directories matched by the member globs that contain a manifest, sorted.
fn member_dirs(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, WorkspaceError> {
    let mut found = BTreeSet::new();
    for pattern in patterns {
        for expanded in expand_braces(pattern) {
            let segments: Vec<&str> = expanded.split('/').collect();
            walk_members(root, &segments, &mut found).map_err(|source| WorkspaceError::Io {
                path: root.join(&expanded),
                source,
            })?;
        }
    }
    Ok(found.into_iter().collect())
}

fn walk_members(dir: &Path, segments: &[&str], found: &mut BTreeSet<PathBuf>) -> io::Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        if dir.join(MANIFEST_FILE).is_file() {
            found.insert(dir.to_path_buf());
        } else {
            tracing::debug!(dir = %dir.display(), "member glob matched a directory without a manifest");
        }
        return Ok(());
    };

    match *segment {
        "" | "." => walk_members(dir, rest, found),
        "**" => {
            walk_members(dir, rest, found)?;
            for child in subdirs(dir)? {
                walk_members(&child, segments, found)?;
            }
            Ok(())
        }
        pattern if is_glob(pattern) => {
            for child in subdirs(dir)? {
                let matched = child
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| glob_match(pattern, name));
                if matched {
                    walk_members(&child, rest, found)?;
                }
            }
            Ok(())
        }
        literal => {
            let next = dir.join(literal);
            if next.is_dir() {
                walk_members(&next, rest, found)?;
            }
            Ok(())
        }
    }
}

/// Visible subdirectories, sorted.
fn subdirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let hidden = entry.file_name().to_str().is_none_or(|n| n.starts_with('.'));
        if !hidden && entry.file_type()?.is_dir() {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}
