//! Package: one member of a workspace.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// A workspace member as discovered from its manifest.
///
/// Packages are read-only once discovery has finished. A version bump produces
/// a new workspace snapshot on the next load; nothing mutates a `Package` in
/// place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    /// Normalized package name, unique within the workspace.
    pub name: String,
    /// Absolute path to the package directory.
    pub path: PathBuf,
    /// Version string as declared in the manifest.
    pub version: String,
    /// Optional one-line description.
    pub description: Option<String>,
    /// Names of other workspace packages this one depends on, in declaration
    /// order. Third-party dependencies never appear here.
    pub workspace_dependencies: Vec<String>,
}

impl Package {
    /// Create a package with no description and no dependencies.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            version: version.into(),
            description: None,
            workspace_dependencies: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the workspace dependencies. Duplicates are dropped, first
    /// occurrence wins.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workspace_dependencies.clear();
        for dep in deps {
            let dep = dep.into();
            if !self.workspace_dependencies.contains(&dep) {
                self.workspace_dependencies.push(dep);
            }
        }
        self
    }

    /// Package directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if this package declares a dependency on `name`.
    pub fn depends_on(&self, name: &str) -> bool {
        self.workspace_dependencies.iter().any(|d| d == name)
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Normalize a package name the way Python packaging does (PEP 503):
/// lowercase, with every run of `-`, `_` and `.` collapsed into a single `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.extend(c.to_lowercase());
    }
    out
}
