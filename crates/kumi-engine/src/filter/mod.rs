//! Package selection.
//!
//! [`PackageFilter`] composes the individual filters in a fixed order:
//!
//! ```text
//!   workspace packages
//!     → names (if any) else scope
//!     → since (git changes, optionally plus dependents)
//!     → ignore
//! ```
//!
//! The result keeps workspace (name) order.

pub mod glob;
pub mod ignore;
pub mod scope;
pub mod since;

use std::collections::HashSet;

use kumi_types::Package;
use thiserror::Error;

use crate::git::{GitError, GitRepo};
use crate::graph::GraphError;
use crate::workspace::Workspace;

pub use glob::glob_match;
pub use ignore::{filter_by_ignore, should_ignore};
pub use scope::{filter_by_scope, matches_scope, parse_scope};
pub use since::changed_packages;

/// Errors from applying a filter.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Selection criteria shared by every command that targets packages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFilter {
    /// Explicit package names. When non-empty, `scope` is not consulted.
    pub names: Vec<String>,
    /// Comma-separated names or globs.
    pub scope: Option<String>,
    /// Exclusion globs (name, normalized name, or path).
    pub ignore: Vec<String>,
    /// Git reference; keep only packages changed since it.
    pub since: Option<String>,
    /// With `since`, also keep dependents of changed packages.
    pub include_dependents: bool,
}

impl PackageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_ignore<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn with_since(mut self, reference: impl Into<String>, include_dependents: bool) -> Self {
        self.since = Some(reference.into());
        self.include_dependents = include_dependents;
        self
    }

    /// Select packages from `workspace`. Opens the enclosing git repository
    /// only when `since` is set.
    pub fn apply<'w>(&self, workspace: &'w Workspace) -> Result<Vec<&'w Package>, FilterError> {
        match &self.since {
            Some(_) => {
                let repo = GitRepo::discover(workspace.root())?;
                self.apply_with_repo(workspace, &repo)
            }
            None => self.select(workspace, None),
        }
    }

    /// Like [`apply`](Self::apply) with an already-open repository.
    pub fn apply_with_repo<'w>(
        &self,
        workspace: &'w Workspace,
        repo: &GitRepo,
    ) -> Result<Vec<&'w Package>, FilterError> {
        self.select(workspace, Some(repo))
    }

    fn select<'w>(
        &self,
        workspace: &'w Workspace,
        repo: Option<&GitRepo>,
    ) -> Result<Vec<&'w Package>, FilterError> {
        let mut selected: Vec<&Package> = if self.names.is_empty() {
            filter_by_scope(workspace.packages(), self.scope.as_deref())
        } else {
            let wanted: HashSet<&str> = self.names.iter().map(String::as_str).collect();
            for name in &wanted {
                if !workspace.graph().contains(name) {
                    return Err(GraphError::UnknownPackage((*name).to_string()).into());
                }
            }
            workspace
                .packages()
                .filter(|p| wanted.contains(p.name.as_str()))
                .collect()
        };

        if let (Some(since), Some(repo)) = (&self.since, repo) {
            let changed: HashSet<&str> =
                changed_packages(workspace, repo, since, self.include_dependents)?
                    .into_iter()
                    .map(|p| p.name.as_str())
                    .collect();
            selected.retain(|p| changed.contains(p.name.as_str()));
        }

        let selected = filter_by_ignore(selected, &self.ignore);
        tracing::debug!(selected = selected.len(), total = workspace.graph().len(), "filtered packages");
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceConfig;

    fn workspace() -> Workspace {
        let pkgs = vec![
            Package::new("core", "/ws/packages/core", "1.0.0"),
            Package::new("api", "/ws/packages/api", "1.0.0").with_dependencies(["core"]),
            Package::new("http-lib", "/ws/libs/http-lib", "1.0.0"),
            Package::new("cli", "/ws/packages/cli", "1.0.0").with_dependencies(["api"]),
        ];
        Workspace::from_parts("/ws", WorkspaceConfig::default(), pkgs).unwrap()
    }

    fn names(pkgs: &[&Package]) -> Vec<String> {
        pkgs.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn test_default_selects_all_in_name_order() {
        let ws = workspace();
        let selected = PackageFilter::new().apply(&ws).unwrap();
        assert_eq!(names(&selected), ["api", "cli", "core", "http-lib"]);
    }

    #[test]
    fn test_scope_then_ignore() {
        let ws = workspace();
        let filter = PackageFilter::new()
            .with_scope("c*,http-lib")
            .with_ignore(["*/libs/*"]);
        assert_eq!(names(&filter.apply(&ws).unwrap()), ["cli", "core"]);
    }

    #[test]
    fn test_names_override_scope() {
        let ws = workspace();
        let filter = PackageFilter::new().with_names(["core", "api"]).with_scope("cli");
        assert_eq!(names(&filter.apply(&ws).unwrap()), ["api", "core"]);
    }

    #[test]
    fn test_unknown_name_is_error() {
        let ws = workspace();
        let err = PackageFilter::new().with_names(["ghost"]).apply(&ws).unwrap_err();
        assert!(matches!(err, FilterError::Graph(GraphError::UnknownPackage(_))));
    }
}
