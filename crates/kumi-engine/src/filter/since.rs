//! `--since`: select packages touched since a git reference.

use std::collections::BTreeSet;

use kumi_types::Package;

use super::FilterError;
use crate::git::GitRepo;
use crate::workspace::Workspace;

/// Packages with at least one changed file since `since`, in name order.
///
/// A file belongs to the deepest package directory containing it; files
/// outside every package are ignored. With `include_dependents`, everything
/// that transitively depends on a changed package is added.
pub fn changed_packages<'w>(
    workspace: &'w Workspace,
    repo: &GitRepo,
    since: &str,
    include_dependents: bool,
) -> Result<Vec<&'w Package>, FilterError> {
    let files = repo.changed_files_since(since)?;

    let mut hit: BTreeSet<&str> = BTreeSet::new();
    for file in &files {
        if let Some(pkg) = workspace.package_for_path(&repo.root().join(file)) {
            hit.insert(pkg.name.as_str());
        }
    }

    let changed: Vec<&Package> = workspace
        .packages()
        .filter(|p| hit.contains(p.name.as_str()))
        .collect();
    tracing::debug!(since, files = files.len(), packages = changed.len(), "mapped changes to packages");

    if include_dependents {
        Ok(workspace.graph().affected(changed)?)
    } else {
        Ok(changed)
    }
}
