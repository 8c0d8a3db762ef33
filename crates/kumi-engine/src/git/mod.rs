//! Git queries for change detection and release planning, via libgit2.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use git2::{Commit, DiffOptions, Repository, Sort, Tree};
use kumi_types::Package;
use regex::Regex;
use thiserror::Error;

/// Errors from git queries.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("git: {0}")]
    Git(#[from] git2::Error),
    #[error("invalid git reference '{0}'")]
    InvalidReference(String),
    #[error("repository at {} has no working directory", .0.display())]
    Bare(PathBuf),
    #[error("invalid tag format '{0}': must contain {{version}}")]
    InvalidTagFormat(String),
}

/// One commit, as needed for release planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
}

/// A release tag resolved to a package version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageTag {
    pub tag: String,
    pub version: semver::Version,
}

/// A non-bare git repository.
pub struct GitRepo {
    repo: Repository,
    /// Canonical working directory.
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo").field("root", &self.root).finish()
    }
}

impl GitRepo {
    /// Open the repository containing `path`, searching upwards.
    pub fn discover(path: &Path) -> Result<Self, GitError> {
        Self::from_repository(Repository::discover(path)?)
    }

    /// Open the repository whose working directory is exactly `path`.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        Self::from_repository(Repository::open(path)?)
    }

    fn from_repository(repo: Repository) -> Result<Self, GitError> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| GitError::Bare(repo.path().to_path_buf()))?;
        let root = std::fs::canonicalize(workdir).unwrap_or_else(|_| workdir.to_path_buf());
        Ok(Self { repo, root })
    }

    /// Working directory root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Changes
    // ═══════════════════════════════════════════════════════════════════════

    /// Files changed since `reference`, relative to the repository root.
    ///
    /// Covers commits between the merge-base of `reference` and `HEAD` and
    /// `HEAD`, plus staged, unstaged, and untracked files. Renames report
    /// both sides.
    pub fn changed_files_since(&self, reference: &str) -> Result<BTreeSet<PathBuf>, GitError> {
        let head = self.repo.head()?.peel_to_commit()?;
        let base = self.resolve_commit(reference)?;
        let merge_base = self.repo.merge_base(base.id(), head.id()).unwrap_or(base.id());

        let old_tree = self.repo.find_commit(merge_base)?.tree()?;
        let head_tree = head.tree()?;

        let mut changed = BTreeSet::new();

        let committed = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&head_tree), None)?;
        collect_paths(&committed, &mut changed);

        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let working = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&head_tree), Some(&mut opts))?;
        collect_paths(&working, &mut changed);

        tracing::debug!(reference, files = changed.len(), "changed files");
        Ok(changed)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // History
    // ═══════════════════════════════════════════════════════════════════════

    /// Commits reachable from `HEAD` but not from `reference`, newest first.
    ///
    /// With no reference the whole history is walked. With a `path`, only
    /// commits touching something under it are returned; the path may be
    /// absolute (inside the repository) or relative to the root.
    pub fn commits_since(
        &self,
        reference: Option<&str>,
        path: Option<&Path>,
    ) -> Result<Vec<CommitInfo>, GitError> {
        if self.repo.head().is_err() {
            return Ok(Vec::new());
        }

        let mut walk = self.repo.revwalk()?;
        walk.push_head()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        if let Some(reference) = reference {
            walk.hide(self.resolve_commit(reference)?.id())?;
        }

        let scope = path.map(|p| self.relative(p)).filter(|p| !p.as_os_str().is_empty());

        let mut commits = Vec::new();
        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            if let Some(scope) = &scope
                && !self.touches(&commit, scope)?
            {
                continue;
            }
            commits.push(CommitInfo {
                sha: commit.id().to_string(),
                message: commit.message().unwrap_or("").to_string(),
            });
        }
        Ok(commits)
    }

    /// True if `commit` changed anything under `scope` relative to its first
    /// parent (or the empty tree for a root commit).
    fn touches(&self, commit: &Commit<'_>, scope: &Path) -> Result<bool, GitError> {
        let tree = commit.tree()?;
        let parent_tree: Option<Tree<'_>> = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };

        let mut opts = DiffOptions::new();
        opts.pathspec(scope);
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

        // Pathspecs are prefix matches; insist on a component boundary.
        Ok(diff.deltas().any(|delta| {
            [delta.new_file().path(), delta.old_file().path()]
                .into_iter()
                .flatten()
                .any(|p| p.starts_with(scope))
        }))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Tags
    // ═══════════════════════════════════════════════════════════════════════

    /// The highest-versioned tag for `package` under `tag_format`, where
    /// `{name}` and `{version}` are placeholders.
    pub fn latest_package_tag(
        &self,
        package: &Package,
        tag_format: &str,
    ) -> Result<Option<PackageTag>, GitError> {
        let pattern = tag_pattern(tag_format, &package.name)?;

        let mut best: Option<PackageTag> = None;
        for tag in self.repo.tag_names(None)?.iter().flatten() {
            let Some(version) = pattern
                .captures(tag)
                .and_then(|c| semver::Version::parse(&c["version"]).ok())
            else {
                continue;
            };
            if best.as_ref().is_none_or(|b| version > b.version) {
                best = Some(PackageTag {
                    tag: tag.to_string(),
                    version,
                });
            }
        }
        Ok(best)
    }

    /// Render a tag name for `package` at `version`.
    pub fn format_tag(tag_format: &str, package: &str, version: &semver::Version) -> String {
        tag_format
            .replace("{name}", package)
            .replace("{version}", &version.to_string())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════

    fn resolve_commit(&self, reference: &str) -> Result<Commit<'_>, GitError> {
        self.repo
            .revparse_single(reference)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|_| GitError::InvalidReference(reference.to_string()))
    }

    /// `path` relative to the root; relative paths pass through.
    fn relative(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            return path.to_path_buf();
        }
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or(path)
    }
}

fn collect_paths(diff: &git2::Diff<'_>, out: &mut BTreeSet<PathBuf>) {
    for delta in diff.deltas() {
        for path in [delta.old_file().path(), delta.new_file().path()]
            .into_iter()
            .flatten()
        {
            out.insert(path.to_path_buf());
        }
    }
}

/// Compile a tag format into a regex with a `version` capture group.
fn tag_pattern(tag_format: &str, package: &str) -> Result<Regex, GitError> {
    let escaped = regex::escape(tag_format);
    let version_slot = regex::escape("{version}");
    if !escaped.contains(&version_slot) {
        return Err(GitError::InvalidTagFormat(tag_format.to_string()));
    }
    let source = escaped
        .replace(&regex::escape("{name}"), &regex::escape(package))
        .replacen(&version_slot, "(?P<version>.+)", 1);
    Regex::new(&format!("^{source}$")).map_err(|_| GitError::InvalidTagFormat(tag_format.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_pattern_extracts_version() {
        let re = tag_pattern("{name}@{version}", "core").unwrap();
        assert_eq!(&re.captures("core@1.2.3").unwrap()["version"], "1.2.3");
        assert!(re.captures("core-lib@1.2.3").is_none());
        assert!(re.captures("api@1.2.3").is_none());
    }

    #[test]
    fn tag_pattern_escapes_metacharacters() {
        let re = tag_pattern("v{version}+{name}", "a.b").unwrap();
        assert!(re.is_match("v0.1.0+a.b"));
        assert!(!re.is_match("v0.1.0+axb"));
    }

    #[test]
    fn tag_format_needs_version() {
        assert!(matches!(
            tag_pattern("{name}", "core"),
            Err(GitError::InvalidTagFormat(_))
        ));
    }

    #[test]
    fn format_tag_substitutes() {
        let v = semver::Version::new(1, 4, 0);
        assert_eq!(GitRepo::format_tag("{name}@{version}", "core", &v), "core@1.4.0");
    }
}
