//! Fixtures shared by the integration tests: on-disk workspaces and git
//! repositories in temporary directories.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use git2::{IndexAddOption, Oid, Repository, Signature};
use tempfile::TempDir;

/// One member to write: directory relative to the root, project name,
/// requirements.
pub struct Member<'a> {
    pub dir: &'a str,
    pub name: &'a str,
    pub deps: &'a [&'a str],
}

pub const fn member<'a>(dir: &'a str, name: &'a str, deps: &'a [&'a str]) -> Member<'a> {
    Member { dir, name, deps }
}

/// Write `kumi.toml` and one `pyproject.toml` per member under `root`.
pub fn write_workspace(root: &Path, config: &str, members: &[Member<'_>]) {
    fs::write(root.join("kumi.toml"), config).unwrap();
    for m in members {
        write_manifest(&root.join(m.dir), m.name, "0.1.0", m.deps);
    }
}

pub fn write_manifest(dir: &Path, name: &str, version: &str, deps: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    let deps: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
    let content = format!(
        "[project]\nname = \"{name}\"\nversion = \"{version}\"\ndescription = \"The {name} package\"\ndependencies = [{}]\n",
        deps.join(", ")
    );
    fs::write(dir.join("pyproject.toml"), content).unwrap();
}

/// The usual three-package chain: `cli -> api -> core`, plus a third-party
/// requirement that must not become an edge.
pub fn chain_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_workspace(
        dir.path(),
        "packages = [\"packages/*\"]\n",
        &[
            member("packages/core", "core", &["requests>=2"]),
            member("packages/api", "api", &["core"]),
            member("packages/cli", "cli", &["api", "click"]),
        ],
    );
    dir
}

// ============================================================================
// Git
// ============================================================================

pub fn init_repo(root: &Path) -> Repository {
    Repository::init(root).unwrap()
}

fn signature() -> Signature<'static> {
    Signature::now("Kumi Tests", "tests@kumi.invalid").unwrap()
}

/// Stage everything in the working tree and commit it on `HEAD`.
pub fn commit_all(repo: &Repository, message: &str) -> Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    let sig = signature();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Write `content` to `relative` under the repository root, creating parents.
pub fn touch(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Lightweight tag on `HEAD`.
pub fn tag_head(repo: &Repository, name: &str) {
    let head = repo.head().unwrap().peel(git2::ObjectType::Commit).unwrap();
    repo.tag_lightweight(name, &head, false).unwrap();
}
