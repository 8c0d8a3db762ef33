//! Change detection and release planning against real git repositories.

mod common;

use std::path::PathBuf;

use common::{chain_workspace, commit_all, init_repo, tag_head, touch};
use kumi_engine::filter::changed_packages;
use kumi_engine::{BumpType, GitError, GitRepo, PackageFilter, Workspace, plan_releases};
use tempfile::TempDir;

fn names(packages: Vec<&kumi_engine::Package>) -> Vec<&str> {
    packages.into_iter().map(|p| p.name.as_str()).collect()
}

/// Chain workspace with one initial commit tagged `base`.
fn repo_fixture() -> (TempDir, git2::Repository) {
    let dir = chain_workspace();
    let repo = init_repo(dir.path());
    commit_all(&repo, "chore: initial layout");
    tag_head(&repo, "base");
    (dir, repo)
}

// ============================================================================
// Changed files
// ============================================================================

#[test]
fn changed_files_cover_commits_and_worktree() {
    let (dir, repo) = repo_fixture();
    touch(dir.path(), "packages/core/lib.py", "x = 1\n");
    commit_all(&repo, "feat(core): add lib");
    touch(dir.path(), "packages/api/staged.py", "");
    let mut index = repo.index().unwrap();
    index.add_path(std::path::Path::new("packages/api/staged.py")).unwrap();
    index.write().unwrap();
    touch(dir.path(), "notes/untracked.txt", "todo\n");

    let git = GitRepo::open(dir.path()).unwrap();
    let files = git.changed_files_since("base").unwrap();

    let expected: Vec<PathBuf> = [
        "notes/untracked.txt",
        "packages/api/staged.py",
        "packages/core/lib.py",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    assert_eq!(files.into_iter().collect::<Vec<_>>(), expected);
}

#[test]
fn clean_tree_has_no_changes() {
    let (dir, _repo) = repo_fixture();
    let git = GitRepo::open(dir.path()).unwrap();
    assert!(git.changed_files_since("HEAD").unwrap().is_empty());
}

#[test]
fn unknown_reference_is_an_error() {
    let (dir, _repo) = repo_fixture();
    let git = GitRepo::open(dir.path()).unwrap();
    let err = git.changed_files_since("no-such-ref").unwrap_err();
    assert!(matches!(err, GitError::InvalidReference(ref r) if r == "no-such-ref"), "{err}");
}

#[test]
fn discover_finds_repo_from_subdirectory() {
    let (dir, _repo) = repo_fixture();
    let git = GitRepo::discover(&dir.path().join("packages/api")).unwrap();
    assert_eq!(git.root(), dir.path().canonicalize().unwrap());
}

// ============================================================================
// Changed packages
// ============================================================================

#[test]
fn changed_packages_maps_files_to_members() {
    let (dir, repo) = repo_fixture();
    touch(dir.path(), "packages/api/handler.py", "");
    touch(dir.path(), "README.md", "# root files belong to nobody\n");
    commit_all(&repo, "fix(api): handler");

    let ws = Workspace::load(dir.path()).unwrap();
    let git = GitRepo::open(dir.path()).unwrap();

    let direct = changed_packages(&ws, &git, "base", false).unwrap();
    assert_eq!(names(direct), ["api"]);

    let with_dependents = changed_packages(&ws, &git, "base", true).unwrap();
    assert_eq!(names(with_dependents), ["api", "cli"]);
}

#[test]
fn filter_since_intersects_with_scope() {
    let (dir, repo) = repo_fixture();
    touch(dir.path(), "packages/core/x.py", "");
    commit_all(&repo, "fix(core): x");

    let ws = Workspace::load(dir.path()).unwrap();

    let all = PackageFilter::new().with_since("base", true).apply(&ws).unwrap();
    assert_eq!(names(all), ["api", "cli", "core"]);

    let scoped = PackageFilter::new()
        .with_scope("c*")
        .with_since("base", true)
        .apply(&ws)
        .unwrap();
    assert_eq!(names(scoped), ["cli", "core"]);

    let direct = PackageFilter::new().with_since("base", false).apply(&ws).unwrap();
    assert_eq!(names(direct), ["core"]);
}

// ============================================================================
// History and tags
// ============================================================================

#[test]
fn commits_since_filters_by_path() {
    let (dir, repo) = repo_fixture();
    touch(dir.path(), "packages/core/a.py", "");
    commit_all(&repo, "feat(core): a");
    touch(dir.path(), "packages/api/b.py", "");
    commit_all(&repo, "fix(api): b");
    // Shares a prefix with `core` but is not inside it.
    touch(dir.path(), "packages/core-extras/c.py", "");
    commit_all(&repo, "docs: extras");

    let git = GitRepo::open(dir.path()).unwrap();

    let all = git.commits_since(Some("base"), None).unwrap();
    let messages: Vec<&str> = all.iter().map(|c| c.message.trim()).collect();
    assert_eq!(messages, ["docs: extras", "fix(api): b", "feat(core): a"]);

    let core = git
        .commits_since(Some("base"), Some(&dir.path().join("packages/core")))
        .unwrap();
    assert_eq!(core.len(), 1);
    assert_eq!(core[0].message.trim(), "feat(core): a");
    assert_eq!(core[0].sha.len(), 40);

    let relative = git
        .commits_since(Some("base"), Some(std::path::Path::new("packages/api")))
        .unwrap();
    assert_eq!(relative.len(), 1);
}

#[test]
fn commits_since_without_reference_walks_everything() {
    let (dir, repo) = repo_fixture();
    touch(dir.path(), "packages/core/a.py", "");
    commit_all(&repo, "feat: a");

    let git = GitRepo::open(dir.path()).unwrap();
    assert_eq!(git.commits_since(None, None).unwrap().len(), 2);
}

#[test]
fn commits_since_on_empty_repository_is_empty() {
    let dir = TempDir::new().unwrap();
    init_repo(dir.path());
    let git = GitRepo::open(dir.path()).unwrap();
    assert!(git.commits_since(None, None).unwrap().is_empty());
}

#[test]
fn latest_tag_picks_highest_version() {
    let (dir, repo) = repo_fixture();
    let ws = Workspace::load(dir.path()).unwrap();
    for tag in ["core@0.1.0", "core@0.10.0", "core@0.9.3", "api@9.9.9", "core@not-a-version"] {
        tag_head(&repo, tag);
    }

    let git = GitRepo::open(dir.path()).unwrap();
    let core = ws.package("core").unwrap();
    let latest = git.latest_package_tag(core, "{name}@{version}").unwrap().unwrap();
    assert_eq!(latest.tag, "core@0.10.0");
    assert_eq!(latest.version, semver::Version::new(0, 10, 0));

    let cli = ws.package("cli").unwrap();
    assert!(git.latest_package_tag(cli, "{name}@{version}").unwrap().is_none());
}

#[test]
fn custom_tag_format() {
    let (dir, repo) = repo_fixture();
    let ws = Workspace::load(dir.path()).unwrap();
    tag_head(&repo, "release/api/v1.2.3");

    let git = GitRepo::open(dir.path()).unwrap();
    let api = ws.package("api").unwrap();
    let latest = git
        .latest_package_tag(api, "release/{name}/v{version}")
        .unwrap()
        .unwrap();
    assert_eq!(latest.version, semver::Version::new(1, 2, 3));
}

// ============================================================================
// Release planning
// ============================================================================

#[test]
fn plan_uses_commits_since_each_package_tag() {
    let (dir, repo) = repo_fixture();
    tag_head(&repo, "core@0.1.0");
    tag_head(&repo, "api@0.1.0");
    touch(dir.path(), "packages/core/a.py", "");
    commit_all(&repo, "feat(core): widgets");
    touch(dir.path(), "packages/api/b.py", "");
    commit_all(&repo, "fix(api): crash\n\nBREAKING CHANGE: removed v1 routes");
    touch(dir.path(), "packages/cli/c.py", "");
    commit_all(&repo, "docs(cli): typo");

    let ws = Workspace::load(dir.path()).unwrap();
    let git = GitRepo::open(dir.path()).unwrap();
    let packages: Vec<_> = ws.packages().collect();

    let plan = plan_releases(&ws, &git, &packages, None, None).unwrap();
    let summary: Vec<(&str, String, BumpType)> = plan
        .iter()
        .map(|r| (r.name.as_str(), r.next.to_string(), r.bump))
        .collect();

    // cli only has a docs commit, which releases nothing.
    assert_eq!(
        summary,
        [
            ("api", "1.0.0".to_string(), BumpType::Major),
            ("core", "0.2.0".to_string(), BumpType::Minor),
        ]
    );
    assert_eq!(plan[1].tag, "core@0.2.0");
    assert_eq!(plan[1].commits.len(), 1);
    assert_eq!(plan[1].commits[0].description, "widgets");
    assert_eq!(plan[0].commits[0].kind, "fix");
    assert!(plan[0].commits[0].breaking);
}

#[test]
fn forced_bump_and_prerelease() {
    let (dir, _repo) = repo_fixture();
    let ws = Workspace::load(dir.path()).unwrap();
    let git = GitRepo::open(dir.path()).unwrap();
    let core = ws.package("core").unwrap();

    let plan = plan_releases(&ws, &git, &[core], Some(BumpType::Minor), Some("rc")).unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].next.to_string(), "0.2.0-rc.1");
    assert_eq!(plan[0].tag, "core@0.2.0-rc.1");
}

#[test]
fn nothing_to_release_without_new_commits() {
    let (dir, repo) = repo_fixture();
    tag_head(&repo, "core@0.1.0");
    let ws = Workspace::load(dir.path()).unwrap();
    let git = GitRepo::open(dir.path()).unwrap();
    let core = ws.package("core").unwrap();

    assert!(plan_releases(&ws, &git, &[core], None, None).unwrap().is_empty());
}
