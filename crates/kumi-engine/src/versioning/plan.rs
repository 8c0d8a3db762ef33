//! Release planning: what each package's next version would be.

use kumi_types::Package;
use semver::Version;
use serde::Serialize;

use super::{BumpType, ParsedCommit, VersionError, bump_version, determine_bump, parse_commit_message};
use crate::git::GitRepo;
use crate::workspace::Workspace;

/// The proposed release of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRelease {
    pub name: String,
    pub current: Version,
    pub next: Version,
    pub bump: BumpType,
    /// Tag the release would get under the workspace tag format.
    pub tag: String,
    /// Conventional commits since the previous release, newest first.
    pub commits: Vec<ParsedCommit>,
}

/// Plan releases for `packages`.
///
/// For each package, the commits since its latest release tag that touch its
/// directory decide the bump, unless `forced` overrides it. Packages with
/// nothing to release are left out. Nothing is written: no files, no tags.
pub fn plan_releases(
    workspace: &Workspace,
    repo: &GitRepo,
    packages: &[&Package],
    forced: Option<BumpType>,
    prerelease: Option<&str>,
) -> Result<Vec<PlannedRelease>, VersionError> {
    let tag_format = &workspace.config().versioning.tag_format;
    let mut plan = Vec::new();

    for package in packages {
        let current = Version::parse(&package.version).map_err(|source| VersionError::InvalidVersion {
            package: package.name.clone(),
            version: package.version.clone(),
            source,
        })?;

        let last_tag = repo.latest_package_tag(package, tag_format)?;
        let raw = repo.commits_since(last_tag.as_ref().map(|t| t.tag.as_str()), Some(package.path.as_path()))?;
        if raw.is_empty() && forced.is_none() {
            tracing::debug!(package = %package.name, "no commits since last release");
            continue;
        }

        let commits: Vec<ParsedCommit> = raw
            .iter()
            .filter_map(|c| parse_commit_message(&c.message, &c.sha))
            .collect();
        let bump = forced.unwrap_or_else(|| determine_bump(&commits));
        if bump == BumpType::None {
            continue;
        }

        let next = bump_version(&current, bump, prerelease)?;
        tracing::debug!(package = %package.name, %current, %next, %bump, "planned release");
        plan.push(PlannedRelease {
            name: package.name.clone(),
            tag: GitRepo::format_tag(tag_format, &package.name, &next),
            current,
            next,
            bump,
            commits,
        });
    }

    Ok(plan)
}
