//! Semantic version bumps.

use semver::{BuildMetadata, Prerelease, Version};

use super::{BumpType, VersionError};

/// Apply `bump` to `version`, optionally as a pre-release.
///
/// Without a pre-release id, the chosen field increments, lower fields reset,
/// and any pre-release or build suffix is cleared; `BumpType::None` returns
/// the version unchanged.
///
/// With an id, a version already on that id only advances its counter
/// (`1.2.0-rc.1` → `1.2.0-rc.2`). Anything else gets the core bump (at least
/// a patch) plus `-{id}.1`.
pub fn bump_version(
    version: &Version,
    bump: BumpType,
    prerelease: Option<&str>,
) -> Result<Version, VersionError> {
    let Some(id) = prerelease else {
        return Ok(bump_core(version, bump));
    };

    if let Some(counter) = prerelease_counter(&version.pre, id) {
        let mut next = version.clone();
        next.pre = make_prerelease(id, counter + 1)?;
        next.build = BuildMetadata::EMPTY;
        return Ok(next);
    }

    let mut next = bump_core(version, bump.max(BumpType::Patch));
    next.pre = make_prerelease(id, 1)?;
    Ok(next)
}

fn bump_core(version: &Version, bump: BumpType) -> Version {
    match bump {
        BumpType::None => version.clone(),
        BumpType::Patch => Version::new(version.major, version.minor, version.patch + 1),
        BumpType::Minor => Version::new(version.major, version.minor + 1, 0),
        BumpType::Major => Version::new(version.major + 1, 0, 0),
    }
}

/// `n` if `pre` is exactly `{id}.{n}`.
fn prerelease_counter(pre: &Prerelease, id: &str) -> Option<u64> {
    let (head, counter) = pre.as_str().rsplit_once('.')?;
    if head != id {
        return None;
    }
    counter.parse().ok()
}

fn make_prerelease(id: &str, counter: u64) -> Result<Prerelease, VersionError> {
    Prerelease::new(&format!("{id}.{counter}")).map_err(|source| VersionError::InvalidPrerelease {
        id: id.to_string(),
        source,
    })
}
