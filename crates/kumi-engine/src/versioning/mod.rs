//! Version planning from conventional commits.
//!
//! ```text
//!   latest tag ──> commits since (touching package dir)
//!                       │ parse_commit_message
//!                       ▼
//!                  ParsedCommit[] ──determine_bump──> BumpType
//!                                                        │ bump_version
//!                                                        ▼
//!                                                  PlannedRelease
//! ```

mod conventional;
mod plan;
mod version;

pub use conventional::{BumpType, ParsedCommit, determine_bump, parse_commit_message};
pub use plan::{PlannedRelease, plan_releases};
pub use version::bump_version;

use thiserror::Error;

use crate::git::GitError;

/// Errors from release planning.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("package '{package}' has invalid version '{version}': {source}")]
    InvalidVersion {
        package: String,
        version: String,
        #[source]
        source: semver::Error,
    },
    #[error("invalid pre-release id '{id}': {source}")]
    InvalidPrerelease {
        id: String,
        #[source]
        source: semver::Error,
    },
    #[error(transparent)]
    Git(#[from] GitError),
}
