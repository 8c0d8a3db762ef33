//! kumi-engine (組): the core of kumi.
//!
//! This crate provides:
//!
//! - **Graph**: Package arena, dependency resolution, cycle detection, and
//!   dependent/dependency queries
//! - **Batches**: Lazy layered topological scheduling over a package subset
//! - **Exec**: Bounded-concurrency, fail-fast execution of shell commands
//!   across packages, in flat, batched, or streaming mode
//! - **Workspace**: `kumi.toml` config, member discovery, manifest reading
//! - **Filter**: Scope, ignore, and git-change package selection
//! - **Git**: Changed files, commit history, and release tags via libgit2
//! - **Versioning**: Conventional-commit parsing and release planning
//! - **Clean**: Removing build artifacts from package directories

pub mod clean;
pub mod exec;
pub mod filter;
pub mod git;
pub mod graph;
pub mod versioning;
pub mod workspace;

pub use clean::{CleanError, CleanReport, CleanTarget, clean_packages, find_targets};
pub use exec::{
    CommandOutput, DEFAULT_CONCURRENCY, ExecuteError, ExecutorConfig, LineSink, OutputHandler,
    PackageRunner, ParallelExecutor, ResultStream, RunOptions, ShellRunner, run_command,
};
pub use filter::{FilterError, PackageFilter};
pub use git::{CommitInfo, GitError, GitRepo, PackageTag};
pub use graph::{Batches, DependencyGraph, GraphError, PackageId};
pub use versioning::{BumpType, ParsedCommit, PlannedRelease, VersionError, plan_releases};
pub use workspace::{CleanConfig, Script, Workspace, WorkspaceConfig, WorkspaceError};

// Data types live in kumi-types; re-exported so most consumers need one crate.
pub use kumi_types::{BatchResult, ExecutionResult, ExecutionStatus, Package};
