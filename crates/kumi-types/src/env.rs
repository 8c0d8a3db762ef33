//! Environment variables injected into every package command.
//!
//! These names are a stable public contract: scripts read them to find out
//! which package they are running in.

/// Name of the package the command runs in.
pub const PACKAGE_NAME_VAR: &str = "KUMI_PACKAGE_NAME";

/// Absolute path of the package directory (also the command's cwd).
pub const PACKAGE_PATH_VAR: &str = "KUMI_PACKAGE_PATH";

/// Declared version of the package.
pub const PACKAGE_VERSION_VAR: &str = "KUMI_PACKAGE_VERSION";
