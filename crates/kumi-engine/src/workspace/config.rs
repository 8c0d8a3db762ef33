//! `kumi.toml`, the workspace configuration file.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::WorkspaceError;
use crate::exec::DEFAULT_CONCURRENCY;

/// File name that marks a workspace root.
pub const CONFIG_FILE: &str = "kumi.toml";

/// Workspace configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Display name. Defaults to the root directory name.
    #[serde(default)]
    pub name: Option<String>,

    /// Member directory globs, relative to the root.
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    /// Packages excluded from every command (name, normalized name, or path
    /// globs).
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Environment overlay for every command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Named scripts for `kumi run`.
    #[serde(default)]
    pub scripts: BTreeMap<String, Script>,

    #[serde(default)]
    pub command_defaults: CommandDefaults,

    #[serde(default)]
    pub versioning: VersioningConfig,

    #[serde(default)]
    pub clean: CleanConfig,
}

fn default_packages() -> Vec<String> {
    vec!["packages/*".to_string()]
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            name: None,
            packages: default_packages(),
            ignore: Vec::new(),
            env: BTreeMap::new(),
            scripts: BTreeMap::new(),
            command_defaults: CommandDefaults::default(),
            versioning: VersioningConfig::default(),
            clean: CleanConfig::default(),
        }
    }
}

impl WorkspaceConfig {
    /// Read and parse a config file.
    pub fn load_from(path: &Path) -> Result<Self, WorkspaceError> {
        let content = std::fs::read_to_string(path).map_err(|source| WorkspaceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| WorkspaceError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config text.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Look up a script by name.
    pub fn script(&self, name: &str) -> Option<&Script> {
        self.scripts.get(name)
    }
}

/// A named script. Accepts either a bare command string or a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ScriptEntry")]
pub struct Script {
    /// Shell command to run in each package.
    pub run: String,
    pub description: Option<String>,
    /// Default scope when the command line gives none.
    pub scope: Option<String>,
    pub fail_fast: bool,
    /// Overrides `command_defaults.topological` when set.
    pub topological: Option<bool>,
    /// Layered over the workspace `[env]`.
    pub env: BTreeMap<String, String>,
}

impl Script {
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            description: None,
            scope: None,
            fail_fast: false,
            topological: None,
            env: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptEntry {
    Command(String),
    Table(ScriptTable),
}

#[derive(Deserialize)]
struct ScriptTable {
    run: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    fail_fast: bool,
    #[serde(default)]
    topological: Option<bool>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

impl From<ScriptEntry> for Script {
    fn from(entry: ScriptEntry) -> Self {
        match entry {
            ScriptEntry::Command(run) => Script::new(run),
            ScriptEntry::Table(t) => Script {
                run: t.run,
                description: t.description,
                scope: t.scope,
                fail_fast: t.fail_fast,
                topological: t.topological,
                env: t.env,
            },
        }
    }
}

/// Defaults for `run` and `exec` when neither the script nor the command line
/// says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDefaults {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_true")]
    pub topological: bool,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_true() -> bool {
    true
}

impl Default for CommandDefaults {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            fail_fast: false,
            topological: true,
        }
    }
}

/// Release tag settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersioningConfig {
    /// Tag name template; `{name}` and `{version}` are substituted.
    #[serde(default = "default_tag_format")]
    pub tag_format: String,
}

fn default_tag_format() -> String {
    "{name}@{version}".to_string()
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            tag_format: default_tag_format(),
        }
    }
}

/// What `kumi clean` removes from each package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Globs for build artifacts. A pattern without `/` matches an entry
    /// name at any depth; one with `/` matches the path relative to the
    /// package directory.
    #[serde(default = "default_clean_patterns")]
    pub patterns: Vec<String>,

    /// Entry names that are never removed or descended into.
    #[serde(default = "default_protected")]
    pub protected: Vec<String>,
}

fn default_clean_patterns() -> Vec<String> {
    [
        "__pycache__",
        "*.pyc",
        ".pytest_cache",
        ".mypy_cache",
        ".ruff_cache",
        "*.egg-info",
        "dist",
        "build",
    ]
    .map(String::from)
    .to_vec()
}

fn default_protected() -> Vec<String> {
    vec![".venv".to_string(), ".git".to_string()]
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            patterns: default_clean_patterns(),
            protected: default_protected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = WorkspaceConfig::parse("").expect("parse failed");
        assert_eq!(config, WorkspaceConfig::default());
        assert_eq!(config.packages, ["packages/*"]);
        assert_eq!(config.command_defaults.concurrency, 4);
        assert!(config.command_defaults.topological);
        assert_eq!(config.versioning.tag_format, "{name}@{version}");
        assert!(config.clean.patterns.iter().any(|p| p == "__pycache__"));
        assert_eq!(config.clean.protected, [".venv", ".git"]);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
name = "mono"
packages = ["packages/*", "libs/**"]
ignore = ["*-experimental"]

[env]
CI = "1"

[scripts]
test = "pytest -q"

[scripts.lint]
run = "ruff check ."
description = "Lint"
scope = "core,*-lib"
fail_fast = true
topological = false
env = { RUFF_CACHE_DIR = ".cache" }

[command_defaults]
concurrency = 8
fail_fast = true

[versioning]
tag_format = "v{version}-{name}"

[clean]
patterns = ["dist", "coverage/*.xml"]
"#;
        let config = WorkspaceConfig::parse(toml).expect("parse failed");
        assert_eq!(config.name.as_deref(), Some("mono"));
        assert_eq!(config.packages, ["packages/*", "libs/**"]);
        assert_eq!(config.ignore, ["*-experimental"]);
        assert_eq!(config.env.get("CI").map(String::as_str), Some("1"));

        let test = config.script("test").expect("test script");
        assert_eq!(test, &Script::new("pytest -q"));

        let lint = config.script("lint").expect("lint script");
        assert_eq!(lint.run, "ruff check .");
        assert_eq!(lint.scope.as_deref(), Some("core,*-lib"));
        assert!(lint.fail_fast);
        assert_eq!(lint.topological, Some(false));
        assert_eq!(
            lint.env.get("RUFF_CACHE_DIR").map(String::as_str),
            Some(".cache")
        );

        assert_eq!(config.command_defaults.concurrency, 8);
        assert!(config.command_defaults.fail_fast);
        assert!(config.command_defaults.topological);
        assert_eq!(config.versioning.tag_format, "v{version}-{name}");
        assert_eq!(config.clean.patterns, ["dist", "coverage/*.xml"]);
        assert_eq!(config.clean.protected, [".venv", ".git"]);
    }

    #[test]
    fn test_script_table_requires_run() {
        let err = WorkspaceConfig::parse("[scripts.broken]\ndescription = \"no command\"\n");
        assert!(err.is_err());
    }
}
