//! Flag groups shared by `run` and `exec`.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use kumi_engine::PackageFilter;

/// Which packages a command targets.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Package names or globs, comma-separated
    #[arg(long)]
    pub scope: Option<String>,

    /// Only packages changed since this git reference
    #[arg(long, value_name = "REF")]
    pub since: Option<String>,

    /// Exclude packages by name or path glob (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// With --since, also select packages that depend on changed ones
    #[arg(long, requires = "since")]
    pub include_dependents: bool,
}

impl SelectionArgs {
    /// Build the filter. `fallback_scope` applies when no `--scope` was given.
    pub fn filter(&self, fallback_scope: Option<&str>) -> PackageFilter {
        let mut filter = PackageFilter::new().with_ignore(self.ignore.iter().cloned());
        if let Some(scope) = self.scope.as_deref().or(fallback_scope) {
            filter = filter.with_scope(scope);
        }
        if let Some(since) = &self.since {
            filter = filter.with_since(since.clone(), self.include_dependents);
        }
        filter
    }
}

/// How a command is executed.
#[derive(Args, Debug, Clone, Default)]
pub struct ExecutionArgs {
    /// Maximum packages running at once
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Stop launching packages after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Kill a package's command after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl ExecutionArgs {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

/// Turn the words after `kumi exec --` into one `sh -c` line.
///
/// A single word is taken as a shell line as-is (`kumi exec -- 'make && make
/// test'`). Several words are an argv and get quoted, so an argument with a
/// space stays one argument.
pub fn command_line(words: &[String]) -> Result<String> {
    match words {
        [line] => Ok(line.clone()),
        words => shlex::try_join(words.iter().map(String::as_str))
            .context("command contains a NUL byte"),
    }
}
