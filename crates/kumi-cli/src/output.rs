//! Terminal output for kumi commands.
//!
//! Package output is forwarded live as `[pkg] line`, stdout to stdout and
//! stderr to stderr. The run summary goes to stderr so stdout carries only
//! what the packages printed.

use std::io::Write;
use std::sync::Arc;

use kumi_engine::{
    BatchResult, CleanReport, ExecutionStatus, OutputHandler, Package, PlannedRelease,
};
use kumi_types::CANCELLED_EXIT_CODE;
use serde::Serialize;

/// Handler that prefixes each line with its package name.
///
/// A failed write (closed pipe) is returned, which cancels the run.
pub fn prefixed_handler() -> OutputHandler {
    Arc::new(|package, line, is_stderr| {
        if is_stderr {
            writeln!(std::io::stderr().lock(), "[{package}] {line}")?;
        } else {
            writeln!(std::io::stdout().lock(), "[{package}] {line}")?;
        }
        Ok(())
    })
}

/// Failures that printed nothing themselves (timeouts, spawn errors,
/// panics) plus the summary line.
pub fn summary(batch: &BatchResult, elapsed_ms: u128) -> String {
    let mut out = String::new();
    for result in batch.iter() {
        if result.status == ExecutionStatus::Failure && result.exit_code == CANCELLED_EXIT_CODE {
            // The last line is kumi's own note; earlier lines were already
            // forwarded live.
            let note = result.stderr.trim_end().lines().last().unwrap_or_default();
            out.push_str(&format!("[{}] {note}\n", result.package_name));
        }
    }

    let failed = batch.failure_count();
    let passed = batch.success_count();
    let cancelled = batch.cancelled_count();
    out.push_str(&format!("{failed} failed, {passed} passed"));
    if cancelled > 0 {
        out.push_str(&format!(", {cancelled} cancelled"));
    }
    out.push_str(&format!(" ({:.1}s)", elapsed_ms as f64 / 1000.0));

    let failures: Vec<&str> = batch
        .iter()
        .filter(|r| r.failed())
        .map(|r| r.package_name.as_str())
        .collect();
    if !failures.is_empty() {
        out.push_str(&format!("\nfailed: {}", failures.join(", ")));
    }
    out
}

/// One row of `kumi list --json`.
#[derive(Debug, Serialize)]
pub struct PackageRow<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub path: String,
    pub description: Option<&'a str>,
    pub dependencies: &'a [String],
}

impl<'a> PackageRow<'a> {
    pub fn new(package: &'a Package, root: &std::path::Path) -> Self {
        Self {
            name: &package.name,
            version: &package.version,
            path: relative_path(package, root),
            description: package.description.as_deref(),
            dependencies: &package.workspace_dependencies,
        }
    }
}

/// Package directory relative to the workspace root, for display.
pub fn relative_path(package: &Package, root: &std::path::Path) -> String {
    package
        .path
        .strip_prefix(root)
        .unwrap_or(&package.path)
        .display()
        .to_string()
}

/// `name version path`, one package per line.
pub fn package_lines(packages: &[&Package], root: &std::path::Path) -> String {
    packages
        .iter()
        .map(|p| format!("{} {} {}\n", p.name, p.version, relative_path(p, root)))
        .collect()
}

/// `name current -> next (bump)` per planned release.
pub fn release_lines(plan: &[PlannedRelease]) -> String {
    plan.iter()
        .map(|r| format!("{} {} -> {} ({})\n", r.name, r.current, r.next, r.bump))
        .collect()
}

/// Removed (or, on a dry run, removable) paths, then a totals line.
pub fn clean_lines(report: &CleanReport, root: &std::path::Path) -> String {
    let mut out = String::new();
    if report.dry_run {
        for target in &report.targets {
            let path = target.path.strip_prefix(root).unwrap_or(&target.path);
            let slash = if target.is_dir { "/" } else { "" };
            out.push_str(&format!("would remove {}{slash}\n", path.display()));
        }
    }
    let verb = if report.dry_run { "Would clean" } else { "Cleaned" };
    out.push_str(&format!(
        "{verb} {} files, {} directories ({:.1} KB)\n",
        report.files_removed,
        report.dirs_removed,
        report.bytes_freed as f64 / 1024.0
    ));
    out
}
