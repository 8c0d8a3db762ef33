//! Subcommand implementations.

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use kumi_engine::{
    BatchResult, BumpType, ExecutorConfig, GitRepo, Package, PackageFilter, ParallelExecutor,
    RunOptions, Workspace, clean_packages, plan_releases,
};
use tokio_util::sync::CancellationToken;

use crate::args::{ExecutionArgs, SelectionArgs};
use crate::output::{self, PackageRow};

// ============================================================================
// Read-only commands
// ============================================================================

pub fn list(workspace: &Workspace, scope: Option<String>, ignore: Vec<String>, json: bool) -> Result<ExitCode> {
    let mut filter = PackageFilter::new().with_ignore(ignore);
    if let Some(scope) = scope {
        filter = filter.with_scope(scope);
    }
    let packages = filter.apply(workspace)?;

    if json {
        let rows: Vec<PackageRow<'_>> = packages
            .iter()
            .map(|p| PackageRow::new(p, workspace.root()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", output::package_lines(&packages, workspace.root()));
    }
    Ok(ExitCode::SUCCESS)
}

pub fn graph(workspace: &Workspace, scope: Option<String>) -> Result<ExitCode> {
    let mut filter = PackageFilter::new();
    if let Some(scope) = scope {
        filter = filter.with_scope(scope);
    }
    let packages = filter.apply(workspace)?;
    let layers = workspace.graph().batches(packages)?.collect_layers()?;

    for (index, layer) in layers.iter().enumerate() {
        let names: Vec<&str> = layer.iter().map(|p| p.name.as_str()).collect();
        println!("{index}: {}", names.join(" "));
    }
    Ok(ExitCode::SUCCESS)
}

pub fn changed(
    workspace: &Workspace,
    since: String,
    include_dependents: bool,
    scope: Option<String>,
    ignore: Vec<String>,
    json: bool,
) -> Result<ExitCode> {
    let mut filter = PackageFilter::new()
        .with_ignore(ignore)
        .with_since(since, include_dependents);
    if let Some(scope) = scope {
        filter = filter.with_scope(scope);
    }
    let packages = filter.apply(workspace)?;

    let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn version(
    workspace: &Workspace,
    scope: Option<String>,
    bump: Option<BumpType>,
    prerelease: Option<&str>,
    json: bool,
) -> Result<ExitCode> {
    let mut filter = PackageFilter::new();
    if let Some(scope) = scope {
        filter = filter.with_scope(scope);
    }
    let packages = filter.apply(workspace)?;
    let repo = GitRepo::discover(workspace.root()).context("release planning needs a git repository")?;
    let plan = plan_releases(workspace, &repo, &packages, bump, prerelease)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(ExitCode::SUCCESS);
    }
    if plan.is_empty() {
        eprintln!("nothing to release");
        return Ok(ExitCode::SUCCESS);
    }
    print!("{}", output::release_lines(&plan));
    Ok(ExitCode::SUCCESS)
}

pub fn clean(
    workspace: &Workspace,
    scope: Option<String>,
    ignore: Vec<String>,
    dry_run: bool,
    json: bool,
) -> Result<ExitCode> {
    let mut filter = PackageFilter::new().with_ignore(ignore);
    if let Some(scope) = scope {
        filter = filter.with_scope(scope);
    }
    let packages = filter.apply(workspace)?;
    let report = clean_packages(&packages, &workspace.config().clean, dry_run)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", output::clean_lines(&report, workspace.root()));
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Execution
// ============================================================================

/// Everything `run` and `exec` resolve before handing off to the executor.
struct Invocation<'w> {
    packages: Vec<&'w Package>,
    command: String,
    options: RunOptions,
    config: ExecutorConfig,
    topological: bool,
}

pub async fn run_script(
    workspace: &Workspace,
    name: &str,
    selection: SelectionArgs,
    execution: ExecutionArgs,
    no_topological: bool,
) -> Result<ExitCode> {
    let config = workspace.config();
    let Some(script) = config.script(name) else {
        let known: Vec<&str> = config.scripts.keys().map(String::as_str).collect();
        if known.is_empty() {
            bail!("unknown script '{name}' (kumi.toml defines no scripts)");
        }
        bail!("unknown script '{name}' (available: {})", known.join(", "));
    };

    let defaults = config.command_defaults;
    let mut env = config.env.clone();
    env.extend(script.env.clone());

    let invocation = Invocation {
        packages: selection.filter(script.scope.as_deref()).apply(workspace)?,
        command: script.run.clone(),
        options: run_options(env, &execution),
        config: ExecutorConfig::new(
            execution.concurrency.unwrap_or(defaults.concurrency),
            execution.fail_fast || script.fail_fast || defaults.fail_fast,
        ),
        topological: !no_topological && script.topological.unwrap_or(defaults.topological),
    };
    execute(workspace, invocation).await
}

pub async fn exec(
    workspace: &Workspace,
    command: &str,
    selection: SelectionArgs,
    execution: ExecutionArgs,
    topological: bool,
) -> Result<ExitCode> {
    let config = workspace.config();
    let defaults = config.command_defaults;

    let invocation = Invocation {
        packages: selection.filter(None).apply(workspace)?,
        command: command.to_string(),
        options: run_options(config.env.clone(), &execution),
        config: ExecutorConfig::new(
            execution.concurrency.unwrap_or(defaults.concurrency),
            execution.fail_fast || defaults.fail_fast,
        ),
        topological,
    };
    execute(workspace, invocation).await
}

fn run_options(env: BTreeMap<String, String>, execution: &ExecutionArgs) -> RunOptions {
    RunOptions {
        env,
        timeout: execution.timeout(),
    }
}

async fn execute(workspace: &Workspace, invocation: Invocation<'_>) -> Result<ExitCode> {
    if invocation.packages.is_empty() {
        eprintln!("no packages selected");
        return Ok(ExitCode::SUCCESS);
    }

    // Resolve the schedule first: a broken graph must fail before anything runs.
    let layers = if invocation.topological {
        Some(
            workspace
                .graph()
                .batches(invocation.packages.iter().copied())?
                .collect_layers()?,
        )
    } else {
        None
    };

    let interrupt = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_ctrl_c(interrupt.clone()));
    let executor = ParallelExecutor::new(invocation.config).with_cancellation(interrupt);
    let handler = Some(output::prefixed_handler());

    tracing::info!(
        command = %invocation.command,
        packages = invocation.packages.len(),
        topological = invocation.topological,
        "starting"
    );
    let started = Instant::now();
    let batch: BatchResult = match layers {
        Some(layers) => {
            executor
                .execute_batches(layers, &invocation.command, &invocation.options, handler)
                .await?
        }
        None => {
            executor
                .execute(invocation.packages, &invocation.command, &invocation.options, handler)
                .await?
        }
    };
    watcher.abort();

    eprintln!("{}", output::summary(&batch, started.elapsed().as_millis()));
    Ok(if batch.all_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// First Ctrl-C stops new packages from launching; running ones get the
/// signal from the terminal themselves.
async fn cancel_on_ctrl_c(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupted; no new packages will start");
        eprintln!("interrupted, waiting for running packages");
        token.cancel();
    }
}
