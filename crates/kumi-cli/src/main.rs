//! kumi CLI entry point.
//!
//! Usage:
//!   kumi list                        # Workspace members
//!   kumi graph                       # Topological layers
//!   kumi run <script>                # Script from kumi.toml in every package
//!   kumi exec -- <command...>        # Ad hoc command in every package
//!   kumi changed <ref>               # Packages touched since a git ref
//!   kumi version                     # Planned releases from commit history
//!   kumi clean [--dry-run]           # Remove build artifacts
//!
//! Exit codes: 0 on success, 1 when a package fails or an error occurs, 2 when
//! the dependency graph is invalid (nothing is executed in that case).

mod args;
mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kumi_engine::{FilterError, GraphError, Workspace, WorkspaceError};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use args::{ExecutionArgs, SelectionArgs};

/// Run commands across the packages of a Python monorepo.
#[derive(Parser, Debug)]
#[command(name = "kumi")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Run as if started in DIR
    #[arg(short = 'C', value_name = "DIR", global = true)]
    directory: Option<PathBuf>,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List workspace packages
    List {
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, value_name = "PATTERN")]
        ignore: Vec<String>,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the topological layers of the dependency graph
    Graph {
        #[arg(long)]
        scope: Option<String>,
    },

    /// Run a script from kumi.toml in every selected package
    Run {
        /// Script name
        script: String,
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        execution: ExecutionArgs,
        /// Run everything at once instead of layer by layer
        #[arg(long)]
        no_topological: bool,
    },

    /// Run an ad hoc command in every selected package
    Exec {
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        execution: ExecutionArgs,
        /// Run layer by layer, dependencies first
        #[arg(long)]
        topological: bool,
        /// Command and arguments
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// List packages changed since a git reference
    Changed {
        /// Git reference to compare against (branch, tag, or commit)
        since: String,
        /// Only packages with changed files, not their dependents
        #[arg(long)]
        no_dependents: bool,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, value_name = "PATTERN")]
        ignore: Vec<String>,
        #[arg(long)]
        json: bool,
    },

    /// Plan the next release of each package from conventional commits
    Version {
        #[arg(long)]
        scope: Option<String>,
        /// Force this bump instead of deriving it from commits
        #[arg(long, value_name = "major|minor|patch")]
        bump: Option<kumi_engine::BumpType>,
        /// Pre-release identifier, e.g. rc
        #[arg(long, value_name = "ID")]
        prerelease: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Remove build artifacts ([clean] patterns in kumi.toml)
    Clean {
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, value_name = "PATTERN")]
        ignore: Vec<String>,
        /// Report what would be removed without deleting anything
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing (RUST_LOG wins over -v)
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            if is_structural(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let start = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    let workspace = Workspace::discover(&start)?;
    tracing::debug!(root = %workspace.root().display(), "using workspace");

    match cli.command {
        Command::List { scope, ignore, json } => commands::list(&workspace, scope, ignore, json),
        Command::Graph { scope } => commands::graph(&workspace, scope),
        Command::Changed {
            since,
            no_dependents,
            scope,
            ignore,
            json,
        } => commands::changed(&workspace, since, !no_dependents, scope, ignore, json),
        Command::Version {
            scope,
            bump,
            prerelease,
            json,
        } => commands::version(&workspace, scope, bump, prerelease.as_deref(), json),
        Command::Clean {
            scope,
            ignore,
            dry_run,
            json,
        } => commands::clean(&workspace, scope, ignore, dry_run, json),
        Command::Run {
            script,
            selection,
            execution,
            no_topological,
        } => {
            let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            rt.block_on(commands::run_script(
                &workspace,
                &script,
                selection,
                execution,
                no_topological,
            ))
        }
        Command::Exec {
            selection,
            execution,
            topological,
            command,
        } => {
            let command = args::command_line(&command)?;
            let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            rt.block_on(commands::exec(
                &workspace,
                &command,
                selection,
                execution,
                topological,
            ))
        }
    }
}

/// Graph errors are structural: the workspace itself is broken.
fn is_structural(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<GraphError>().is_some()
            || matches!(cause.downcast_ref::<WorkspaceError>(), Some(WorkspaceError::Graph(_)))
            || matches!(cause.downcast_ref::<FilterError>(), Some(FilterError::Graph(_)))
    })
}
