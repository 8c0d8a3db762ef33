//! Bounded-concurrency execution across packages.
//!
//! ```text
//!             ┌──────────── CancellationToken (per call) ────────────┐
//!             │                                                      │
//!   packages ─┼─> spawn task ─> check ─> Semaphore ─> check ─> runner┼─> result
//!             │   (all at once)           (N permits)                │
//!             └──────────────────────────────────────────────────────┘
//! ```
//!
//! Every package becomes a tokio task straight away; the semaphore decides
//! how many of them reach the runner at once. The token is checked on both
//! sides of the gate, so once it fires nothing new starts. Work already
//! running is left to finish.

use std::any::Any;
use std::borrow::Borrow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use kumi_types::{BatchResult, CANCELLED_EXIT_CODE, ExecutionResult, Package};
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use super::sink::OutputState;
use super::{LineSink, OutputHandler, PackageRunner, ResultStream, RunOptions, ShellRunner};

/// Concurrency used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Errors that abort a whole executor call. Per-package problems are never
/// errors; they are `Failure` results.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("output handler failed for package '{package}': {source}")]
    OutputHandler {
        package: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Executor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum packages running at once. Zero is treated as one.
    pub concurrency: usize,
    /// Stop launching new work after the first failure.
    pub fail_fast: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            fail_fast: false,
        }
    }
}

impl ExecutorConfig {
    pub fn new(concurrency: usize, fail_fast: bool) -> Self {
        Self {
            concurrency,
            fail_fast,
        }
    }

    fn permits(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// How a unit waits for a concurrency permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Wait for the permit, then check the token.
    Wait,
    /// Race the permit against the token; cancellation wins immediately.
    Race,
}

/// Everything one unit needs, shared across the tasks of an invocation.
struct UnitContext {
    runner: Arc<dyn PackageRunner>,
    gate: Arc<Semaphore>,
    token: CancellationToken,
    command: String,
    options: RunOptions,
    fail_fast: bool,
    admission: Admission,
}

/// Runs one command across many packages.
///
/// Holds configuration only: every call gets its own semaphore and
/// cancellation token, so one executor can serve concurrent calls.
#[derive(Clone)]
pub struct ParallelExecutor {
    config: ExecutorConfig,
    runner: Arc<dyn PackageRunner>,
    parent: Option<CancellationToken>,
}

impl ParallelExecutor {
    /// Executor that runs commands through [`ShellRunner`].
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            runner: Arc::new(ShellRunner),
            parent: None,
        }
    }

    /// Replace the runner.
    pub fn with_runner(mut self, runner: Arc<dyn PackageRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Tie every call to an outer token (e.g. Ctrl-C). Cancelling it behaves
    /// like a fail-fast trigger.
    pub fn with_cancellation(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn call_token(&self) -> CancellationToken {
        self.parent
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default()
    }

    fn context(
        &self,
        token: CancellationToken,
        command: &str,
        options: &RunOptions,
        admission: Admission,
    ) -> Arc<UnitContext> {
        Arc::new(UnitContext {
            runner: self.runner.clone(),
            gate: Arc::new(Semaphore::new(self.config.permits())),
            token,
            command: command.to_string(),
            options: options.clone(),
            fail_fast: self.config.fail_fast,
            admission,
        })
    }

    /// Run `command` in every package, at most `concurrency` at a time.
    ///
    /// Results come back in input order, one per package.
    pub async fn execute<I>(
        &self,
        packages: I,
        command: &str,
        options: &RunOptions,
        handler: Option<OutputHandler>,
    ) -> Result<BatchResult, ExecuteError>
    where
        I: IntoIterator,
        I::Item: Borrow<Package>,
    {
        let token = self.call_token();
        let output = handler.map(|h| OutputState::new(h, token.clone()));
        let ctx = self.context(token, command, options, Admission::Wait);

        let packages: Vec<Package> = packages.into_iter().map(|p| p.borrow().clone()).collect();
        tracing::info!(packages = packages.len(), command, "executing");
        let results = run_layer(&ctx, packages, output.as_ref()).await;

        finish(output, results)
    }

    /// Run layers strictly one after another, each through the flat path.
    ///
    /// A layer that would start after cancellation is reported entirely as
    /// `Cancelled`. Under fail-fast, any failure in a layer cancels every
    /// later layer.
    pub async fn execute_batches<L, I>(
        &self,
        layers: L,
        command: &str,
        options: &RunOptions,
        handler: Option<OutputHandler>,
    ) -> Result<BatchResult, ExecuteError>
    where
        L: IntoIterator<Item = I>,
        I: IntoIterator,
        I::Item: Borrow<Package>,
    {
        let token = self.call_token();
        let output = handler.map(|h| OutputState::new(h, token.clone()));
        let ctx = self.context(token.clone(), command, options, Admission::Wait);

        let mut results = Vec::new();
        for (index, layer) in layers.into_iter().enumerate() {
            let packages: Vec<Package> = layer.into_iter().map(|p| p.borrow().clone()).collect();

            if token.is_cancelled() {
                tracing::info!(layer = index, packages = packages.len(), "layer cancelled");
                results.extend(
                    packages
                        .iter()
                        .map(|p| ExecutionResult::cancelled(&p.name, command)),
                );
                continue;
            }

            tracing::info!(layer = index, packages = packages.len(), command, "running layer");
            let layer_results = run_layer(&ctx, packages, output.as_ref()).await;

            if self.config.fail_fast && layer_results.iter().any(ExecutionResult::failed) {
                tracing::warn!(layer = index, "layer failed; cancelling remaining layers");
                token.cancel();
            }
            results.extend(layer_results);
        }

        finish(output, results)
    }

    /// Run `command` in every package and yield results as they complete.
    ///
    /// Under fail-fast, packages still waiting for a permit are released as
    /// `Cancelled` the moment a failure is seen. Dropping the stream cancels
    /// whatever has not started. Must be called inside a tokio runtime.
    pub fn stream<I>(&self, packages: I, command: &str, options: &RunOptions) -> ResultStream
    where
        I: IntoIterator,
        I::Item: Borrow<Package>,
    {
        let token = self.call_token();
        let ctx = self.context(token.clone(), command, options, Admission::Race);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut count = 0;
        for package in packages {
            let package = package.borrow().clone();
            let ctx = ctx.clone();
            let tx = tx.clone();
            count += 1;
            tokio::spawn(async move {
                let result = run_unit(ctx, package, None).await;
                // The receiver is gone only if the stream was dropped.
                let _ = tx.send(result);
            });
        }
        tracing::info!(packages = count, command, "streaming");

        ResultStream::new(rx, token, count)
    }
}

/// Spawn one task per package and join them in input order.
async fn run_layer(
    ctx: &Arc<UnitContext>,
    packages: Vec<Package>,
    output: Option<&Arc<OutputState>>,
) -> Vec<ExecutionResult> {
    let mut handles = Vec::with_capacity(packages.len());
    for package in packages {
        let name = package.name.clone();
        let sink = output.map(|state| LineSink::new(&package.name, state.clone()));
        let handle = tokio::spawn(run_unit(ctx.clone(), package, sink));
        handles.push((name, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!(package = %name, error = %e, "unit task failed");
                results.push(ExecutionResult::failure(
                    name,
                    &ctx.command,
                    CANCELLED_EXIT_CODE,
                    format!("task failed: {e}"),
                    0,
                ));
            }
        }
    }
    results
}

/// Admission, execution and fail-fast bookkeeping for one package.
async fn run_unit(ctx: Arc<UnitContext>, package: Package, sink: Option<LineSink>) -> ExecutionResult {
    if ctx.token.is_cancelled() {
        return ExecutionResult::cancelled(&package.name, &ctx.command);
    }

    let acquire = ctx.gate.clone().acquire_owned();
    let permit = match ctx.admission {
        Admission::Wait => acquire.await,
        Admission::Race => tokio::select! {
            biased;
            _ = ctx.token.cancelled() => {
                return ExecutionResult::cancelled(&package.name, &ctx.command);
            }
            permit = acquire => permit,
        },
    };
    // The gate is never closed; a closed gate means the call is over.
    let Ok(_permit) = permit else {
        return ExecutionResult::cancelled(&package.name, &ctx.command);
    };

    if ctx.token.is_cancelled() {
        return ExecutionResult::cancelled(&package.name, &ctx.command);
    }

    tracing::debug!(package = %package.name, "starting");
    let run = ctx.runner.run(&package, &ctx.command, &ctx.options, sink);
    let result = match AssertUnwindSafe(run).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(package = %package.name, %message, "runner panicked");
            ExecutionResult::failure(
                &package.name,
                &ctx.command,
                CANCELLED_EXIT_CODE,
                format!("task panicked: {message}"),
                0,
            )
        }
    };
    tracing::debug!(
        package = %package.name,
        status = %result.status,
        exit_code = result.exit_code,
        duration_ms = result.duration_ms,
        "finished"
    );

    if ctx.fail_fast && result.failed() && !ctx.token.is_cancelled() {
        tracing::warn!(package = %package.name, "fail-fast triggered; cancelling pending packages");
        ctx.token.cancel();
    }

    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic")
    }
}

fn finish(
    output: Option<Arc<OutputState>>,
    results: Vec<ExecutionResult>,
) -> Result<BatchResult, ExecuteError> {
    if let Some((package, source)) = output.and_then(|state| state.take_error()) {
        return Err(ExecuteError::OutputHandler {
            package,
            source: source.into(),
        });
    }
    Ok(BatchResult::new(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_concurrency_clamps_to_one() {
        assert_eq!(ExecutorConfig::new(0, false).permits(), 1);
        assert_eq!(ExecutorConfig::new(8, true).permits(), 8);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
