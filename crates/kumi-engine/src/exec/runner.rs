//! Running one shell command inside one package directory.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kumi_types::env::{PACKAGE_NAME_VAR, PACKAGE_PATH_VAR, PACKAGE_VERSION_VAR};
use kumi_types::{CANCELLED_EXIT_CODE, ExecutionResult, ExecutionStatus, Package};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::LineSink;

/// How long to keep reading pipes after a timed-out process group was
/// killed. Anything that escaped the group and still holds a pipe open is
/// abandoned after this.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Per-run settings shared by every package of one invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Extra environment, layered over the ambient environment.
    pub env: BTreeMap<String, String>,
    /// Wall-clock limit per package.
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Runs a command for a package and reports the outcome as data.
///
/// Implementations never return errors: spawn problems, timeouts and
/// non-zero exits all become `Failure` results.
#[async_trait]
pub trait PackageRunner: Send + Sync {
    async fn run(
        &self,
        package: &Package,
        command: &str,
        options: &RunOptions,
        sink: Option<LineSink>,
    ) -> ExecutionResult;
}

/// Raw outcome of [`run_command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `128 + signal` for signal deaths, or
    /// [`CANCELLED_EXIT_CODE`] after a timeout.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

/// The default runner: `sh -c` (or `cmd /C`) in the package directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait]
impl PackageRunner for ShellRunner {
    async fn run(
        &self,
        package: &Package,
        command: &str,
        options: &RunOptions,
        sink: Option<LineSink>,
    ) -> ExecutionResult {
        let mut env = options.env.clone();
        env.insert(PACKAGE_NAME_VAR.to_string(), package.name.clone());
        env.insert(
            PACKAGE_PATH_VAR.to_string(),
            package.path.to_string_lossy().into_owned(),
        );
        env.insert(PACKAGE_VERSION_VAR.to_string(), package.version.clone());

        let started = Instant::now();
        match run_command(command, &package.path, &env, options.timeout, sink).await {
            Ok(output) if output.timed_out => {
                let limit = options.timeout.map(|t| t.as_millis()).unwrap_or_default();
                tracing::warn!(package = %package.name, limit_ms = %limit, "command timed out");
                ExecutionResult {
                    package_name: package.name.clone(),
                    status: ExecutionStatus::Failure,
                    exit_code: CANCELLED_EXIT_CODE,
                    stdout: output.stdout,
                    stderr: with_timeout_note(output.stderr, limit),
                    duration_ms: output.duration_ms,
                    command: command.to_string(),
                }
            }
            Ok(output) => ExecutionResult::from_exit(
                &package.name,
                command,
                output.exit_code,
                output.stdout,
                output.stderr,
                output.duration_ms,
            ),
            Err(e) => {
                tracing::warn!(package = %package.name, error = %e, "failed to spawn command");
                ExecutionResult::failure(
                    &package.name,
                    command,
                    CANCELLED_EXIT_CODE,
                    format!("failed to spawn `{command}` in {}: {e}", package.path.display()),
                    elapsed_ms(started),
                )
            }
        }
    }
}

/// Run `command` through the platform shell in `cwd`.
///
/// `env` is layered over the ambient environment. Both pipes are read
/// concurrently, line by line, accumulated in full and forwarded to `sink`
/// as they arrive. When `timeout` elapses the whole process group is killed
/// and the output gathered so far is returned with `timed_out` set.
pub async fn run_command(
    command: &str,
    cwd: &Path,
    env: &BTreeMap<String, String>,
    timeout: Option<Duration>,
    sink: Option<LineSink>,
) -> io::Result<CommandOutput> {
    let started = Instant::now();

    let mut cmd = shell_command(command);
    cmd.current_dir(cwd);
    cmd.envs(env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    // A timeout has to take grandchildren down too, so the child leads its
    // own group. Without one the child stays in ours and sees terminal
    // signals like Ctrl-C.
    #[cfg(unix)]
    {
        if timeout.is_some() {
            cmd.process_group(0);
        }
    }

    let mut child = cmd.spawn()?;
    // `Child::id` is gone once the child is reaped, but its group can
    // outlive it through background jobs.
    let pid = child.id();

    let stdout = Captured::default();
    let stderr = Captured::default();
    let mut drains: Vec<JoinHandle<()>> = Vec::with_capacity(2);
    if let Some(pipe) = child.stdout.take() {
        drains.push(tokio::spawn(drain_lines(pipe, sink.clone(), false, stdout.clone())));
    }
    if let Some(pipe) = child.stderr.take() {
        drains.push(tokio::spawn(drain_lines(pipe, sink, true, stderr.clone())));
    }

    // The deadline covers the pipes as well as the exit: a background job
    // holding stdout open keeps the package running.
    let finished = async {
        let status = child.wait().await?;
        for task in drains.iter_mut() {
            // A drain task only fails by panicking; what it read is kept.
            let _ = task.await;
        }
        io::Result::Ok(status)
    };
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, finished).await.ok(),
        None => Some(finished.await),
    };
    let status = match outcome {
        Some(status) => Some(status?),
        None => {
            kill_process_group(pid, &mut child).await;
            abandon_drains(&mut drains).await;
            None
        }
    };

    Ok(CommandOutput {
        exit_code: status.map(exit_code).unwrap_or(CANCELLED_EXIT_CODE),
        stdout: stdout.take().await,
        stderr: stderr.take().await,
        duration_ms: elapsed_ms(started),
        timed_out: status.is_none(),
    })
}

/// Output of one pipe, shared with its drain task so a timed-out run can
/// still report what arrived before the kill.
#[derive(Debug, Clone, Default)]
struct Captured(Arc<Mutex<String>>);

impl Captured {
    async fn push(&self, text: &str) {
        self.0.lock().await.push_str(text);
    }

    async fn take(&self) -> String {
        std::mem::take(&mut *self.0.lock().await)
    }
}

/// Keep what the package wrote to stderr and end it with the timeout note.
fn with_timeout_note(mut stderr: String, limit_ms: u128) -> String {
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str(&format!("command timed out after {limit_ms}ms"));
    stderr
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Read a pipe to EOF, forwarding each complete line.
async fn drain_lines<R>(pipe: R, sink: Option<LineSink>, is_stderr: bool, captured: Captured)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                if let Some(sink) = &sink {
                    let line = text.strip_suffix('\n').unwrap_or(&text);
                    let line = line.strip_suffix('\r').unwrap_or(line);
                    sink.emit(line, is_stderr);
                }
                captured.push(&text).await;
            }
            Err(e) => {
                tracing::debug!(error = %e, is_stderr, "pipe read failed");
                break;
            }
        }
    }
}

/// Give drains still running after a kill `DRAIN_GRACE` to reach EOF, then
/// abort them.
async fn abandon_drains(drains: &mut [JoinHandle<()>]) {
    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    for task in drains.iter_mut() {
        if task.is_finished() {
            continue;
        }
        if tokio::time::timeout_at(deadline, &mut *task).await.is_err() {
            tracing::debug!("abandoning pipe held open past the kill");
            task.abort();
        }
    }
}

async fn kill_process_group(pid: Option<u32>, child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = pid
            && let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL)
        {
            tracing::debug!(pid, error = %e, "killpg failed");
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
    // Reaps the child if it is still running; also covers platforms without
    // process groups. Fails harmlessly when it already exited.
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "failed to kill timed-out child");
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            128 + status.signal().unwrap_or(0)
        }
        #[cfg(not(unix))]
        {
            CANCELLED_EXIT_CODE
        }
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
