//! Line forwarding from running commands to a caller-supplied handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Receives `(package, line, is_stderr)` for every line a command prints.
/// Lines arrive without their trailing newline.
///
/// Returning `Err` stops forwarding for that package and cancels the run:
/// units that have not started yet report `Cancelled`, and the executor
/// returns [`ExecuteError::OutputHandler`](super::ExecuteError::OutputHandler)
/// once everything in flight has finished.
pub type OutputHandler = Arc<dyn Fn(&str, &str, bool) -> anyhow::Result<()> + Send + Sync>;

/// Per-invocation state shared by every sink of one executor call.
pub(crate) struct OutputState {
    handler: OutputHandler,
    token: CancellationToken,
    first_error: Mutex<Option<(String, anyhow::Error)>>,
}

impl OutputState {
    pub(crate) fn new(handler: OutputHandler, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            handler,
            token,
            first_error: Mutex::new(None),
        })
    }

    /// The first handler error, with the package it came from.
    pub(crate) fn take_error(&self) -> Option<(String, anyhow::Error)> {
        self.first_error.lock().ok().and_then(|mut slot| slot.take())
    }

    fn record(&self, package: &str, err: anyhow::Error) {
        if let Ok(mut slot) = self.first_error.lock()
            && slot.is_none()
        {
            *slot = Some((package.to_string(), err));
        }
        self.token.cancel();
    }
}

/// Where a runner sends output lines for one package.
///
/// Clones share the same closed flag, so a runner can hand one clone to its
/// stdout reader and another to its stderr reader.
#[derive(Clone)]
pub struct LineSink {
    package: Arc<str>,
    state: Arc<OutputState>,
    closed: Arc<AtomicBool>,
}

impl LineSink {
    pub(crate) fn new(package: &str, state: Arc<OutputState>) -> Self {
        Self {
            package: Arc::from(package),
            state,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Package this sink forwards for.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// True once the handler has failed for this package.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Forward one line. A no-op after the handler has failed once.
    pub fn emit(&self, line: &str, is_stderr: bool) {
        if self.is_closed() {
            return;
        }
        if let Err(err) = (self.state.handler)(&self.package, line, is_stderr)
            && !self.closed.swap(true, Ordering::AcqRel)
        {
            tracing::warn!(package = %self.package, error = %err, "output handler failed; cancelling run");
            self.state.record(&self.package, err);
        }
    }
}

impl std::fmt::Debug for LineSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSink")
            .field("package", &self.package)
            .field("closed", &self.is_closed())
            .finish()
    }
}
