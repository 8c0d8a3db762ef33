//! Running commands across packages.
//!
//! - [`ParallelExecutor`]: flat, layered, and streaming entry points
//! - [`PackageRunner`]: the seam between scheduling and process spawning;
//!   [`ShellRunner`] is the real one
//! - [`LineSink`] / [`OutputHandler`]: live line forwarding

mod executor;
mod runner;
mod sink;
mod stream;

pub use executor::{DEFAULT_CONCURRENCY, ExecuteError, ExecutorConfig, ParallelExecutor};
pub use runner::{CommandOutput, PackageRunner, RunOptions, ShellRunner, run_command};
pub use sink::{LineSink, OutputHandler};
pub use stream::ResultStream;
