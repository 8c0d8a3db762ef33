//! Completion-order result stream for the parallel executor.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use kumi_types::ExecutionResult;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Results of [`ParallelExecutor::stream`](super::ParallelExecutor::stream),
/// in completion order. Yields exactly one result per package, then ends.
///
/// Dropping the stream cancels every package that has not started yet.
#[derive(Debug)]
pub struct ResultStream {
    rx: mpsc::UnboundedReceiver<ExecutionResult>,
    token: CancellationToken,
    remaining: usize,
}

impl ResultStream {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<ExecutionResult>,
        token: CancellationToken,
        total: usize,
    ) -> Self {
        Self {
            rx,
            token,
            remaining: total,
        }
    }

    /// Stop launching packages. Running ones still report their results.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Results not yet yielded.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Stream for ResultStream {
    type Item = ExecutionResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.remaining == 0 {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(result)) => {
                self.remaining -= 1;
                Poll::Ready(Some(result))
            }
            Poll::Ready(None) => {
                self.remaining = 0;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
