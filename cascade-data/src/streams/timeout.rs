//! Idle timeout wrapper for adapter transport streams.
//!
//! A venue that silently stops sending data without closing the socket looks identical to a
//! quiet market. [`TimeoutStream`] ends the stream once nothing has been received for the
//! configured period, which the adapter treats as a disconnect.

use futures::Stream;
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::Instant;

/// Default idle timeout for venue streams (2 minutes).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// A stream wrapper that terminates the inner stream if no item is received for the
/// configured timeout period.
#[derive(Debug)]
pub struct TimeoutStream<S> {
    inner: S,
    timeout_duration: Duration,
    deadline: Pin<Box<tokio::time::Sleep>>,
    timed_out: bool,
}

impl<S> TimeoutStream<S> {
    pub fn new(inner: S, timeout_duration: Duration) -> Self {
        Self {
            inner,
            timeout_duration,
            deadline: Box::pin(tokio::time::sleep(timeout_duration)),
            timed_out: false,
        }
    }

    pub fn with_default_timeout(inner: S) -> Self {
        Self::new(inner, DEFAULT_READ_TIMEOUT)
    }

    /// True if the stream ended because the idle timeout elapsed rather than the inner
    /// stream finishing.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout_duration
    }
}

impl<S> Stream for TimeoutStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.timed_out {
            return Poll::Ready(None);
        }

        let timeout_duration = self.timeout_duration;

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                self.deadline.as_mut().reset(Instant::now() + timeout_duration);
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => match self.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    tracing::warn!(
                        timeout_secs = timeout_duration.as_secs(),
                        "read timeout - no data received, triggering reconnection"
                    );
                    self.timed_out = true;
                    Poll::Ready(None)
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<S: Unpin> Unpin for TimeoutStream<S> {}
