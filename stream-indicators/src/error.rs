//! Failure capture for async streams.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, ready};
use pin_project::pin_project;
use state_cell::{CellStream, StateCell};

/// Captures terminal failures from tracked streams and republishes them on a
/// side channel.
///
/// [`track`](Self::track) turns a fallible stream into an infallible one:
/// `Ok` items pass through unchanged, and the first `Err` is recorded here
/// while the tracked stream completes cleanly. The stream's consumer never
/// observes the failure; whoever consumes [`errors`](Self::errors) does -
/// show a toast without tearing down the view the stream feeds.
///
/// The indicator keeps only the most recent failure (last-write-wins, no
/// history), but every failure is delivered to already-attached `errors`
/// subscribers, in the order the failures were captured.
///
/// Cheap clonable handle; clones share the same error slot.
pub struct ErrorIndicator<E> {
    slot: StateCell<Option<Arc<E>>>,
}

impl<E> Clone for ErrorIndicator<E> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<E> std::fmt::Debug for ErrorIndicator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorIndicator").finish_non_exhaustive()
    }
}

impl<E> ErrorIndicator<E> {
    /// Create an indicator with no captured failure.
    pub fn new() -> Self {
        Self {
            slot: StateCell::new(None),
        }
    }

    /// The most recently captured failure, if any.
    pub fn last_error(&self) -> Option<Arc<E>> {
        self.slot.get()
    }

    /// Stream of captured failures, one event per failure, in capture order.
    ///
    /// A new subscriber first receives the most recently captured failure if
    /// there is one (replay-latest); earlier failures are not buffered for
    /// late subscribers.
    pub fn errors(&self) -> Errors<E> {
        Errors {
            slots: self.slot.subscribe(),
        }
    }

    /// Wrap `stream` so that its failure is redirected to this indicator.
    ///
    /// The returned stream yields the `Ok` items of `stream` and always
    /// completes cleanly: on the first `Err` the error is captured and the
    /// stream ends as if the input had finished normally. Dropping the
    /// wrapper mid-flight propagates as plain cancellation, nothing is
    /// recorded.
    pub fn track<S, V>(&self, stream: S) -> TrackErrors<S, E>
    where
        S: Stream<Item = Result<V, E>>,
    {
        TrackErrors {
            inner: stream,
            indicator: self.clone(),
            done: false,
        }
    }

    fn record(&self, error: E) {
        // Always notify: two structurally equal failures are still two failures.
        self.slot.set(Some(Arc::new(error)));
        tracing::trace!(target: "stream_indicators::error", "captured tracked stream failure");
    }
}

impl<E> Default for ErrorIndicator<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream returned by [`ErrorIndicator::errors`].
pub struct Errors<E> {
    slots: CellStream<Option<Arc<E>>>,
}

impl<E> std::fmt::Debug for Errors<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Errors").finish_non_exhaustive()
    }
}

impl<E> Stream for Errors<E> {
    type Item = Arc<E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Arc<E>>> {
        let this = self.get_mut();
        loop {
            match ready!(Pin::new(&mut this.slots).poll_next(cx)) {
                Some(Some(error)) => return Poll::Ready(Some(error)),
                // The empty initial slot is not an event.
                Some(None) => {}
                None => return Poll::Ready(None),
            }
        }
    }
}

/// Stream returned by [`ErrorIndicator::track`].
///
/// Fused: after its first terminal event (clean end or captured failure) it
/// keeps returning end-of-stream and never polls the inner stream again.
#[pin_project]
pub struct TrackErrors<S, E> {
    #[pin]
    inner: S,
    indicator: ErrorIndicator<E>,
    done: bool,
}

impl<S, V, E> Stream for TrackErrors<S, E>
where
    S: Stream<Item = Result<V, E>>,
{
    type Item = V;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<V>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        match ready!(this.inner.poll_next(cx)) {
            Some(Ok(item)) => Poll::Ready(Some(item)),
            Some(Err(error)) => {
                *this.done = true;
                this.indicator.record(error);
                Poll::Ready(None)
            }
            None => {
                *this.done = true;
                Poll::Ready(None)
            }
        }
    }
}

/// Extension trait for redirecting a stream's failures inline in a
/// combinator chain: `stream.track_errors(&indicator)`.
pub trait TrackErrorsExt<V, E>: Stream<Item = Result<V, E>> + Sized {
    /// Equivalent to [`ErrorIndicator::track`].
    fn track_errors(self, indicator: &ErrorIndicator<E>) -> TrackErrors<Self, E> {
        indicator.track(self)
    }
}

impl<S, V, E> TrackErrorsExt<V, E> for S where S: Stream<Item = Result<V, E>> {}
