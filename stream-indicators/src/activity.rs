//! In-flight tracking for async streams.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, ready};
use pin_project::{pin_project, pinned_drop};
use state_cell::{CellStream, StateCell};

/// Reports whether any tracked stream is currently in flight.
///
/// Wrap streams with [`track`](Self::track) (or
/// [`TrackActivityExt::track_activity`]); while at least one wrapped stream
/// has been polled and not yet terminated, [`loading`](Self::loading) reads
/// `true`. The counter is reference-counting, not a boolean flag, so
/// arbitrarily many concurrent streams compose: `loading` drops back to
/// `false` only when the last one terminates.
///
/// The indicator is a cheap clonable handle; clones share the same counter.
#[derive(Clone, Debug)]
pub struct ActivityIndicator {
    count: StateCell<usize>,
}

impl ActivityIndicator {
    /// Create an idle indicator (count 0, `loading` reads `false`).
    pub fn new() -> Self {
        Self {
            count: StateCell::new(0),
        }
    }

    /// Number of tracked streams currently in flight.
    pub fn in_flight(&self) -> usize {
        self.count.get()
    }

    /// Stream of loading transitions.
    ///
    /// Emits `false` immediately for an idle indicator, `true` when the first
    /// tracked stream starts, and `false` again only once the last
    /// overlapping one terminates. Consecutive duplicates are suppressed, so
    /// three overlapping activities produce exactly `[false, true, false]`.
    pub fn loading(&self) -> Loading {
        Loading {
            counts: self.count.subscribe(),
            last: None,
        }
    }

    /// Wrap `stream` so that its lifecycle drives this indicator.
    ///
    /// The returned stream is transparent: identical items, identical
    /// termination, identical `size_hint`. The in-flight counter increments
    /// when the wrapper is first polled - first demand, not construction -
    /// and decrements exactly once on its terminal event: end-of-stream, or
    /// being dropped mid-flight (cancellation). A wrapper that is never
    /// polled never counts.
    pub fn track<S: Stream>(&self, stream: S) -> TrackActivity<S> {
        TrackActivity {
            inner: stream,
            indicator: self.clone(),
            started: false,
            finished: false,
        }
    }

    fn begin(&self) {
        let in_flight = self.count.update(|n| {
            *n += 1;
            *n
        });
        tracing::trace!(target: "stream_indicators::activity", in_flight, "tracked stream started");
    }

    fn finish(&self) {
        let in_flight = self.count.update(|n| {
            debug_assert!(*n > 0, "activity counter underflow");
            *n = n.saturating_sub(1);
            *n
        });
        tracing::trace!(target: "stream_indicators::activity", in_flight, "tracked stream terminated");
    }
}

impl Default for ActivityIndicator {
    fn default() -> Self {
        Self::new()
    }
}

/// Deduplicated `count > 0` view of an [`ActivityIndicator`]'s counter,
/// created by [`ActivityIndicator::loading`].
#[derive(Debug)]
pub struct Loading {
    counts: CellStream<usize>,
    last: Option<bool>,
}

impl Stream for Loading {
    type Item = bool;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<bool>> {
        let this = self.get_mut();
        loop {
            let Some(count) = ready!(Pin::new(&mut this.counts).poll_next(cx)) else {
                return Poll::Ready(None);
            };
            // Count transitions like 1 -> 2 must not re-emit `true`.
            let loading = count > 0;
            if this.last != Some(loading) {
                this.last = Some(loading);
                return Poll::Ready(Some(loading));
            }
        }
    }
}

/// Stream returned by [`ActivityIndicator::track`].
#[pin_project(PinnedDrop)]
pub struct TrackActivity<S> {
    #[pin]
    inner: S,
    indicator: ActivityIndicator,
    started: bool,
    finished: bool,
}

impl<S: Stream> Stream for TrackActivity<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if !*this.started {
            *this.started = true;
            this.indicator.begin();
        }
        let item = ready!(this.inner.poll_next(cx));
        if item.is_none() && !*this.finished {
            *this.finished = true;
            this.indicator.finish();
        }
        Poll::Ready(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[pinned_drop]
impl<S> PinnedDrop for TrackActivity<S> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        // Dropping mid-flight is cancellation; it still gets the one decrement.
        if *this.started && !*this.finished {
            *this.finished = true;
            this.indicator.finish();
        }
    }
}

/// Extension trait for tracking a stream inline in a combinator chain:
/// `stream.track_activity(&indicator)`.
pub trait TrackActivityExt: Stream + Sized {
    /// Equivalent to [`ActivityIndicator::track`].
    fn track_activity(self, indicator: &ActivityIndicator) -> TrackActivity<Self> {
        indicator.track(self)
    }
}

impl<S: Stream> TrackActivityExt for S {}
