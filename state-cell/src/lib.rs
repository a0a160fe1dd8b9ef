//! A thread-safe single-value cell with an observable stream of its values.
//!
//! [`StateCell`] holds one mutable value behind a lock and fans every
//! notified write out to any number of subscribers. Each subscriber is a
//! [`CellStream`], a [`Stream`] that first yields the value current at
//! subscription time (replay-latest) and then every later notified value, in
//! write order. Subscriber queues are unbounded, so a slow subscriber never
//! loses an intermediate value.
//!
//! Writers choose the notification policy per write: [`StateCell::set`]
//! notifies unconditionally, [`StateCell::set_if_changed`] suppresses writes
//! equal to the current value, and [`StateCell::update`] runs a
//! read-modify-write as a single critical section.
//!
//! ## Usage
//!
//! ```
//! use futures::StreamExt;
//! use state_cell::StateCell;
//!
//! # tokio_test::block_on(async {
//! let cell = StateCell::new(0u32);
//! let mut values = cell.subscribe();
//!
//! // A new subscriber sees the current value first.
//! assert_eq!(values.next().await, Some(0));
//!
//! cell.set(5);
//! assert_eq!(values.next().await, Some(5));
//! # });
//! ```

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

struct CellInner<T> {
    value: T,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone> CellInner<T> {
    /// Queue the current value on every live subscriber, pruning the dead ones.
    fn notify(&mut self) {
        let value = &self.value;
        self.subscribers
            .retain(|tx| tx.send(value.clone()).is_ok());
    }
}

/// A shared, lock-guarded value whose writes can be observed as a stream.
///
/// `StateCell` is a cheap clonable handle; clones share the same value and
/// subscriber set. All operations are bounded, in-memory critical sections -
/// nothing here blocks on I/O or waits for subscribers.
pub struct StateCell<T> {
    inner: Arc<Mutex<CellInner<T>>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell").finish_non_exhaustive()
    }
}

impl<T: Clone> StateCell<T> {
    /// Create a cell holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CellInner {
                value: initial,
                subscribers: Vec::new(),
            })),
        }
    }

    /// The current value.
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Replace the value and notify every subscriber, even if the new value
    /// equals the old one.
    ///
    /// This is the right write for slots where each write is an event in its
    /// own right (e.g. two structurally equal errors are still two errors).
    pub fn set(&self, value: T) {
        let mut inner = self.lock();
        inner.value = value;
        inner.notify();
    }

    /// Replace the value only if it differs from the current one.
    ///
    /// Returns whether a write (and a notification) happened. Equal writes
    /// are suppressed entirely, so subscribers never see two consecutive
    /// equal values from this path.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        let mut inner = self.lock();
        if inner.value == value {
            return false;
        }
        inner.value = value;
        inner.notify();
        true
    }

    /// Atomically read-modify-write the value, then notify subscribers.
    ///
    /// The closure runs under the cell's lock, so concurrent `update`s are
    /// linearized; subscribers observe the results in that order. The closure
    /// must not call back into this cell.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut inner = self.lock();
        let out = f(&mut inner.value);
        inner.notify();
        out
    }

    /// Subscribe to the cell's values.
    ///
    /// The returned stream immediately has the cell's current value queued
    /// (replay-latest), followed by every subsequently notified value in
    /// write order. The stream ends when the last `StateCell` handle is
    /// dropped.
    pub fn subscribe(&self) -> CellStream<T> {
        let mut inner = self.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(inner.value.clone());
        inner.subscribers.push(tx);
        CellStream { rx }
    }

    fn lock(&self) -> MutexGuard<'_, CellInner<T>> {
        self.inner.lock().unwrap()
    }
}

/// Stream of a [`StateCell`]'s values, created by [`StateCell::subscribe`].
pub struct CellStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> std::fmt::Debug for CellStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellStream").finish_non_exhaustive()
    }
}

impl<T> Stream for CellStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};

    /// Collect every value the stream can yield without waiting.
    fn drain<T>(stream: &mut CellStream<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(Some(value)) = stream.next().now_or_never() {
            out.push(value);
        }
        out
    }

    #[test]
    fn test_get_set() {
        let cell = StateCell::new(1u32);
        assert_eq!(cell.get(), 1);
        cell.set(2);
        assert_eq!(cell.get(), 2);
    }

    #[test]
    fn test_subscribe_replays_current_value() {
        let cell = StateCell::new(7u32);
        let mut values = cell.subscribe();
        assert_eq!(drain(&mut values), vec![7]);
    }

    #[test]
    fn test_late_subscriber_sees_only_latest() {
        let cell = StateCell::new(1u32);
        cell.set(2);
        cell.set(3);
        let mut values = cell.subscribe();
        assert_eq!(drain(&mut values), vec![3]);
    }

    #[test]
    fn test_values_delivered_in_write_order() {
        let cell = StateCell::new(0u32);
        let mut values = cell.subscribe();
        for n in 1..=5 {
            cell.set(n);
        }
        assert_eq!(drain(&mut values), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_set_always_notifies() {
        let cell = StateCell::new(0u32);
        let mut values = cell.subscribe();
        cell.set(5);
        cell.set(5);
        assert_eq!(drain(&mut values), vec![0, 5, 5]);
    }

    #[test]
    fn test_set_if_changed_suppresses_equal_writes() {
        let cell = StateCell::new(0u32);
        let mut values = cell.subscribe();
        assert!(cell.set_if_changed(1));
        assert!(!cell.set_if_changed(1));
        assert!(cell.set_if_changed(2));
        assert_eq!(drain(&mut values), vec![0, 1, 2]);
    }

    #[test]
    fn test_update_returns_closure_result() {
        let cell = StateCell::new(10u32);
        let doubled = cell.update(|n| {
            *n += 1;
            *n * 2
        });
        assert_eq!(doubled, 22);
        assert_eq!(cell.get(), 11);
    }

    #[test]
    fn test_concurrent_updates_are_atomic() {
        let cell = StateCell::new(0u64);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        cell.update(|n| *n += 1);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(cell.get(), 8_000);
    }

    #[test]
    fn test_each_subscriber_gets_every_value() {
        let cell = StateCell::new(0u32);
        let mut first = cell.subscribe();
        let mut second = cell.subscribe();
        cell.set(1);
        cell.set(2);
        assert_eq!(drain(&mut first), vec![0, 1, 2]);
        assert_eq!(drain(&mut second), vec![0, 1, 2]);
    }

    #[test]
    fn test_dropped_subscriber_does_not_break_notification() {
        let cell = StateCell::new(0u32);
        let dropped = cell.subscribe();
        let mut live = cell.subscribe();
        drop(dropped);
        cell.set(1);
        cell.set(2);
        assert_eq!(drain(&mut live), vec![0, 1, 2]);
    }

    #[test]
    fn test_stream_ends_when_cell_dropped() {
        let cell = StateCell::new(1u32);
        let mut values = cell.subscribe();
        drop(cell);
        assert_eq!(values.next().now_or_never(), Some(Some(1)));
        assert_eq!(values.next().now_or_never(), Some(None));
    }
}
