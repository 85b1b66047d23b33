//! `EventStream`: a lock-free-tail, single-producer-multi-consumer broadcast
//! primitive (C1). One producer posts opaque events; any number of
//! subscribers consume them at their own pace, starting from the tail as it
//! stood when they subscribed.
//!
//! A stream is a singly-linked list of [`Node`]s. `post` appends a node under
//! a short-lived lock on the tail pointer; subscribers hold their own cursor
//! (an `Arc<Node<E>>`) and read `next` without taking that lock once they
//! have it, which is the "lock-free-tail" property: the tail mutation and a
//! subscriber's traversal never contend past the single node append.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Node<E> {
    evt: E,
    next: Mutex<Option<Arc<Node<E>>>>,
}

/// A broadcast stream of events of type `E`.
///
/// `E` is typically a small enum tagging the kind of change (see
/// `DispatchEvent` in the crate root) rather than a full snapshot.
pub struct EventStream<E> {
    tail: Mutex<Option<Arc<Node<E>>>>,
    notify: Notify,
}

impl<E> std::fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

impl<E> Default for EventStream<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventStream<E> {
    /// Create an empty stream with no tail.
    pub fn new() -> Self {
        Self {
            tail: Mutex::new(None),
            notify: Notify::new(),
        }
    }
}

/// A subscriber task's two hooks: "subscription started" and "event
/// delivered", each returning `true` to request termination.
///
/// Kept as a trait rather than a pair of closures so that adapters such as
/// `housekeeper::dispatch` can carry one stateful object across both calls.
pub trait StreamWatcher<E>: Send + 'static {
    /// Called once, right after the cursor is established. Returning `true`
    /// skips `on_event` entirely and ends the task immediately.
    fn on_start(&mut self) -> bool {
        false
    }

    /// Called once per event in post order. Returning `true` ends the task.
    fn on_event(&mut self, evt: &E) -> bool;
}

impl<E, F> StreamWatcher<E> for F
where
    F: FnMut(&E) -> bool + Send + 'static,
{
    fn on_event(&mut self, evt: &E) -> bool {
        (self)(evt)
    }
}

impl<E> EventStream<E>
where
    E: Send + Sync + 'static,
{
    /// Append `evt` to the tail and wake every subscriber waiting on it.
    ///
    /// Never blocks except for the brief tail-mutation lock; the caller
    /// (`HouseKeeper`) is expected to hold its own write-exclusive lock
    /// across the `ccn` increment and this call so event order matches
    /// `ccn` order.
    pub fn post(&self, evt: E) {
        let node = Arc::new(Node {
            evt,
            next: Mutex::new(None),
        });

        let mut tail = self.tail.lock();
        if let Some(old_tail) = tail.as_ref() {
            *old_tail.next.lock() = Some(node.clone());
        }
        *tail = Some(node);
        drop(tail);

        self.notify.notify_waiters();
    }

    async fn wait_for_tail(&self) -> Arc<Node<E>> {
        loop {
            let notified = self.notify.notified();
            if let Some(node) = self.tail.lock().clone() {
                return node;
            }
            notified.await;
        }
    }

    async fn wait_for_next(&self, cursor: &Arc<Node<E>>) -> Arc<Node<E>> {
        loop {
            let notified = self.notify.notified();
            if let Some(node) = cursor.next.lock().clone() {
                return node;
            }
            notified.await;
        }
    }

    /// Start a subscriber task.
    ///
    /// The present tail (if any) is snapshotted and treated as obsolete:
    /// events already posted when `watch` is called are skipped. `on_start`
    /// is invoked once the cursor is established ("subscription started");
    /// if it returns `true` the task exits before ever calling `on_event`.
    /// `on_event` is then invoked once per subsequent event in post order;
    /// returning `true` (or a panic, caught per-subscriber) terminates the
    /// task without affecting the stream or any other subscriber.
    pub fn watch<W>(self: &Arc<Self>, mut watcher: W) -> JoinHandle<()>
    where
        W: StreamWatcher<E>,
    {
        let stream = self.clone();
        tokio::spawn(async move {
            let mut cursor = stream.wait_for_tail().await;

            if watcher.on_start() {
                return;
            }

            loop {
                cursor = stream.wait_for_next(&cursor).await;
                if watcher.on_event(&cursor.evt) {
                    return;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn subscriber_started_while_empty_gets_next_event() {
        let stream = Arc::new(EventStream::<u32>::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_task = received.clone();

        let handle = stream.watch(move |evt: &u32| {
            received_task.lock().push(*evt);
            false
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.post(1);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*received.lock(), vec![1]);
        handle.abort();
    }

    #[tokio::test]
    async fn events_posted_before_watch_are_not_delivered() {
        let stream = Arc::new(EventStream::<u32>::new());
        stream.post(1);
        stream.post(2);

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_task = received.clone();
        let handle = stream.watch(move |evt: &u32| {
            received_task.lock().push(*evt);
            false
        });

        stream.post(3);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*received.lock(), vec![3]);
        handle.abort();
    }

    #[tokio::test]
    async fn returning_stop_terminates_only_that_subscriber() {
        let stream = Arc::new(EventStream::<u32>::new());
        let a_count = Arc::new(AtomicUsize::new(0));
        let b_count = Arc::new(AtomicUsize::new(0));

        let a_count_task = a_count.clone();
        let _a = stream.watch(move |_: &u32| {
            a_count_task.fetch_add(1, Ordering::SeqCst);
            true
        });

        let b_count_task = b_count.clone();
        let _b = stream.watch(move |_: &u32| {
            b_count_task.fetch_add(1, Ordering::SeqCst);
            false
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.post(1);
        stream.post(2);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_producer() {
        let stream = Arc::new(EventStream::<u32>::new());
        let received = Arc::new(AtomicUsize::new(0));
        let received_task = received.clone();

        let handle = stream.watch(move |_: &u32| {
            received_task.fetch_add(1, Ordering::SeqCst);
            false
        });

        tokio::time::sleep(Duration::from_millis(5)).await;

        let start = std::time::Instant::now();
        for i in 0..100u32 {
            stream.post(i);
        }
        assert!(start.elapsed() < Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.load(Ordering::SeqCst), 100);
        handle.abort();
    }
}
