// src/utils/queue.rs
//! Blocking command queue used between producer and consumer threads
//!
//! A thin layer over a `crossbeam_channel` unbounded channel that adds a
//! `freeze` operation: once frozen, pushes are rejected and every blocked
//! popper wakes up with [`Pop::Closed`]. Freezing is how threads signal
//! shutdown to each other deterministically instead of being killed.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Error returned by [`CommandQueue::push`] after the queue was frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue is frozen")]
pub struct QueueFrozen;

/// Outcome of a [`CommandQueue::pop`].
#[derive(Debug)]
pub enum Pop<T> {
    /// An item was dequeued.
    Item(T),
    /// The timeout elapsed with nothing to dequeue.
    TimedOut,
    /// The queue was frozen; no more items will ever arrive.
    Closed,
}

enum Msg<T> {
    Item(T),
    Freeze,
}

/// Thread-safe FIFO with blocking pop and a terminal freeze state.
///
/// The queue holds both channel endpoints, so it never disconnects on its
/// own; [`CommandQueue::freeze`] is the only way to close it. The freeze
/// marker is re-broadcast by each woken popper so that every blocked
/// consumer observes [`Pop::Closed`], however many there are.
pub struct CommandQueue<T> {
    tx: Sender<Msg<T>>,
    rx: Receiver<Msg<T>>,
    frozen: AtomicBool,
}

impl<T> CommandQueue<T> {
    /// Creates an empty, unfrozen queue.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        CommandQueue {
            tx,
            rx,
            frozen: AtomicBool::new(false),
        }
    }

    /// Enqueues an item and wakes one waiting popper.
    ///
    /// Fails once the queue has been frozen.
    pub fn push(&self, item: T) -> Result<(), QueueFrozen> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(QueueFrozen);
        }
        self.tx.send(Msg::Item(item)).map_err(|_| QueueFrozen)
    }

    /// Blocks until an item is available, the timeout elapses, or the
    /// queue is frozen. `None` waits indefinitely.
    pub fn pop(&self, timeout: Option<Duration>) -> Pop<T> {
        if self.frozen.load(Ordering::SeqCst) {
            return Pop::Closed;
        }

        let received = match timeout {
            Some(t) => self.rx.recv_timeout(t),
            None => self
                .rx
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Msg::Item(item)) => Pop::Item(item),
            Ok(Msg::Freeze) => {
                // Pass the marker on so the next blocked popper wakes too.
                let _ = self.tx.send(Msg::Freeze);
                Pop::Closed
            }
            Err(RecvTimeoutError::Timeout) => Pop::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Pop::Closed,
        }
    }

    /// Marks the queue closed, rejects further pushes, and wakes all
    /// blocked poppers with [`Pop::Closed`].
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Msg::Freeze);
        }
    }

    /// Whether [`CommandQueue::freeze`] has been called.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_then_pop_is_fifo() {
        let q = CommandQueue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert!(matches!(q.pop(None), Pop::Item(1)));
        assert!(matches!(q.pop(None), Pop::Item(2)));
    }

    #[test]
    fn pop_times_out_when_empty() {
        let q: CommandQueue<u32> = CommandQueue::new();
        assert!(matches!(
            q.pop(Some(Duration::from_millis(10))),
            Pop::TimedOut
        ));
    }

    #[test]
    fn push_after_freeze_is_rejected() {
        let q = CommandQueue::new();
        q.freeze();
        assert_eq!(q.push(7), Err(QueueFrozen));
        assert!(q.is_frozen());
    }

    #[test]
    fn freeze_wakes_all_blocked_poppers() {
        let q: Arc<CommandQueue<u32>> = Arc::new(CommandQueue::new());
        let mut handles = Vec::new();

        for _ in 0..3 {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                matches!(q.pop(Some(Duration::from_secs(10))), Pop::Closed)
            }));
        }

        // Give the poppers a moment to block.
        thread::sleep(Duration::from_millis(50));
        q.freeze();

        for h in handles {
            assert!(h.join().unwrap());
        }
    }

    #[test]
    fn pop_after_freeze_returns_closed_immediately() {
        let q = CommandQueue::new();
        q.push("item").unwrap();
        q.freeze();
        // Frozen queues report Closed even if items were left behind.
        assert!(matches!(q.pop(None), Pop::Closed));
    }
}
