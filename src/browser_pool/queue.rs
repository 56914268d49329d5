//! Priority-aware fair wait queue backing `BrowserPool::acquire`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tokio::sync::oneshot;

use crate::config::Priority;

struct Waiter<T> {
    priority: Priority,
    seq: u64,
    tx: oneshot::Sender<T>,
}

impl<T> PartialEq for Waiter<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl<T> Eq for Waiter<T> {}

impl<T> PartialOrd for Waiter<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Waiter<T> {
    // Higher priority sorts greater. Within equal priority, the *earlier*
    // sequence number sorts greater so `BinaryHeap::pop` (a max-heap) returns
    // the oldest waiter first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// FIFO-within-priority wait queue. Waiters that time out simply drop their
/// receiver; [`hand_off`](Self::hand_off) discovers this lazily (the `send`
/// fails) and moves on to the next waiter instead of requiring removal from
/// the heap.
pub struct WaitQueue<T> {
    heap: BinaryHeap<Waiter<T>>,
    next_seq: u64,
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WaitQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Enqueue a new waiter at `priority`, returning its receiver.
    pub fn push(&mut self, priority: Priority) -> oneshot::Receiver<T> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let (tx, rx) = oneshot::channel();
        self.heap.push(Waiter { priority, seq, tx });
        rx
    }

    /// Hand `value` to the highest-priority, oldest waiter still listening.
    /// Returns `Some(value)` unchanged if the queue is empty or every queued
    /// waiter already timed out.
    pub fn hand_off(&mut self, value: T) -> Option<T> {
        let mut value = value;
        while let Some(waiter) = self.heap.pop() {
            match waiter.tx.send(value) {
                Ok(()) => return None,
                Err(returned) => value = returned,
            }
        }
        Some(value)
    }
}
