//! Priority-then-FIFO event queue feeding the pump thread
//!
//! Many producers (transport callbacks, RPC threads, the pipeline) enqueue and
//! a single consumer dequeues. Entries are ordered by priority first and by
//! enqueue sequence second, so equal-priority messages leave in arrival order.

use crate::core::sync::lock_or_recover;
use crate::queue::message::{Priority, StorageMessage};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Priority assigned to every reply
///
/// Only commands with priority 0 get in front of replies. All replies share
/// this one value so they can never be reordered relative to each other.
pub const FIXED_REPLY_PRIORITY: Priority = 1;

/// Heap entry; ordering is reversed so the std max-heap pops the lowest
/// (priority, sequence) pair first
struct QueuedMessage {
    priority: Priority,
    sequence: u64,
    message: StorageMessage,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.priority.cmp(&self.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            unequal => unequal,
        }
    }
}

struct QueueState {
    heap: BinaryHeap<QueuedMessage>,
    next_sequence: u64,
    // Bumped by signal() so blocked waiters can tell a wakeup from a spurious one
    signal_epoch: u64,
    closed: bool,
}

/// Thread-safe priority queue with blocking, time-bounded dequeue
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use storcomm::queue::{PriorityQueue, StorageMessage};
///
/// let queue = PriorityQueue::new();
/// queue.enqueue(StorageMessage::command(1, Vec::new()).with_priority(5));
/// queue.enqueue(StorageMessage::command(2, Vec::new()).with_priority(0));
///
/// let first = queue.get_next(Some(Duration::ZERO)).unwrap();
/// assert_eq!(first.id(), 2);
/// ```
pub struct PriorityQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    reply_priority: Priority,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::with_reply_priority(FIXED_REPLY_PRIORITY)
    }

    /// Create a queue that places replies at `reply_priority`
    pub fn with_reply_priority(reply_priority: Priority) -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_sequence: 1,
                signal_epoch: 0,
                closed: false,
            }),
            available: Condvar::new(),
            reply_priority,
        }
    }

    pub fn reply_priority(&self) -> Priority {
        self.reply_priority
    }

    /// Insert a message and wake one waiter
    ///
    /// Commands keep their own priority; replies are placed at the queue's
    /// reply priority. Returns the sequence number assigned to the entry, or
    /// 0 when the queue is closed and the message was dropped.
    pub fn enqueue(&self, message: StorageMessage) -> u64 {
        match self.try_enqueue(message) {
            Ok(sequence) => sequence,
            Err(message) => {
                log::debug!("Queue closed; dropping {}", message);
                0
            }
        }
    }

    /// Like [`enqueue`], but hands the message back once the queue is closed
    ///
    /// The closed check and the insert happen under the queue lock, so a
    /// message is either returned here or included in [`close`]'s drain.
    ///
    /// [`enqueue`]: PriorityQueue::enqueue
    /// [`close`]: PriorityQueue::close
    pub fn try_enqueue(&self, mut message: StorageMessage) -> Result<u64, StorageMessage> {
        let priority = if message.is_reply() {
            self.reply_priority
        } else {
            message.priority()
        };

        let sequence = {
            let mut state = lock_or_recover(&self.state, "priority queue");
            if state.closed {
                return Err(message);
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            message.set_queue_sequence(sequence);
            state.heap.push(QueuedMessage {
                priority,
                sequence,
                message,
            });
            sequence
        };

        self.available.notify_one();
        Ok(sequence)
    }

    /// Remove and return the first message in priority-then-FIFO order
    ///
    /// `Some(Duration::ZERO)` polls without waiting, `Some(timeout)` waits up
    /// to `timeout`, `None` waits until a message arrives or [`signal`] is
    /// called. A timeout too large to represent waits indefinitely. Returns
    /// `None` when nothing became available or the queue is closed.
    ///
    /// [`signal`]: PriorityQueue::signal
    pub fn get_next(&self, timeout: Option<Duration>) -> Option<StorageMessage> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = lock_or_recover(&self.state, "priority queue");
        let epoch = state.signal_epoch;

        loop {
            if let Some(entry) = state.heap.pop() {
                return Some(entry.message);
            }
            if state.signal_epoch != epoch || state.closed {
                return None;
            }

            state = match deadline {
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.available
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Wake every waiter without adding an entry
    pub fn signal(&self) {
        {
            let mut state = lock_or_recover(&self.state, "priority queue");
            state.signal_epoch = state.signal_epoch.wrapping_add(1);
        }
        self.available.notify_all();
    }

    /// Number of queued messages; advisory under concurrent mutation
    pub fn size(&self) -> usize {
        lock_or_recover(&self.state, "priority queue").heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Remove every queued message, returned in dequeue order
    pub fn drain(&self) -> Vec<StorageMessage> {
        let heap = {
            let mut state = lock_or_recover(&self.state, "priority queue");
            std::mem::take(&mut state.heap)
        };
        into_dequeue_order(heap)
    }

    /// Refuse further entries and return what is still queued
    ///
    /// Waiters are woken and see an empty queue. Closing again returns
    /// nothing.
    pub fn close(&self) -> Vec<StorageMessage> {
        let heap = {
            let mut state = lock_or_recover(&self.state, "priority queue");
            state.closed = true;
            std::mem::take(&mut state.heap)
        };
        self.available.notify_all();
        into_dequeue_order(heap)
    }

    pub fn is_closed(&self) -> bool {
        lock_or_recover(&self.state, "priority queue").closed
    }
}

fn into_dequeue_order(heap: BinaryHeap<QueuedMessage>) -> Vec<StorageMessage> {
    heap.into_sorted_vec()
        .into_iter()
        .rev()
        .map(|entry| entry.message)
        .collect()
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}
