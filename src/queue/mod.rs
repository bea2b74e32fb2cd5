//! Priority Event Queue
//!
//! The queue sits between every producer of network-facing traffic and the
//! single pump thread of the communication manager.
//!
//! # Ordering
//!
//! - Lower numeric priority leaves first (0 is the most urgent)
//! - Equal priorities leave in enqueue order (monotonic sequence numbers)
//! - Replies all share one fixed priority, so they stay FIFO among
//!   themselves and only priority-0 commands can overtake them
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ message bus  │   │ RPC listener │   │   pipeline   │
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        │ enqueue          │ enqueue          │ enqueue
//!        ▼                  ▼                  ▼
//! ┌─────────────────────────────────────────────────────┐
//! │        PriorityQueue  (priority, sequence) heap     │
//! └──────────────────────────┬──────────────────────────┘
//!                            │ get_next(timeout)
//!                            ▼
//!                     ┌─────────────┐
//!                     │  comm-pump  │ (single consumer)
//!                     └─────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use std::time::Duration;
//! use storcomm::queue::{PriorityQueue, StorageMessage};
//!
//! let queue = PriorityQueue::new();
//! queue.enqueue(StorageMessage::command(1, Vec::new()).with_priority(200));
//! queue.enqueue(StorageMessage::reply(2, Vec::new()));
//!
//! // The reply overtakes the low-priority command
//! assert_eq!(queue.get_next(Some(Duration::ZERO)).unwrap().id(), 2);
//! assert_eq!(queue.get_next(Some(Duration::ZERO)).unwrap().id(), 1);
//! assert!(queue.get_next(Some(Duration::ZERO)).is_none());
//! ```

mod message;
mod priority_queue;

pub mod api;

pub use message::{
    Direction, MessageId, MessageKind, Priority, ReturnCode, Route, StorageMessage,
    DEFAULT_PRIORITY, HIGHEST_PRIORITY, LOWEST_PRIORITY,
};
pub use priority_queue::{PriorityQueue, FIXED_REPLY_PRIORITY};

#[cfg(test)]
mod tests;
