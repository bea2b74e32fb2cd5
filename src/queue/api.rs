//! Public API for the event queue
//!
//! External modules should import from here rather than directly from
//! internal modules.

// Queue
pub use crate::queue::priority_queue::{PriorityQueue, FIXED_REPLY_PRIORITY};

// Message types
pub use crate::queue::message::{
    Direction, MessageId, MessageKind, Priority, ReturnCode, Route, StorageMessage,
    DEFAULT_PRIORITY, HIGHEST_PRIORITY, LOWEST_PRIORITY,
};
