//! Outbound commands awaiting their reply

use crate::communication::error::{CommError, CommResult};
use crate::core::sync::lock_or_recover;
use crate::queue::{MessageId, Priority, Route};
use crate::transport::ProtocolGeneration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// What the manager remembers about a command it sent
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub id: MessageId,
    pub priority: Priority,
    pub address: Route,
    /// Generation the command was encoded with; the reply is decoded with it
    pub protocol: Arc<ProtocolGeneration>,
    pub sent_at: Instant,
}

/// Pending-command map keyed by message identifier
#[derive(Debug, Default)]
pub struct PendingCommands {
    entries: Mutex<HashMap<MessageId, PendingCommand>>,
}

impl PendingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sent command; a second entry for the same id is rejected
    pub fn insert(&self, command: PendingCommand) -> CommResult<()> {
        let mut entries = lock_or_recover(&self.entries, "pending commands");
        if entries.contains_key(&command.id) {
            return Err(CommError::DuplicatePending { id: command.id });
        }
        entries.insert(command.id, command);
        Ok(())
    }

    pub fn remove(&self, id: MessageId) -> Option<PendingCommand> {
        lock_or_recover(&self.entries, "pending commands").remove(&id)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        lock_or_recover(&self.entries, "pending commands").contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.entries, "pending commands").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every pending command; returns how many were dropped
    pub fn clear(&self) -> usize {
        let mut entries = lock_or_recover(&self.entries, "pending commands");
        let dropped = entries.len();
        entries.clear();
        dropped
    }
}
