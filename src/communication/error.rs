//! Communication Error Types

use crate::communication::manager::ManagerState;
use crate::core::error_handling::ContextualError;
use crate::queue::MessageId;
use crate::transport::TransportError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CommError {
    #[error("Communication manager is closed")]
    Closed,

    #[error("Invalid manager state: expected {expected}, was {actual}")]
    InvalidState {
        expected: ManagerState,
        actual: ManagerState,
    },

    #[error("Failed to start {component}: {source}")]
    Startup {
        component: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Failed to spawn pump thread: {0}")]
    PumpSpawn(#[source] std::io::Error),

    #[error("Pump thread panicked")]
    PumpPanicked,

    #[error("Command {id} has no destination route")]
    NoRoute { id: MessageId },

    #[error("Reply {id} has no transport context")]
    NoTransportContext { id: MessageId },

    #[error("Reply {id} does not match any pending command")]
    UnknownReply { id: MessageId },

    #[error("Command {id} is already pending")]
    DuplicatePending { id: MessageId },

    #[error("Transport failure for message {id}: {source}")]
    Transport {
        id: MessageId,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{message}")]
    Synchronisation { message: String },
}

/// Result type for communication operations
pub type CommResult<T> = Result<T, CommError>;

impl ContextualError for CommError {
    fn is_user_actionable(&self) -> bool {
        match self {
            CommError::Startup { .. } => true,
            CommError::Config(error) => error.is_user_actionable(),
            _ => false,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            CommError::Startup { .. } => Some(self.to_string()),
            CommError::Config(error) => error.user_message(),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse configuration: {message}")]
    Parse { message: String },

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        true
    }

    fn user_message(&self) -> Option<String> {
        Some(self.to_string())
    }
}
