//! Transport Error Types

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("No route to {route}")]
    NoRoute { route: String },

    #[error("Protocol version mismatch (expected {expected}, found {found})")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("Unsupported protocol version: {version}")]
    UnsupportedVersion { version: u32 },

    #[error("Failed to listen on port {port}: {reason}")]
    Listen { port: u16, reason: String },

    #[error("Transport is closed")]
    Closed,

    #[error("Send failed: {reason}")]
    Send { reason: String },
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
