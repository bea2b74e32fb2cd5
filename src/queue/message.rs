//! Internal message representation
//!
//! Every command and reply that crosses the node boundary is carried as a
//! [`StorageMessage`]. Besides the payload it remembers which way it travels,
//! which protocol generation it was built against and, for inbound commands,
//! the transport context needed to answer on the originating channel.

use crate::transport::{ProtocolGeneration, TransportContext, TransportKind};
use std::fmt;
use std::sync::Arc;

/// Unique message identifier; a reply carries the identifier of its command
pub type MessageId = u64;

/// Message priority, 0 is the most urgent
pub type Priority = u8;

pub const HIGHEST_PRIORITY: Priority = 0;
pub const LOWEST_PRIORITY: Priority = 255;
pub const DEFAULT_PRIORITY: Priority = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum MessageKind {
    Command,
    Reply,
}

/// Which way a message travels through the communication manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Direction {
    /// Arrived from the network, headed into the pipeline
    Inbound,
    /// Produced by the pipeline, headed to the network
    Outbound,
}

/// Outcome carried by replies
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReturnCode {
    #[default]
    Ok,
    /// The node gave up on the message, typically during shutdown
    Aborted(String),
    /// The message could not be accepted (unknown protocol, bad frame)
    Rejected(String),
    /// Any other failure reported by the remote side
    Failure(String),
}

impl ReturnCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, ReturnCode::Ok)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnCode::Ok => write!(f, "OK"),
            ReturnCode::Aborted(reason) => write!(f, "ABORTED ({})", reason),
            ReturnCode::Rejected(reason) => write!(f, "REJECTED ({})", reason),
            ReturnCode::Failure(reason) => write!(f, "FAILURE ({})", reason),
        }
    }
}

/// Message-bus route a command is sent on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route(String);

impl Route {
    pub fn new(route: impl Into<String>) -> Self {
        Self(route.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A command or reply moving through the node boundary
///
/// # Example
///
/// ```rust
/// use storcomm::queue::{Direction, Route, StorageMessage};
///
/// let mut command = StorageMessage::command(7, b"put doc".to_vec())
///     .with_priority(3)
///     .with_address(Route::new("storage/cluster.content/distributor/0"));
///
/// let reply = command.make_reply(Vec::new());
/// assert_eq!(reply.id(), 7);
/// assert!(reply.is_reply());
/// assert_eq!(reply.direction(), Direction::Inbound);
/// ```
pub struct StorageMessage {
    id: MessageId,
    kind: MessageKind,
    direction: Direction,
    priority: Priority,
    address: Option<Route>,
    payload: Vec<u8>,
    result: ReturnCode,
    queue_sequence: u64,
    protocol: Option<Arc<ProtocolGeneration>>,
    transport: Option<TransportContext>,
}

impl StorageMessage {
    /// New outbound command
    pub fn command(id: MessageId, payload: Vec<u8>) -> Self {
        Self::new(id, MessageKind::Command, payload)
    }

    /// New reply to the command with the same identifier
    pub fn reply(id: MessageId, payload: Vec<u8>) -> Self {
        Self::new(id, MessageKind::Reply, payload)
    }

    fn new(id: MessageId, kind: MessageKind, payload: Vec<u8>) -> Self {
        Self {
            id,
            kind,
            direction: Direction::Outbound,
            priority: DEFAULT_PRIORITY,
            address: None,
            payload,
            result: ReturnCode::Ok,
            queue_sequence: 0, // Set by the queue
            protocol: None,
            transport: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_address(mut self, address: Route) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_result(mut self, result: ReturnCode) -> Self {
        self.result = result;
        self
    }

    pub fn with_protocol(mut self, protocol: Arc<ProtocolGeneration>) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_transport(mut self, transport: TransportContext) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the reply to this command
    ///
    /// The reply travels the opposite way, keeps the command's priority and
    /// protocol generation, and takes over the transport context so it can be
    /// answered on the channel the command arrived on.
    pub fn make_reply(&mut self, payload: Vec<u8>) -> StorageMessage {
        let direction = match self.direction {
            Direction::Inbound => Direction::Outbound,
            Direction::Outbound => Direction::Inbound,
        };
        StorageMessage {
            id: self.id,
            kind: MessageKind::Reply,
            direction,
            priority: self.priority,
            address: None,
            payload,
            result: ReturnCode::Ok,
            queue_sequence: 0,
            protocol: self.protocol.clone(),
            transport: self.transport.take(),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn is_reply(&self) -> bool {
        self.kind == MessageKind::Reply
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn address(&self) -> Option<&Route> {
        self.address.as_ref()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn result(&self) -> &ReturnCode {
        &self.result
    }

    /// Sequence number assigned by the queue at enqueue time
    pub fn queue_sequence(&self) -> u64 {
        self.queue_sequence
    }

    pub fn protocol(&self) -> Option<&Arc<ProtocolGeneration>> {
        self.protocol.as_ref()
    }

    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.transport.as_ref().map(TransportContext::kind)
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn set_result(&mut self, result: ReturnCode) {
        self.result = result;
    }

    pub fn set_protocol(&mut self, protocol: Arc<ProtocolGeneration>) {
        self.protocol = Some(protocol);
    }

    pub(crate) fn set_queue_sequence(&mut self, sequence: u64) {
        self.queue_sequence = sequence;
    }

    /// Remove the transport context; a second call returns `None`
    pub fn take_transport(&mut self) -> Option<TransportContext> {
        self.transport.take()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

impl fmt::Debug for StorageMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageMessage")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .field("priority", &self.priority)
            .field("address", &self.address)
            .field("payload_len", &self.payload.len())
            .field("result", &self.result)
            .field("queue_sequence", &self.queue_sequence)
            .field(
                "protocol_generation",
                &self.protocol.as_ref().map(|p| p.generation()),
            )
            .field("transport", &self.transport_kind())
            .finish()
    }
}

impl fmt::Display for StorageMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} #{} (pri {})",
            self.direction, self.kind, self.id, self.priority
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BusReplyHandle, FramedProtocol, ProtocolRegistry};

    #[test]
    fn test_command_defaults() {
        let command = StorageMessage::command(1, b"data".to_vec());

        assert_eq!(command.kind(), MessageKind::Command);
        assert_eq!(command.direction(), Direction::Outbound);
        assert_eq!(command.priority(), DEFAULT_PRIORITY);
        assert!(command.address().is_none());
        assert!(command.result().is_ok());
        assert!(!command.has_transport());
    }

    #[test]
    fn test_make_reply_moves_transport_context() {
        let registry = ProtocolRegistry::new(Box::new(FramedProtocol::new(1)));
        let handle = BusReplyHandle::new(Route::new("client/0"), registry.current());
        let mut command = StorageMessage::command(9, Vec::new())
            .with_direction(Direction::Inbound)
            .with_priority(4)
            .with_protocol(registry.current())
            .with_transport(TransportContext::StorageProtocol(handle));

        let mut reply = command.make_reply(b"ok".to_vec());

        assert_eq!(reply.id(), 9);
        assert_eq!(reply.priority(), 4);
        assert_eq!(reply.direction(), Direction::Outbound);
        assert_eq!(reply.transport_kind(), Some(TransportKind::StorageProtocol));
        assert!(!command.has_transport());
        assert!(reply.take_transport().is_some());
        assert!(reply.take_transport().is_none());
    }

    #[test]
    fn test_return_code_display() {
        assert_eq!(ReturnCode::Ok.to_string(), "OK");
        assert_eq!(
            ReturnCode::Aborted("node shutting down".to_string()).to_string(),
            "ABORTED (node shutting down)"
        );
    }

    #[test]
    fn test_display_summarises_message() {
        let message = StorageMessage::reply(3, Vec::new()).with_direction(Direction::Inbound);

        assert_eq!(message.to_string(), "Inbound Reply #3 (pri 120)");
    }
}
