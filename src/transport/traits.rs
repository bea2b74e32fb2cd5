//! Transport-facing contracts
//!
//! The manager talks to the message bus and the RPC listener only through
//! these traits, and registers itself with them as a [`BusHandler`] and an
//! [`RpcHandler`].

use crate::queue::{MessageId, Priority, ReturnCode, Route};
use crate::transport::error::TransportResult;
use std::sync::Arc;

/// Which encoding family a bus message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ProtocolFamily {
    /// Client-facing document operations
    DocumentApi,
    /// Node-to-node storage traffic
    Storage,
}

/// A command on the message bus
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub family: ProtocolFamily,
    pub id: MessageId,
    pub priority: Priority,
    /// Destination when sending, the sender's reply route when receiving
    pub route: Route,
    /// Wire protocol version the payload is framed with
    pub version: u32,
    pub payload: Vec<u8>,
}

/// A reply on the message bus
#[derive(Debug, Clone, PartialEq)]
pub struct BusReply {
    pub family: ProtocolFamily,
    pub id: MessageId,
    pub route: Route,
    pub version: u32,
    pub payload: Vec<u8>,
    pub result: ReturnCode,
}

/// Flow-control limits pushed to the message bus on reconfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusLimits {
    pub max_pending_count: u32,
    pub max_pending_size: u64,
}

/// Answer to a direct RPC request
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: MessageId,
    pub result: ReturnCode,
    pub payload: Vec<u8>,
}

/// Receiver of traffic arriving on the message bus
pub trait BusHandler: Send + Sync {
    fn handle_message(&self, message: BusMessage);

    fn handle_reply(&self, reply: BusReply);
}

/// Message-bus transport
pub trait MessageBus: Send + Sync {
    /// Start accepting traffic on `port`, delivering it to `handler`
    fn listen(&self, port: u16, handler: Arc<dyn BusHandler>) -> TransportResult<()>;

    fn send(&self, message: BusMessage) -> TransportResult<()>;

    fn reply(&self, reply: BusReply) -> TransportResult<()>;

    fn apply_limits(&self, limits: BusLimits);

    fn shutdown(&self);
}

/// An RPC request awaiting exactly one response
pub trait RpcRequest: Send {
    fn id(&self) -> MessageId;

    fn priority(&self) -> Priority;

    fn payload(&self) -> &[u8];

    /// Answer the request; consumes the handle
    fn respond(self: Box<Self>, response: RpcResponse);
}

/// Receiver of direct RPC requests
pub trait RpcHandler: Send + Sync {
    fn handle_request(&self, request: Box<dyn RpcRequest>);
}

/// Direct RPC transport
pub trait RpcListener: Send + Sync {
    fn listen(&self, port: u16, handler: Arc<dyn RpcHandler>) -> TransportResult<()>;

    fn shutdown(&self);
}
