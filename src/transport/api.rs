//! Public API for the transport boundary
//!
//! External modules should import from here rather than directly from
//! internal modules.

// Contexts
pub use crate::transport::context::{BusReplyHandle, TransportContext, TransportKind};

// Errors
pub use crate::transport::error::{TransportError, TransportResult};

// Protocols and generations
pub use crate::transport::protocol::{
    FramedProtocol, FramedProtocolFactory, Protocol, ProtocolFactory, ProtocolGeneration,
    ProtocolRegistry, DEFAULT_GRACE_PERIOD,
};

// Transport contracts and wire types
pub use crate::transport::traits::{
    BusHandler, BusLimits, BusMessage, BusReply, MessageBus, ProtocolFamily, RpcHandler,
    RpcListener, RpcRequest, RpcResponse,
};

// In-memory transports
pub use crate::transport::loopback::{LoopbackBus, LoopbackRpc, LoopbackRpcRequest};
