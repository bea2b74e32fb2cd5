//! Transport Boundary
//!
//! Everything the communication manager needs from the network side:
//!
//! - [`TransportContext`]: which channel an inbound command came from, and
//!   the handle to answer on it
//! - [`ProtocolRegistry`]: the current protocol generation plus the retired
//!   generations that in-flight messages still reference
//! - [`MessageBus`] / [`RpcListener`]: the two transports, with in-memory
//!   [`loopback`] implementations

mod context;
mod error;
mod protocol;
mod traits;

pub mod api;
pub mod loopback;

pub use context::{BusReplyHandle, TransportContext, TransportKind};
pub use error::{TransportError, TransportResult};
pub use protocol::{
    FramedProtocol, FramedProtocolFactory, Protocol, ProtocolFactory, ProtocolGeneration,
    ProtocolRegistry, DEFAULT_GRACE_PERIOD,
};
pub use traits::{
    BusHandler, BusLimits, BusMessage, BusReply, MessageBus, ProtocolFamily, RpcHandler,
    RpcListener, RpcRequest, RpcResponse,
};
