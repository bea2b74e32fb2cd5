//! Transport context attached to inbound commands
//!
//! The context owns whatever is needed to answer on the channel a command
//! arrived on. It moves into the reply with `make_reply()` and is consumed
//! when that reply is sent.

use crate::queue::Route;
use crate::transport::protocol::ProtocolGeneration;
use crate::transport::traits::{ProtocolFamily, RpcRequest};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum TransportKind {
    DocumentApi,
    StorageProtocol,
    Rpc,
}

/// Reply route and protocol generation of a message-bus command
#[derive(Debug, Clone)]
pub struct BusReplyHandle {
    reply_route: Route,
    protocol: Arc<ProtocolGeneration>,
}

impl BusReplyHandle {
    pub fn new(reply_route: Route, protocol: Arc<ProtocolGeneration>) -> Self {
        Self {
            reply_route,
            protocol,
        }
    }

    pub fn reply_route(&self) -> &Route {
        &self.reply_route
    }

    /// Generation the command was decoded with; the reply is encoded with it
    pub fn protocol(&self) -> &Arc<ProtocolGeneration> {
        &self.protocol
    }
}

pub enum TransportContext {
    DocumentApi(BusReplyHandle),
    StorageProtocol(BusReplyHandle),
    Rpc(Box<dyn RpcRequest>),
}

impl TransportContext {
    /// Context for a command received on the message bus
    pub fn for_bus(family: ProtocolFamily, handle: BusReplyHandle) -> Self {
        match family {
            ProtocolFamily::DocumentApi => TransportContext::DocumentApi(handle),
            ProtocolFamily::Storage => TransportContext::StorageProtocol(handle),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            TransportContext::DocumentApi(_) => TransportKind::DocumentApi,
            TransportContext::StorageProtocol(_) => TransportKind::StorageProtocol,
            TransportContext::Rpc(_) => TransportKind::Rpc,
        }
    }
}

impl fmt::Debug for TransportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportContext::DocumentApi(handle) => {
                f.debug_tuple("DocumentApi").field(handle).finish()
            }
            TransportContext::StorageProtocol(handle) => {
                f.debug_tuple("StorageProtocol").field(handle).finish()
            }
            TransportContext::Rpc(request) => f
                .debug_struct("Rpc")
                .field("id", &request.id())
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{FramedProtocol, ProtocolRegistry};

    #[test]
    fn test_for_bus_selects_variant_by_family() {
        let registry = ProtocolRegistry::new(Box::new(FramedProtocol::new(1)));
        let handle = BusReplyHandle::new(Route::new("client/1"), registry.current());

        let document = TransportContext::for_bus(ProtocolFamily::DocumentApi, handle.clone());
        let storage = TransportContext::for_bus(ProtocolFamily::Storage, handle);

        assert_eq!(document.kind(), TransportKind::DocumentApi);
        assert_eq!(storage.kind(), TransportKind::StorageProtocol);
        assert_eq!(TransportKind::StorageProtocol.to_string(), "StorageProtocol");
    }
}
