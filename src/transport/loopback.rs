//! In-memory transports
//!
//! [`LoopbackBus`] and [`LoopbackRpc`] satisfy the transport traits without
//! touching the network. They record every message sent, replied or
//! responded, and let callers inject inbound traffic as if it came from a
//! remote node. The binary runs on them and the tests drive the manager
//! through them.

use crate::core::sync::lock_or_recover;
use crate::queue::{MessageId, Priority, ReturnCode};
use crate::transport::error::{TransportError, TransportResult};
use crate::transport::traits::{
    BusHandler, BusLimits, BusMessage, BusReply, MessageBus, RpcHandler, RpcListener, RpcRequest,
    RpcResponse,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct BusState {
    handler: Option<Arc<dyn BusHandler>>,
    port: Option<u16>,
    sent: Vec<BusMessage>,
    replies: Vec<BusReply>,
    limits: Option<BusLimits>,
    unreachable: HashSet<String>,
    fail_listen: Option<String>,
    echo: bool,
    shut_down: bool,
}

/// Message bus that keeps everything in memory
#[derive(Default)]
pub struct LoopbackBus {
    state: Mutex<BusState>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command sent with an `Ok` reply carrying the same frame
    pub fn set_echo(&self, echo: bool) {
        lock_or_recover(&self.state, "loopback bus").echo = echo;
    }

    /// Make sends to `route` fail with [`TransportError::NoRoute`]
    pub fn set_unreachable(&self, route: &str) {
        lock_or_recover(&self.state, "loopback bus")
            .unreachable
            .insert(route.to_string());
    }

    /// Make the next `listen` call fail with `reason`
    pub fn fail_listen(&self, reason: &str) {
        lock_or_recover(&self.state, "loopback bus").fail_listen = Some(reason.to_string());
    }

    pub fn is_listening(&self) -> bool {
        lock_or_recover(&self.state, "loopback bus").handler.is_some()
    }

    pub fn port(&self) -> Option<u16> {
        lock_or_recover(&self.state, "loopback bus").port
    }

    pub fn is_shut_down(&self) -> bool {
        lock_or_recover(&self.state, "loopback bus").shut_down
    }

    pub fn sent(&self) -> Vec<BusMessage> {
        lock_or_recover(&self.state, "loopback bus").sent.clone()
    }

    pub fn replies(&self) -> Vec<BusReply> {
        lock_or_recover(&self.state, "loopback bus").replies.clone()
    }

    pub fn limits(&self) -> Option<BusLimits> {
        lock_or_recover(&self.state, "loopback bus").limits
    }

    fn handler(&self) -> Option<Arc<dyn BusHandler>> {
        lock_or_recover(&self.state, "loopback bus").handler.clone()
    }

    /// Inject a command from a remote node; false when nobody is listening
    pub fn deliver_message(&self, message: BusMessage) -> bool {
        match self.handler() {
            Some(handler) => {
                handler.handle_message(message);
                true
            }
            None => false,
        }
    }

    /// Inject a reply from a remote node; false when nobody is listening
    pub fn deliver_reply(&self, reply: BusReply) -> bool {
        match self.handler() {
            Some(handler) => {
                handler.handle_reply(reply);
                true
            }
            None => false,
        }
    }
}

impl MessageBus for LoopbackBus {
    fn listen(&self, port: u16, handler: Arc<dyn BusHandler>) -> TransportResult<()> {
        let mut state = lock_or_recover(&self.state, "loopback bus");
        if let Some(reason) = state.fail_listen.take() {
            return Err(TransportError::Listen { port, reason });
        }
        state.handler = Some(handler);
        state.port = Some(port);
        state.shut_down = false;
        log::debug!("Loopback bus listening on port {}", port);
        Ok(())
    }

    fn send(&self, message: BusMessage) -> TransportResult<()> {
        let echo_to = {
            let mut state = lock_or_recover(&self.state, "loopback bus");
            if state.shut_down {
                return Err(TransportError::Closed);
            }
            if state.unreachable.contains(message.route.as_str()) {
                return Err(TransportError::NoRoute {
                    route: message.route.to_string(),
                });
            }
            state.sent.push(message.clone());
            if state.echo {
                state.handler.clone()
            } else {
                None
            }
        };

        if let Some(handler) = echo_to {
            handler.handle_reply(BusReply {
                family: message.family,
                id: message.id,
                route: message.route,
                version: message.version,
                payload: message.payload,
                result: ReturnCode::Ok,
            });
        }
        Ok(())
    }

    fn reply(&self, reply: BusReply) -> TransportResult<()> {
        let mut state = lock_or_recover(&self.state, "loopback bus");
        if state.shut_down {
            return Err(TransportError::Closed);
        }
        state.replies.push(reply);
        Ok(())
    }

    fn apply_limits(&self, limits: BusLimits) {
        log::debug!(
            "Loopback bus limits: {} messages, {} bytes",
            limits.max_pending_count,
            limits.max_pending_size
        );
        lock_or_recover(&self.state, "loopback bus").limits = Some(limits);
    }

    fn shutdown(&self) {
        let mut state = lock_or_recover(&self.state, "loopback bus");
        state.handler = None;
        state.shut_down = true;
    }
}

type ResponseLog = Arc<Mutex<Vec<RpcResponse>>>;

/// RPC request whose response lands in the owning [`LoopbackRpc`]
pub struct LoopbackRpcRequest {
    id: MessageId,
    priority: Priority,
    payload: Vec<u8>,
    responses: ResponseLog,
}

impl RpcRequest for LoopbackRpcRequest {
    fn id(&self) -> MessageId {
        self.id
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn respond(self: Box<Self>, response: RpcResponse) {
        lock_or_recover(&self.responses, "loopback rpc responses").push(response);
    }
}

#[derive(Default)]
struct RpcState {
    handler: Option<Arc<dyn RpcHandler>>,
    port: Option<u16>,
    fail_listen: Option<String>,
    shut_down: bool,
}

/// RPC listener that keeps everything in memory
#[derive(Default)]
pub struct LoopbackRpc {
    state: Mutex<RpcState>,
    responses: ResponseLog,
}

impl LoopbackRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `listen` call fail with `reason`
    pub fn fail_listen(&self, reason: &str) {
        lock_or_recover(&self.state, "loopback rpc").fail_listen = Some(reason.to_string());
    }

    pub fn is_listening(&self) -> bool {
        lock_or_recover(&self.state, "loopback rpc").handler.is_some()
    }

    pub fn port(&self) -> Option<u16> {
        lock_or_recover(&self.state, "loopback rpc").port
    }

    pub fn is_shut_down(&self) -> bool {
        lock_or_recover(&self.state, "loopback rpc").shut_down
    }

    /// Build a request whose response is recorded by this listener
    pub fn make_request(
        &self,
        id: MessageId,
        priority: Priority,
        payload: Vec<u8>,
    ) -> LoopbackRpcRequest {
        LoopbackRpcRequest {
            id,
            priority,
            payload,
            responses: Arc::clone(&self.responses),
        }
    }

    /// Inject a request from a remote client; false when nobody is listening
    pub fn request(&self, id: MessageId, priority: Priority, payload: Vec<u8>) -> bool {
        let handler = lock_or_recover(&self.state, "loopback rpc").handler.clone();
        match handler {
            Some(handler) => {
                handler.handle_request(Box::new(self.make_request(id, priority, payload)));
                true
            }
            None => false,
        }
    }

    pub fn responses(&self) -> Vec<RpcResponse> {
        lock_or_recover(&self.responses, "loopback rpc responses").clone()
    }
}

impl RpcListener for LoopbackRpc {
    fn listen(&self, port: u16, handler: Arc<dyn RpcHandler>) -> TransportResult<()> {
        let mut state = lock_or_recover(&self.state, "loopback rpc");
        if let Some(reason) = state.fail_listen.take() {
            return Err(TransportError::Listen { port, reason });
        }
        state.handler = Some(handler);
        state.port = Some(port);
        state.shut_down = false;
        log::debug!("Loopback RPC listening on port {}", port);
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = lock_or_recover(&self.state, "loopback rpc");
        state.handler = None;
        state.shut_down = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Route;
    use crate::transport::traits::ProtocolFamily;

    #[derive(Default)]
    struct CountingHandler {
        replies: Mutex<Vec<MessageId>>,
    }

    impl BusHandler for CountingHandler {
        fn handle_message(&self, _message: BusMessage) {}

        fn handle_reply(&self, reply: BusReply) {
            self.replies.lock().unwrap().push(reply.id);
        }
    }

    fn message(id: MessageId, route: &str) -> BusMessage {
        BusMessage {
            family: ProtocolFamily::Storage,
            id,
            priority: 5,
            route: Route::new(route),
            version: 1,
            payload: vec![0, 0, 0, 1],
        }
    }

    #[test]
    fn test_send_records_and_respects_unreachable_routes() {
        let bus = LoopbackBus::new();
        bus.set_unreachable("nowhere");

        assert!(bus.send(message(1, "storage/0")).is_ok());
        assert_eq!(
            bus.send(message(2, "nowhere")),
            Err(TransportError::NoRoute {
                route: "nowhere".to_string()
            })
        );
        assert_eq!(bus.sent().len(), 1);
    }

    #[test]
    fn test_echo_replies_to_listener() {
        let bus = LoopbackBus::new();
        let handler = Arc::new(CountingHandler::default());
        bus.listen(19100, handler.clone()).unwrap();
        bus.set_echo(true);

        bus.send(message(7, "storage/0")).unwrap();

        assert_eq!(*handler.replies.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_listen_failure_is_one_shot() {
        let bus = LoopbackBus::new();
        bus.fail_listen("address in use");

        let handler = Arc::new(CountingHandler::default());
        assert!(matches!(
            bus.listen(1, handler.clone()),
            Err(TransportError::Listen { port: 1, .. })
        ));
        assert!(bus.listen(1, handler).is_ok());
    }

    #[test]
    fn test_shutdown_refuses_further_traffic() {
        let bus = LoopbackBus::new();
        bus.listen(1, Arc::new(CountingHandler::default())).unwrap();

        bus.shutdown();

        assert!(!bus.is_listening());
        assert_eq!(bus.send(message(1, "storage/0")), Err(TransportError::Closed));
        assert!(!bus.deliver_reply(BusReply {
            family: ProtocolFamily::Storage,
            id: 1,
            route: Route::new("storage/0"),
            version: 1,
            payload: Vec::new(),
            result: ReturnCode::Ok,
        }));
    }

    #[test]
    fn test_rpc_request_response_is_recorded() {
        let rpc = LoopbackRpc::new();
        let request = Box::new(rpc.make_request(3, 0, b"get".to_vec()));

        assert_eq!(request.payload(), b"get");
        request.respond(RpcResponse {
            id: 3,
            result: ReturnCode::Ok,
            payload: Vec::new(),
        });

        assert_eq!(rpc.responses().len(), 1);
        assert_eq!(rpc.responses()[0].id, 3);
    }
}
