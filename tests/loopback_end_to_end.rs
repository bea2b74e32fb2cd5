//! End-to-end traffic through a communication manager over the in-memory
//! transports, using only the public API

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storcomm::communication::api::{
    ChannelPipeline, CommunicationConfig, CommunicationManager, Counter, ManagerState,
    SHUTDOWN_REASON,
};
use storcomm::queue::{Direction, ReturnCode, Route, StorageMessage};
use storcomm::transport::api::{
    BusMessage, FramedProtocol, LoopbackBus, LoopbackRpc, Protocol, ProtocolFamily,
};

struct Node {
    bus: Arc<LoopbackBus>,
    rpc: Arc<LoopbackRpc>,
    manager: Arc<CommunicationManager>,
    inbound: Receiver<StorageMessage>,
}

fn node() -> Node {
    let bus = Arc::new(LoopbackBus::new());
    let rpc = Arc::new(LoopbackRpc::new());
    let (pipeline, inbound) = ChannelPipeline::new();
    let mut config = CommunicationConfig::default();
    config.queue.poll_interval_ms = 5;
    let manager = CommunicationManager::builder(bus.clone(), rpc.clone(), Arc::new(pipeline))
        .config(config)
        .build()
        .unwrap();
    Node {
        bus,
        rpc,
        manager,
        inbound,
    }
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn test_command_round_trip_over_echoing_bus() {
    let node = node();
    node.bus.set_echo(true);
    node.manager.open().unwrap();
    assert_eq!(node.manager.state(), ManagerState::Open);

    for id in 1..=3 {
        node.manager
            .on_upward(
                StorageMessage::command(id, format!("doc-{}", id).into_bytes())
                    .with_address(Route::new("storage/0")),
            )
            .unwrap();
    }

    let mut replies: Vec<StorageMessage> = (0..3)
        .map(|_| node.inbound.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    replies.sort_by_key(|reply| reply.id());
    for (reply, id) in replies.iter().zip(1..) {
        assert!(reply.is_reply());
        assert_eq!(reply.id(), id);
        assert_eq!(reply.direction(), Direction::Inbound);
        assert_eq!(reply.payload(), format!("doc-{}", id).as_bytes());
    }
    assert_eq!(node.manager.pending_count(), 0);

    node.manager.close().unwrap();
    assert!(node.bus.is_shut_down());
    assert!(node.rpc.is_shut_down());
}

#[test]
fn test_bus_and_rpc_commands_are_answered_on_their_own_transport() {
    let node = node();
    node.manager.open().unwrap();

    node.bus.deliver_message(BusMessage {
        family: ProtocolFamily::DocumentApi,
        id: 100,
        priority: 5,
        route: Route::new("client/1"),
        version: 1,
        payload: FramedProtocol::new(1).encode(b"get").unwrap(),
    });
    node.rpc.request(200, 5, b"stat".to_vec());

    for _ in 0..2 {
        let mut command = node.inbound.recv_timeout(Duration::from_secs(5)).unwrap();
        let reply = command
            .make_reply(b"done".to_vec())
            .with_result(ReturnCode::Ok);
        node.manager.on_upward(reply).unwrap();
    }

    assert!(wait_until(|| node.bus.replies().len() == 1
        && node.rpc.responses().len() == 1));
    assert_eq!(node.bus.replies()[0].id, 100);
    assert_eq!(node.bus.replies()[0].route, Route::new("client/1"));
    assert_eq!(node.rpc.responses()[0].id, 200);
    assert_eq!(node.rpc.responses()[0].payload, b"done".to_vec());

    node.manager.close().unwrap();
}

#[test]
fn test_close_aborts_unanswered_inbound_commands() {
    let node = node();
    // Queued before open, so nothing has been delivered yet
    node.manager
        .handle_rpc_request(Box::new(node.rpc.make_request(7, 3, Vec::new())));
    node.manager
        .on_upward(StorageMessage::command(8, Vec::new()).with_address(Route::new("s")))
        .unwrap();

    node.manager.close().unwrap();

    let responses = node.rpc.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].id, 7);
    assert_eq!(
        responses[0].result,
        ReturnCode::Aborted(SHUTDOWN_REASON.to_string())
    );
    assert_eq!(node.manager.counter(Counter::AbortedOnClose), 1);
    assert_eq!(node.manager.counter(Counter::DiscardedOnClose), 1);
    assert!(node.bus.sent().is_empty());
}

#[test]
fn test_messages_after_close_are_dropped() {
    let node = node();
    node.manager.open().unwrap();
    node.manager.close().unwrap();

    let result = node
        .manager
        .on_upward(StorageMessage::command(1, Vec::new()).with_address(Route::new("s")));

    assert!(result.is_err());
    assert_eq!(node.manager.counter(Counter::DroppedClosed), 1);
    assert_eq!(node.manager.queue_size(), 0);
    assert!(node.inbound.try_recv().is_err());
}
