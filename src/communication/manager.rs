//! Communication manager
//!
//! Owns the priority queue and the single pump thread that drains it. Network
//! threads, RPC threads and the pipeline all feed the queue concurrently; the
//! pump delivers inbound traffic to the pipeline and dispatches outbound
//! commands and replies to the transport they belong on.
//!
//! Locks are per structure (queue, pending map, protocol registry, applied
//! configuration, lifecycle state) and never nest with the queue lock.

use crate::communication::config::{CommunicationConfig, ConfigUpdate};
use crate::communication::error::{CommError, CommResult};
use crate::communication::metrics::{
    CommunicationMetrics, Counter, LogSink, MetricSink, MetricsSnapshot,
};
use crate::communication::pending::{PendingCommand, PendingCommands};
use crate::communication::traits::{
    ConfigSubscriber, MetricUpdateHook, PipelineLink, UpwardLink,
};
use crate::core::sync::{handle_mutex_poison, lock_or_recover};
use crate::core::time::{SystemTimeProvider, TimeProvider};
use crate::queue::{Direction, MessageKind, PriorityQueue, ReturnCode, StorageMessage};
use crate::transport::{
    BusHandler, BusMessage, BusReply, BusReplyHandle, FramedProtocolFactory, MessageBus,
    ProtocolFactory, ProtocolFamily, ProtocolGeneration, ProtocolRegistry, RpcHandler,
    RpcListener, RpcRequest, RpcResponse, TransportContext, TransportError,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Result code reason used for commands aborted at shutdown
pub const SHUTDOWN_REASON: &str = "node shutting down";

const PUMP_THREAD_NAME: &str = "comm-pump";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ManagerState {
    Unopened,
    Open,
    Closed,
}

/// What happened to a configuration update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOutcome {
    Applied,
    /// Generation not newer than the applied one
    Stale,
    /// Invalid or unbuildable; the previous configuration stays active
    Rejected,
}

struct AppliedConfig {
    generation: u64,
    config: CommunicationConfig,
}

/// Builder for [`CommunicationManager`]
pub struct CommunicationManagerBuilder {
    config: CommunicationConfig,
    config_generation: u64,
    bus: Arc<dyn MessageBus>,
    rpc: Arc<dyn RpcListener>,
    pipeline: Arc<dyn PipelineLink>,
    factory: Arc<dyn ProtocolFactory>,
    clock: Arc<dyn TimeProvider>,
    sink: Arc<dyn MetricSink>,
}

impl CommunicationManagerBuilder {
    pub fn config(mut self, config: CommunicationConfig) -> Self {
        self.config = config;
        self
    }

    /// Generation of the initial configuration; later updates must be newer
    pub fn config_generation(mut self, generation: u64) -> Self {
        self.config_generation = generation;
        self
    }

    pub fn protocol_factory(mut self, factory: Arc<dyn ProtocolFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validate the configuration, build the initial protocol and assemble
    /// an unopened manager
    pub fn build(self) -> CommResult<Arc<CommunicationManager>> {
        self.config.validate()?;
        let protocol = self
            .factory
            .create(self.config.mbus.protocol_version)
            .map_err(|source| CommError::Startup {
                component: "protocol",
                source,
            })?;

        let protocols = ProtocolRegistry::with_clock(
            protocol,
            self.config.grace_period(),
            Arc::clone(&self.clock),
        );

        Ok(Arc::new(CommunicationManager {
            queue: Arc::new(PriorityQueue::with_reply_priority(
                self.config.queue.reply_priority,
            )),
            pending: PendingCommands::new(),
            protocols,
            metrics: CommunicationMetrics::new(),
            poll_interval_ms: AtomicU64::new(self.config.queue.poll_interval_ms),
            metrics_interval_ms: AtomicU64::new(millis(self.config.metrics_interval())),
            config: Mutex::new(AppliedConfig {
                generation: self.config_generation,
                config: self.config,
            }),
            state: Mutex::new(ManagerState::Unopened),
            closed: AtomicBool::new(false),
            pump: Mutex::new(None),
            bus: self.bus,
            rpc: self.rpc,
            pipeline: self.pipeline,
            factory: self.factory,
            clock: self.clock,
            sink: self.sink,
        }))
    }
}

/// Communication boundary of a storage node
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use storcomm::communication::api::{ChannelPipeline, CommunicationManager};
/// use storcomm::queue::{Route, StorageMessage};
/// use storcomm::transport::api::{LoopbackBus, LoopbackRpc};
///
/// let bus = Arc::new(LoopbackBus::new());
/// let rpc = Arc::new(LoopbackRpc::new());
/// let (pipeline, _inbound) = ChannelPipeline::new();
///
/// let manager = CommunicationManager::builder(bus.clone(), rpc, Arc::new(pipeline))
///     .build()
///     .unwrap();
/// manager.open().unwrap();
///
/// let command = StorageMessage::command(1, b"put".to_vec())
///     .with_address(Route::new("storage/0"));
/// manager.on_upward(command).unwrap();
///
/// manager.close().unwrap();
/// ```
pub struct CommunicationManager {
    queue: Arc<PriorityQueue>,
    pending: PendingCommands,
    protocols: ProtocolRegistry,
    metrics: CommunicationMetrics,
    poll_interval_ms: AtomicU64,
    metrics_interval_ms: AtomicU64,
    config: Mutex<AppliedConfig>,
    state: Mutex<ManagerState>,
    closed: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
    bus: Arc<dyn MessageBus>,
    rpc: Arc<dyn RpcListener>,
    pipeline: Arc<dyn PipelineLink>,
    factory: Arc<dyn ProtocolFactory>,
    clock: Arc<dyn TimeProvider>,
    sink: Arc<dyn MetricSink>,
}

impl CommunicationManager {
    pub fn builder(
        bus: Arc<dyn MessageBus>,
        rpc: Arc<dyn RpcListener>,
        pipeline: Arc<dyn PipelineLink>,
    ) -> CommunicationManagerBuilder {
        CommunicationManagerBuilder {
            config: CommunicationConfig::default(),
            config_generation: 0,
            bus,
            rpc,
            pipeline,
            factory: Arc::new(FramedProtocolFactory::default()),
            clock: Arc::new(SystemTimeProvider),
            sink: Arc::new(LogSink),
        }
    }

    // ---- Lifecycle ----

    /// Start both listeners and the pump thread
    pub fn open(self: &Arc<Self>) -> CommResult<()> {
        let mut state = handle_mutex_poison(self.state.lock(), |message| {
            CommError::Synchronisation { message }
        })?;
        if *state != ManagerState::Unopened {
            return Err(CommError::InvalidState {
                expected: ManagerState::Unopened,
                actual: *state,
            });
        }

        let config = self.applied_config().config;
        self.bus.apply_limits(config.bus_limits());

        let handler = Arc::new(InboundHandler {
            manager: Arc::downgrade(self),
        });
        self.bus
            .listen(config.mbus.port, handler.clone())
            .map_err(|source| CommError::Startup {
                component: "message bus",
                source,
            })?;
        if let Err(source) = self.rpc.listen(config.rpc.port, handler) {
            self.bus.shutdown();
            return Err(CommError::Startup {
                component: "RPC listener",
                source,
            });
        }

        let weak = Arc::downgrade(self);
        let queue = Arc::clone(&self.queue);
        let pump = thread::Builder::new()
            .name(PUMP_THREAD_NAME.to_string())
            .spawn(move || run_pump(weak, queue));
        match pump {
            Ok(handle) => *lock_or_recover(&self.pump, "pump handle") = Some(handle),
            Err(error) => {
                self.rpc.shutdown();
                self.bus.shutdown();
                return Err(CommError::PumpSpawn(error));
            }
        }

        *state = ManagerState::Open;
        log::info!(
            "Communication manager open (message bus port {}, RPC port {}, protocol {})",
            config.mbus.port,
            config.rpc.port,
            self.protocols.current()
        );
        Ok(())
    }

    /// Stop the pump, abort what is still queued and shut both transports
    ///
    /// Closing an already closed manager does nothing. Anything ingested
    /// concurrently is either aborted here or refused by the closed queue.
    pub fn close(&self) -> CommResult<()> {
        let was_open = {
            let mut state = handle_mutex_poison(self.state.lock(), |message| {
                CommError::Synchronisation { message }
            })?;
            match *state {
                ManagerState::Closed => return Ok(()),
                previous => {
                    *state = ManagerState::Closed;
                    previous == ManagerState::Open
                }
            }
        };

        self.closed.store(true, Ordering::Release);
        self.queue.signal();

        let mut pump_result = Ok(());
        if let Some(handle) = lock_or_recover(&self.pump, "pump handle").take() {
            if handle.thread().id() == thread::current().id() {
                log::debug!("Closing from the pump thread; not joining it");
            } else if handle.join().is_err() {
                pump_result = Err(CommError::PumpPanicked);
            }
        }

        self.abort_remaining(self.queue.close());

        if was_open {
            self.rpc.shutdown();
            self.bus.shutdown();
        }

        let dropped = self.pending.clear();
        if dropped > 0 {
            log::info!("Dropped {} pending commands at close", dropped);
        }
        log::info!("Communication manager closed");
        pump_result
    }

    pub fn state(&self) -> ManagerState {
        *lock_or_recover(&self.state, "manager state")
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ---- Ingestion ----

    /// Accept a message from the pipeline bound for the network
    pub fn on_upward(&self, mut message: StorageMessage) -> CommResult<()> {
        if self.is_closed() {
            self.metrics.increment(Counter::DroppedClosed);
            return Err(CommError::Closed);
        }
        message.set_direction(Direction::Outbound);
        if !message.is_reply() && message.protocol().is_none() {
            message.set_protocol(self.protocols.current());
        }
        if self.enqueue(message) {
            Ok(())
        } else {
            Err(CommError::Closed)
        }
    }

    /// Accept a command arriving on the message bus
    pub fn handle_inbound_bus_message(&self, message: BusMessage) {
        if self.is_closed() {
            self.metrics.increment(Counter::DroppedClosed);
            log::debug!("Closed; dropping inbound bus message {}", message.id);
            return;
        }

        let protocol = match self.protocols.for_version(message.version) {
            Some(protocol) => protocol,
            None => {
                let reason = format!("unsupported protocol version {}", message.version);
                self.reject_bus_message(&message, reason);
                return;
            }
        };
        let payload = match protocol.decode(&message.payload) {
            Ok(payload) => payload,
            Err(error) => {
                self.reject_bus_message(&message, error.to_string());
                return;
            }
        };

        let context = TransportContext::for_bus(
            message.family,
            BusReplyHandle::new(message.route, Arc::clone(&protocol)),
        );
        let command = StorageMessage::command(message.id, payload)
            .with_priority(message.priority)
            .with_direction(Direction::Inbound)
            .with_protocol(protocol)
            .with_transport(context);
        self.enqueue(command);
    }

    /// Accept a reply arriving on the message bus
    pub fn handle_inbound_bus_reply(&self, reply: BusReply) {
        if self.is_closed() {
            self.metrics.increment(Counter::DroppedClosed);
            log::debug!("Closed; dropping inbound bus reply {}", reply.id);
            return;
        }

        let Some(pending) = self.pending.remove(reply.id) else {
            self.metrics.increment(Counter::UnknownReplies);
            log::warn!("{}", CommError::UnknownReply { id: reply.id });
            return;
        };

        let (payload, result) = match pending.protocol.decode(&reply.payload) {
            Ok(payload) => (payload, reply.result),
            Err(error) => {
                self.metrics.increment(Counter::ConversionFailures);
                log::warn!("Cannot decode reply {}: {}", reply.id, error);
                (
                    Vec::new(),
                    ReturnCode::Failure(format!("undecodable reply: {}", error)),
                )
            }
        };

        let message = StorageMessage::reply(reply.id, payload)
            .with_priority(pending.priority)
            .with_direction(Direction::Inbound)
            .with_result(result)
            .with_protocol(pending.protocol);
        self.enqueue(message);
    }

    /// Accept a direct RPC request
    pub fn handle_rpc_request(&self, request: Box<dyn RpcRequest>) {
        if self.is_closed() {
            self.metrics.increment(Counter::DroppedClosed);
            let id = request.id();
            request.respond(RpcResponse {
                id,
                result: ReturnCode::Aborted(SHUTDOWN_REASON.to_string()),
                payload: Vec::new(),
            });
            return;
        }

        let command = StorageMessage::command(request.id(), request.payload().to_vec())
            .with_priority(request.priority())
            .with_direction(Direction::Inbound)
            .with_transport(TransportContext::Rpc(request));
        self.enqueue(command);
    }

    /// Queue a message; false when the queue was already closed
    fn enqueue(&self, message: StorageMessage) -> bool {
        log::trace!("Enqueue {}", message);
        match self.queue.try_enqueue(message) {
            Ok(_) => {
                self.metrics.increment(Counter::Enqueued);
                true
            }
            Err(message) => {
                self.refuse_closed(message);
                false
            }
        }
    }

    // Lost the race with close(): answer what can still be answered
    fn refuse_closed(&self, mut message: StorageMessage) {
        self.metrics.increment(Counter::DroppedClosed);
        if message.direction() != Direction::Inbound
            || message.is_reply()
            || !message.has_transport()
        {
            log::debug!("Closed; dropping {}", message);
            return;
        }
        let reply = message
            .make_reply(Vec::new())
            .with_result(ReturnCode::Aborted(SHUTDOWN_REASON.to_string()));
        if let Err(error) = self.send_reply(reply) {
            log::debug!("Could not abort {}: {}", message, error);
        }
    }

    fn reject_bus_message(&self, message: &BusMessage, reason: String) {
        self.metrics.increment(Counter::ConversionFailures);
        log::warn!("Rejecting bus message {}: {}", message.id, reason);
        let rejection = BusReply {
            family: message.family,
            id: message.id,
            route: message.route.clone(),
            version: message.version,
            payload: Vec::new(),
            result: ReturnCode::Rejected(reason),
        };
        if let Err(error) = self.bus.reply(rejection) {
            self.metrics.increment(Counter::SendFailures);
            log::debug!("Could not send rejection for {}: {}", message.id, error);
        }
    }

    // ---- Pump ----

    fn process(&self, message: StorageMessage) {
        match (message.direction(), message.kind()) {
            (Direction::Inbound, _) => {
                self.metrics.increment(Counter::Delivered);
                self.pipeline.deliver(message);
            }
            (Direction::Outbound, MessageKind::Command) => {
                if let Err(error) = self.send_command(message) {
                    log::warn!("{}", error);
                }
            }
            (Direction::Outbound, MessageKind::Reply) => {
                if let Err(error) = self.send_reply(message) {
                    log::warn!("{}", error);
                }
            }
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.load(Ordering::Relaxed))
    }

    fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms.load(Ordering::Relaxed))
    }

    fn maintenance(&self) {
        self.update_metrics();
        let reaped = self.reap_generations();
        if reaped > 0 {
            log::debug!("Reaped {} retired protocol generations", reaped);
        }
    }

    // ---- Outbound dispatch ----

    /// Encode and send a command, recording it as pending
    pub fn send_command(&self, command: StorageMessage) -> CommResult<()> {
        let id = command.id();
        let Some(address) = command.address().cloned() else {
            self.metrics.increment(Counter::RouteFailures);
            return Err(CommError::NoRoute { id });
        };
        let protocol = command
            .protocol()
            .cloned()
            .unwrap_or_else(|| self.protocols.current());

        let frame = protocol.encode(command.payload()).map_err(|source| {
            self.metrics.increment(Counter::SendFailures);
            CommError::Transport { id, source }
        })?;

        if let Err(error) = self.pending.insert(PendingCommand {
            id,
            priority: command.priority(),
            address: address.clone(),
            protocol: Arc::clone(&protocol),
            sent_at: self.clock.now(),
        }) {
            self.metrics.increment(Counter::SendFailures);
            return Err(error);
        }

        let wire = BusMessage {
            family: ProtocolFamily::Storage,
            id,
            priority: command.priority(),
            route: address,
            version: protocol.version(),
            payload: frame,
        };
        if let Err(source) = self.bus.send(wire) {
            self.pending.remove(id);
            match source {
                TransportError::NoRoute { .. } => self.metrics.increment(Counter::RouteFailures),
                _ => self.metrics.increment(Counter::SendFailures),
            }
            return Err(CommError::Transport { id, source });
        }

        self.metrics.increment(Counter::CommandsSent);
        Ok(())
    }

    /// Send a reply back on the transport its command arrived on
    pub fn send_reply(&self, mut reply: StorageMessage) -> CommResult<()> {
        let id = reply.id();
        let Some(context) = reply.take_transport() else {
            self.metrics.increment(Counter::RepliesWithoutContext);
            return Err(CommError::NoTransportContext { id });
        };

        match context {
            TransportContext::DocumentApi(handle) => {
                self.reply_on_bus(ProtocolFamily::DocumentApi, &handle, reply)?
            }
            TransportContext::StorageProtocol(handle) => {
                self.reply_on_bus(ProtocolFamily::Storage, &handle, reply)?
            }
            TransportContext::Rpc(request) => {
                let result = reply.result().clone();
                request.respond(RpcResponse {
                    id,
                    result,
                    payload: reply.into_payload(),
                });
            }
        }

        self.metrics.increment(Counter::RepliesSent);
        Ok(())
    }

    fn reply_on_bus(
        &self,
        family: ProtocolFamily,
        handle: &BusReplyHandle,
        reply: StorageMessage,
    ) -> CommResult<()> {
        let id = reply.id();
        let protocol: &Arc<ProtocolGeneration> = handle.protocol();
        let send = protocol.encode(reply.payload()).and_then(|frame| {
            self.bus.reply(BusReply {
                family,
                id,
                route: handle.reply_route().clone(),
                version: protocol.version(),
                payload: frame,
                result: reply.result().clone(),
            })
        });
        send.map_err(|source| {
            self.metrics.increment(Counter::SendFailures);
            CommError::Transport { id, source }
        })
    }

    fn abort_remaining(&self, leftovers: Vec<StorageMessage>) {
        for mut message in leftovers {
            let answerable = message.direction() == Direction::Inbound
                && !message.is_reply()
                && message.has_transport();
            if !answerable {
                self.metrics.increment(Counter::DiscardedOnClose);
                log::debug!("Discarding {} at close", message);
                continue;
            }

            let reply = message
                .make_reply(Vec::new())
                .with_result(ReturnCode::Aborted(SHUTDOWN_REASON.to_string()));
            match self.send_reply(reply) {
                Ok(()) => self.metrics.increment(Counter::AbortedOnClose),
                Err(error) => log::debug!("Could not abort {}: {}", message, error),
            }
        }
    }

    // ---- Reconfiguration ----

    /// Apply a configuration update
    ///
    /// Never touches the queue lock. Listener ports and the reply priority
    /// cannot change while running; changes to them are logged and ignored.
    pub fn apply_config(&self, update: ConfigUpdate) -> ConfigOutcome {
        let mut applied = lock_or_recover(&self.config, "applied configuration");
        if update.generation <= applied.generation {
            log::debug!(
                "Ignoring configuration generation {} (applied {})",
                update.generation,
                applied.generation
            );
            return ConfigOutcome::Stale;
        }

        let mut next = update.config;
        if let Err(error) = next.validate() {
            self.metrics.increment(Counter::ConfigRejected);
            log::warn!(
                "Rejecting configuration generation {}: {}",
                update.generation,
                error
            );
            return ConfigOutcome::Rejected;
        }
        let previous = &applied.config;

        // Build the new protocol before touching anything else
        let protocol = if next.mbus.protocol_version != previous.mbus.protocol_version {
            match self.factory.create(next.mbus.protocol_version) {
                Ok(protocol) => Some(protocol),
                Err(error) => {
                    self.metrics.increment(Counter::ConfigRejected);
                    log::warn!(
                        "Rejecting configuration generation {}: {}",
                        update.generation,
                        error
                    );
                    return ConfigOutcome::Rejected;
                }
            }
        } else {
            None
        };

        if next.mbus.port != previous.mbus.port || next.rpc.port != previous.rpc.port {
            log::warn!(
                "Listener port changes require a restart; keeping ports {} and {}",
                previous.mbus.port,
                previous.rpc.port
            );
            next.mbus.port = previous.mbus.port;
            next.rpc.port = previous.rpc.port;
        }
        if next.queue.reply_priority != previous.queue.reply_priority {
            log::warn!(
                "Reply priority changes require a restart; keeping {}",
                previous.queue.reply_priority
            );
            next.queue.reply_priority = previous.queue.reply_priority;
        }

        if next.bus_limits() != previous.bus_limits() {
            self.bus.apply_limits(next.bus_limits());
        }
        if let Some(protocol) = protocol {
            self.protocols.install(protocol);
        }
        self.protocols.set_grace_period(next.grace_period());
        self.poll_interval_ms
            .store(next.queue.poll_interval_ms, Ordering::Relaxed);
        self.metrics_interval_ms
            .store(millis(next.metrics_interval()), Ordering::Relaxed);

        applied.generation = update.generation;
        applied.config = next;
        log::info!("Applied configuration generation {}", update.generation);
        ConfigOutcome::Applied
    }

    /// The active configuration and its generation
    pub fn applied_config(&self) -> ConfigUpdate {
        let applied = lock_or_recover(&self.config, "applied configuration");
        ConfigUpdate::new(applied.generation, applied.config.clone())
    }

    /// Drop retired protocol generations nothing references any more
    pub fn reap_generations(&self) -> usize {
        self.protocols.reap()
    }

    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    // ---- Metrics ----

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_depth: self.queue.size() as u64,
            pending_commands: self.pending.len() as u64,
            retired_generations: self.protocols.retired_count() as u64,
            counters: self.metrics.counters(),
        }
    }

    pub fn counter(&self, counter: Counter) -> u64 {
        self.metrics.get(counter)
    }

    pub fn queue_size(&self) -> usize {
        self.queue.size()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn close_queue(&self) {
        self.queue.close();
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// Holds the manager only while working, so dropping the last outside handle
// closes it from the dropping thread
fn run_pump(weak: Weak<CommunicationManager>, queue: Arc<PriorityQueue>) {
    let (mut poll_interval, mut last_maintenance) = match weak.upgrade() {
        Some(manager) => (manager.poll_interval(), manager.clock.now()),
        None => return,
    };
    log::debug!("Pump thread started");

    loop {
        let next = queue.get_next(Some(poll_interval));
        let Some(manager) = weak.upgrade() else {
            if let Some(message) = next {
                log::debug!("Manager dropped; discarding {}", message);
            }
            break;
        };
        if let Some(message) = next {
            manager.process(message);
        }
        if manager.is_closed() || queue.is_closed() {
            break;
        }

        let now = manager.clock.now();
        if now.saturating_duration_since(last_maintenance) >= manager.metrics_interval() {
            manager.maintenance();
            last_maintenance = now;
        }
        poll_interval = manager.poll_interval();
    }

    log::debug!("Pump thread exiting");
}

/// Transport-facing handler that does not keep the manager alive
struct InboundHandler {
    manager: Weak<CommunicationManager>,
}

impl BusHandler for InboundHandler {
    fn handle_message(&self, message: BusMessage) {
        if let Some(manager) = self.manager.upgrade() {
            manager.handle_inbound_bus_message(message);
        }
    }

    fn handle_reply(&self, reply: BusReply) {
        if let Some(manager) = self.manager.upgrade() {
            manager.handle_inbound_bus_reply(reply);
        }
    }
}

impl RpcHandler for InboundHandler {
    fn handle_request(&self, request: Box<dyn RpcRequest>) {
        match self.manager.upgrade() {
            Some(manager) => manager.handle_rpc_request(request),
            None => {
                let id = request.id();
                request.respond(RpcResponse {
                    id,
                    result: ReturnCode::Aborted(SHUTDOWN_REASON.to_string()),
                    payload: Vec::new(),
                });
            }
        }
    }
}

impl UpwardLink for CommunicationManager {
    fn on_upward(&self, message: StorageMessage) -> CommResult<()> {
        CommunicationManager::on_upward(self, message)
    }
}

impl BusHandler for CommunicationManager {
    fn handle_message(&self, message: BusMessage) {
        self.handle_inbound_bus_message(message);
    }

    fn handle_reply(&self, reply: BusReply) {
        self.handle_inbound_bus_reply(reply);
    }
}

impl RpcHandler for CommunicationManager {
    fn handle_request(&self, request: Box<dyn RpcRequest>) {
        self.handle_rpc_request(request);
    }
}

impl ConfigSubscriber for CommunicationManager {
    fn configure(&self, update: ConfigUpdate) {
        self.apply_config(update);
    }
}

impl MetricUpdateHook for CommunicationManager {
    fn update_metrics(&self) {
        self.metrics_snapshot().emit(self.sink.as_ref());
    }
}

impl fmt::Display for CommunicationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CommunicationManager[state={}, queued={}, pending={}, generation={}, retired={}]",
            self.state(),
            self.queue.size(),
            self.pending.len(),
            self.protocols.current().generation(),
            self.protocols.retired_count()
        )
    }
}

impl Drop for CommunicationManager {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("Closing dropped communication manager: {}", error);
        }
    }
}
