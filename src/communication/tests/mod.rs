//! Test modules for the communication manager
//!
//! Every test drives a real manager (with its pump thread) over the loopback
//! transports and a channel pipeline.

mod pump;
mod reconfiguration;

use crate::communication::api::{
    ChannelPipeline, CommunicationConfig, CommunicationManager, RecordingSink,
};
use crate::core::time::MockTimeProvider;
use crate::queue::StorageMessage;
use crate::transport::api::{FramedProtocolFactory, LoopbackBus, LoopbackRpc};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

pub(super) struct Harness {
    pub bus: Arc<LoopbackBus>,
    pub rpc: Arc<LoopbackRpc>,
    pub manager: Arc<CommunicationManager>,
    pub inbound: mpsc::Receiver<StorageMessage>,
    pub sink: Arc<RecordingSink>,
    pub clock: MockTimeProvider,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: CommunicationConfig) -> Self {
        let bus = Arc::new(LoopbackBus::new());
        let rpc = Arc::new(LoopbackRpc::new());
        let (pipeline, inbound) = ChannelPipeline::new();
        let sink = Arc::new(RecordingSink::new());
        let clock = MockTimeProvider::new();

        let manager = CommunicationManager::builder(bus.clone(), rpc.clone(), Arc::new(pipeline))
            .config(config)
            .protocol_factory(Arc::new(FramedProtocolFactory::new(4)))
            .clock(Arc::new(clock.clone()))
            .metric_sink(sink.clone())
            .build()
            .unwrap();

        Self {
            bus,
            rpc,
            manager,
            inbound,
            sink,
            clock,
        }
    }

    /// Next message the pump delivered to the pipeline
    pub fn recv(&self) -> StorageMessage {
        self.inbound
            .recv_timeout(WAIT)
            .expect("pipeline should receive a message")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.manager.close();
    }
}

/// Default configuration with a short poll interval
pub(super) fn fast_config() -> CommunicationConfig {
    let mut config = CommunicationConfig::default();
    config.queue.poll_interval_ms = 5;
    config
}

/// Poll `condition` until it holds or the wait limit passes
pub(super) fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
