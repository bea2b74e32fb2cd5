//! Capability traits of the communication manager and its pipeline side

use crate::communication::config::ConfigUpdate;
use crate::communication::error::CommResult;
use crate::queue::StorageMessage;
use std::sync::mpsc;

/// The node's processing pipeline, as seen from the manager
///
/// Called only from the pump thread.
pub trait PipelineLink: Send + Sync {
    fn deliver(&self, message: StorageMessage);
}

/// Entry point for messages the pipeline sends towards the network
pub trait UpwardLink: Send + Sync {
    fn on_upward(&self, message: StorageMessage) -> CommResult<()>;
}

/// Receiver of live configuration updates
pub trait ConfigSubscriber: Send + Sync {
    fn configure(&self, update: ConfigUpdate);
}

/// Periodic metrics push
pub trait MetricUpdateHook: Send + Sync {
    fn update_metrics(&self);
}

/// Pipeline that forwards every delivered message into a channel
pub struct ChannelPipeline {
    sender: mpsc::Sender<StorageMessage>,
}

impl ChannelPipeline {
    pub fn new() -> (Self, mpsc::Receiver<StorageMessage>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl PipelineLink for ChannelPipeline {
    fn deliver(&self, message: StorageMessage) {
        if let Err(mpsc::SendError(message)) = self.sender.send(message) {
            log::warn!("Pipeline receiver is gone, dropping {}", message);
        }
    }
}
