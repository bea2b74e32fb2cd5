//! Public API for the communication manager
//!
//! External modules should import from here rather than directly from
//! internal modules.

// Manager
pub use crate::communication::manager::{
    CommunicationManager, CommunicationManagerBuilder, ConfigOutcome, ManagerState,
    SHUTDOWN_REASON,
};

// Capability traits and the channel-backed pipeline
pub use crate::communication::traits::{
    ChannelPipeline, ConfigSubscriber, MetricUpdateHook, PipelineLink, UpwardLink,
};

// Configuration
pub use crate::communication::config::{
    CommunicationConfig, ConfigUpdate, GenerationConfig, LoggingConfig, MbusConfig, MetricsConfig,
    QueueConfig, RpcConfig,
};
pub use crate::communication::fetcher::ConfigFetcher;

// Pending commands
pub use crate::communication::pending::{PendingCommand, PendingCommands};

// Metrics
pub use crate::communication::metrics::{
    CommunicationMetrics, Counter, LogSink, MetricEvent, MetricSink, MetricValue,
    MetricsSnapshot, RecordingSink,
};

// Errors
pub use crate::communication::error::{CommError, CommResult, ConfigError};
