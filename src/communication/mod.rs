//! Communication Manager
//!
//! The node's network boundary. Inbound commands and replies from the message
//! bus and the RPC listener, and outbound traffic from the pipeline, all pass
//! through one [`PriorityQueue`](crate::queue::PriorityQueue) drained by a
//! single pump thread.
//!
//! # Components
//!
//! - `manager`: lifecycle, ingestion, pump loop, dispatch, reconfiguration
//! - `pending`: outbound commands awaiting their reply
//! - `config` / `fetcher`: TOML configuration and the file watcher that
//!   turns edits into configuration generations
//! - `metrics`: counters, gauges and metric sinks

// Internal modules - all access should go through api module
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod fetcher;
pub(crate) mod manager;
pub(crate) mod metrics;
pub(crate) mod pending;
pub(crate) mod traits;

// Public API module - the only public interface for the communication manager
pub mod api;

#[cfg(test)]
mod tests;
