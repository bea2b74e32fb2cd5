//! Configuration file watcher
//!
//! Polls the configuration file and hands every changed, valid version to a
//! [`ConfigSubscriber`] as a new generation. Contents that fail to parse or
//! validate are logged and skipped; the subscriber keeps what it had.

use crate::communication::config::{CommunicationConfig, ConfigUpdate};
use crate::communication::traits::ConfigSubscriber;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct ConfigFetcher {
    path: PathBuf,
    subscriber: Arc<dyn ConfigSubscriber>,
    interval: Duration,
    generation: u64,
    last_contents: Option<String>,
}

impl ConfigFetcher {
    pub fn new(path: PathBuf, subscriber: Arc<dyn ConfigSubscriber>, interval: Duration) -> Self {
        Self {
            path,
            subscriber,
            interval,
            generation: 0,
            last_contents: None,
        }
    }

    /// Treat `contents` as already delivered under `generation`
    pub fn with_baseline(mut self, generation: u64, contents: String) -> Self {
        self.generation = generation;
        self.last_contents = Some(contents);
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Read the file once; returns the generation published, if any
    pub async fn poll_once(&mut self) -> Option<u64> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(error) => {
                log::debug!("Cannot read {}: {}", self.path.display(), error);
                return None;
            }
        };
        if self.last_contents.as_deref() == Some(contents.as_str()) {
            return None;
        }

        let parsed = CommunicationConfig::from_toml_str(&contents);
        self.last_contents = Some(contents);
        match parsed {
            Ok(config) => {
                self.generation += 1;
                log::info!(
                    "Configuration {} changed, publishing generation {}",
                    self.path.display(),
                    self.generation
                );
                self.subscriber
                    .configure(ConfigUpdate::new(self.generation, config));
                Some(self.generation)
            }
            Err(error) => {
                log::warn!(
                    "Ignoring changed configuration {}: {}",
                    self.path.display(),
                    error
                );
                None
            }
        }
    }

    /// Poll until a shutdown broadcast arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
        log::debug!("Configuration fetcher stopped");
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
