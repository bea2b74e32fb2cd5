//! Process startup and shutdown
//!
//! Loads the configuration, starts logging, assembles a communication manager
//! over the in-memory transports, and runs until a shutdown signal arrives.

use crate::app::cli::Args;
use crate::communication::api::{
    ChannelPipeline, CommunicationConfig, CommunicationManager, ConfigError, ConfigFetcher,
    ConfigSubscriber, ConfigUpdate,
};
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::{init_logging, reconfigure_logging};
use crate::core::shutdown::ShutdownCoordinator;
use crate::core::sync::lock_or_recover;
use crate::core::version;
use crate::queue::{ReturnCode, StorageMessage};
use crate::transport::api::{LoopbackBus, LoopbackRpc};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration as read at startup
#[derive(Debug)]
pub struct LoadedConfig {
    /// File the configuration came from, if any
    pub path: Option<PathBuf>,
    /// Raw file contents; empty when running on defaults
    pub contents: String,
    pub config: CommunicationConfig,
}

/// Locate and load the configuration
///
/// An explicitly given file must exist. Without one the default location is
/// used when present, and built-in defaults otherwise.
pub async fn load_configuration(config_file: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let path = match config_file {
        Some(path) => Some(path.to_path_buf()),
        None => CommunicationConfig::default_path().filter(|path| path.exists()),
    };

    let Some(path) = path else {
        return Ok(LoadedConfig {
            path: None,
            contents: String::new(),
            config: CommunicationConfig::default(),
        });
    };

    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
    let config = CommunicationConfig::from_toml_str(&contents)?;
    Ok(LoadedConfig {
        path: Some(path),
        contents,
        config,
    })
}

/// Forwards configuration updates to the manager and applies log level
/// changes to the running logger
pub struct LiveConfigSubscriber {
    manager: Arc<CommunicationManager>,
    log_level: Mutex<Option<String>>,
    // A level given on the command line wins over the file
    level_pinned: bool,
}

impl LiveConfigSubscriber {
    pub fn new(
        manager: Arc<CommunicationManager>,
        initial_level: Option<String>,
        level_pinned: bool,
    ) -> Self {
        Self {
            manager,
            log_level: Mutex::new(initial_level),
            level_pinned,
        }
    }
}

impl ConfigSubscriber for LiveConfigSubscriber {
    fn configure(&self, update: ConfigUpdate) {
        if !self.level_pinned {
            let mut current = lock_or_recover(&self.log_level, "log level");
            if update.config.logging.level != *current {
                let level = update.config.logging.level.as_deref().unwrap_or("info");
                match reconfigure_logging(level) {
                    Ok(()) => {
                        log::info!("Log level changed to {}", level);
                        *current = update.config.logging.level.clone();
                    }
                    Err(e) => log::warn!("Cannot change log level to {}: {}", level, e),
                }
            }
        }
        self.manager.configure(update);
    }
}

/// Answer every inbound command with an `Ok` reply
///
/// Stands in for the storage pipeline; runs until shutdown is requested or
/// the manager goes away.
pub fn spawn_pipeline_worker(
    inbound: mpsc::Receiver<StorageMessage>,
    manager: Arc<CommunicationManager>,
    shutdown: ShutdownCoordinator,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("pipeline".to_string())
        .spawn(move || loop {
            match inbound.recv_timeout(WORKER_POLL_INTERVAL) {
                Ok(message) => answer(&manager, message),
                Err(RecvTimeoutError::Timeout) => {
                    if shutdown.is_shutdown_requested() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        })
}

fn answer(manager: &CommunicationManager, mut message: StorageMessage) {
    if message.is_reply() {
        log::debug!("Pipeline received {} with {}", message, message.result());
        return;
    }
    let reply = message
        .make_reply(Vec::new())
        .with_result(ReturnCode::Ok);
    if let Err(e) = manager.on_upward(reply) {
        log::debug!("Cannot answer {}: {}", message, e);
    }
}

/// Run the process; returns the exit code
pub async fn startup() -> i32 {
    let args = Args::parse();

    let loaded = match load_configuration(args.config_file.as_deref()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let use_color = !args.no_color && std::io::stderr().is_terminal();
    colored::control::set_override(use_color);
    let log_level = args
        .log_level
        .clone()
        .or_else(|| loaded.config.logging.level.clone());
    if let Err(e) = init_logging(
        log_level.as_deref(),
        args.log_format.as_deref(),
        args.log_file_str(),
        use_color,
    ) {
        eprintln!("Error: cannot initialise logging: {}", e);
        return 1;
    }

    log::info!(
        "storcomm {} starting (built {}, {})",
        env!("CARGO_PKG_VERSION"),
        version::build_time(),
        version::git_hash()
    );
    match &loaded.path {
        Some(path) => log::info!("Configuration loaded from {}", path.display()),
        None => log::info!("No configuration file; using defaults"),
    }

    if args.check_config {
        log::info!("Configuration is valid");
        return 0;
    }

    run(args, loaded).await
}

async fn run(args: Args, loaded: LoadedConfig) -> i32 {
    let initial_generation = u64::from(loaded.path.is_some());

    let bus = Arc::new(LoopbackBus::new());
    bus.set_echo(true);
    let rpc = Arc::new(LoopbackRpc::new());
    let (pipeline, inbound) = ChannelPipeline::new();

    let manager = match CommunicationManager::builder(bus, rpc, Arc::new(pipeline))
        .config(loaded.config.clone())
        .config_generation(initial_generation)
        .build()
    {
        Ok(manager) => manager,
        Err(e) => {
            log_error_with_context(&e, "Building communication manager");
            return 1;
        }
    };

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers();

    let worker = match spawn_pipeline_worker(inbound, Arc::clone(&manager), shutdown.clone()) {
        Ok(worker) => worker,
        Err(e) => {
            log::error!("FATAL: cannot start pipeline worker: {}", e);
            return 1;
        }
    };

    if let Err(e) = manager.open() {
        log_error_with_context(&e, "Opening communication manager");
        shutdown.trigger_shutdown();
        let _ = manager.close();
        let _ = worker.join();
        return 1;
    }
    log::info!("{}", manager);

    let fetcher = loaded.path.map(|path| {
        let subscriber = Arc::new(LiveConfigSubscriber::new(
            Arc::clone(&manager),
            loaded.config.logging.level.clone(),
            args.log_level.is_some(),
        ));
        ConfigFetcher::new(path, subscriber, CONFIG_POLL_INTERVAL)
            .with_baseline(initial_generation, loaded.contents)
            .spawn(shutdown.subscribe())
    });

    shutdown.wait().await;
    log::info!("Shutting down");

    if let Err(e) = manager.close() {
        log_error_with_context(&e, "Closing communication manager");
    }
    if let Some(fetcher) = fetcher {
        let _ = fetcher.await;
    }
    if worker.join().is_err() {
        log::warn!("Pipeline worker panicked");
    }
    log::info!("{}", manager);
    0
}
