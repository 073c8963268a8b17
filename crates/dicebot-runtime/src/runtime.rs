//! Adapter lifecycle orchestration.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dicebot_runtime::AdapterRuntime;
//!
//! // Loads dicebot.toml from the current directory, if any
//! let runtime = AdapterRuntime::new();
//!
//! let config: OneBotConfig = runtime.adapter_config("onebot")?;
//! runtime.register_adapter(OneBotAdapter::new(config)).await?;
//!
//! // Serve until Ctrl+C or SIGTERM
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::signal;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dicebot_core::{Adapter, BoxedAdapter};

use crate::config::{AppConfig, ConfigLoader, ConfigResult, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Starts registered adapters and shuts them down on request.
///
/// Every adapter is served with a child of one shared [`CancellationToken`];
/// stopping cancels it and then closes each adapter in registration order.
pub struct AdapterRuntime {
    config: AppConfig,
    adapters: RwLock<Vec<BoxedAdapter>>,
    shutdown: Mutex<CancellationToken>,
    running: RwLock<bool>,
}

impl AdapterRuntime {
    /// Creates a runtime from `dicebot.toml` / `dicebot.yaml` in the current
    /// directory and `DICEBOT_*` variables.
    ///
    /// Falls back to defaults when loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                AppConfig::default()
            });

        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration and initializes logging from it.
    pub fn from_config(config: &AppConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            adapters: RwLock::new(Vec::new()),
            shutdown: Mutex::new(CancellationToken::new()),
            running: RwLock::new(false),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Reads the `adapters.<name>` section, or the type's default when the
    /// section is absent.
    pub fn adapter_config<T>(&self, name: &str) -> RuntimeResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.config.adapter_config(name)? {
            Some(config) => Ok(config),
            None => {
                warn!(adapter = name, "No configuration found for adapter, using default");
                Ok(T::default())
            }
        }
    }

    /// Registers an adapter. Names must be unique.
    pub async fn register_adapter<A>(&self, adapter: A) -> RuntimeResult<()>
    where
        A: Adapter + 'static,
    {
        self.register_boxed(Arc::new(adapter)).await
    }

    pub async fn register_boxed(&self, adapter: BoxedAdapter) -> RuntimeResult<()> {
        let name = adapter.name();
        let mut adapters = self.adapters.write().await;
        if adapters.iter().any(|a| a.name() == name) {
            return Err(RuntimeError::AdapterExists(name.to_string()));
        }
        adapters.push(adapter);
        info!(adapter = name, "Registered adapter");
        Ok(())
    }

    pub async fn adapter_count(&self) -> usize {
        self.adapters.read().await.len()
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Serves every registered adapter.
    ///
    /// All adapters are tried; the first failure is returned afterwards and
    /// the runtime stays running so [`stop`](Self::stop) can clean up.
    pub async fn start(&self) -> RuntimeResult<()> {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Runtime is already running");
                return Ok(());
            }
            *running = true;
        }

        info!("Starting dicebot runtime");

        let token = CancellationToken::new();
        *self.shutdown.lock().await = token.clone();

        let adapters = self.adapters.read().await;
        let mut first_failure = None;
        for adapter in adapters.iter() {
            let name = adapter.name();
            match adapter.serve(&token.child_token()).await {
                Ok(()) => info!(adapter = name, "Adapter started"),
                Err(e) => {
                    error!(adapter = name, error = %e, "Failed to start adapter");
                    first_failure.get_or_insert(RuntimeError::Adapter {
                        name: name.to_string(),
                        source: e,
                    });
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => {
                info!(adapters = adapters.len(), "Runtime started");
                Ok(())
            }
        }
    }

    /// Cancels background work and closes every adapter.
    pub async fn stop(&self) -> RuntimeResult<()> {
        {
            let mut running = self.running.write().await;
            if !*running {
                warn!("Runtime is not running");
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping dicebot runtime");
        self.shutdown.lock().await.cancel();

        let adapters = self.adapters.read().await;
        for adapter in adapters.iter() {
            if let Err(e) = adapter.close().await {
                error!(adapter = adapter.name(), error = %e, "Error during adapter shutdown");
            }
        }

        info!("Runtime stopped");
        Ok(())
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(async {
            info!("dicebot runtime is now running. Press Ctrl+C to stop.");
            wait_for_shutdown().await;
        })
        .await
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = self.start().await {
            self.stop().await?;
            return Err(e);
        }

        shutdown.await;

        self.stop().await
    }
}

impl Default for AdapterRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for Ctrl+C, or SIGTERM on Unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

/// Builder for an [`AdapterRuntime`] with custom configuration sources.
///
/// ```rust,ignore
/// let runtime = AdapterRuntime::builder()
///     .config_file("config/dicebot.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: AppConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates the configuration, then builds the runtime.
    pub fn build(self) -> ConfigResult<AdapterRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(AdapterRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
