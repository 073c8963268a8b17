//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or an adapter section is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An adapter failed to start or stop.
    #[error("Adapter '{name}' failed: {source}")]
    Adapter {
        name: String,
        #[source]
        source: dicebot_core::AdapterError,
    },

    /// An adapter with the same name is already registered.
    #[error("Adapter already registered: {0}")]
    AdapterExists(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
