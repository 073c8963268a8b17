//! # Dicebot Runtime
//!
//! The ambient layer around the adapters:
//!
//! - **Configuration**: layered loading of `dicebot.toml` / `dicebot.yaml` and
//!   `DICEBOT_*` variables ([`config`])
//! - **Logging**: `tracing-subscriber` setup driven by that configuration
//!   ([`logging`])
//! - **Lifecycle**: [`AdapterRuntime`] serves the registered adapters and
//!   closes them on Ctrl+C / SIGTERM
//!
//! ```rust,ignore
//! use dicebot_runtime::AdapterRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = AdapterRuntime::new();
//!     runtime.register_adapter(my_adapter).await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{AppConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{AdapterRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
