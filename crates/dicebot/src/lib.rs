//! # Dicebot
//!
//! Chat-platform plumbing for a tabletop RPG dice bot: adapters translate a
//! platform's wire protocol into the shared domain model, and the dispatch
//! core receives everything through one callback.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  frames   ┌──────────────────┐  AdapterCallback  ┌───────────────┐
//! │ Gateway  │◀─────────▶│ OneBotAdapter    │──────────────────▶│ Dispatch core │
//! │ (OneBot) │ WebSocket │ (PlatformAdapter)│◀──────────────────│               │
//! └──────────┘           └──────────────────┘  msg_send_to_*    └───────────────┘
//!                                 ▲
//!                                 │ serve / close
//!                         ┌───────┴────────┐
//!                         │ AdapterRuntime │
//!                         └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dicebot::prelude::*;
//! use dicebot::onebot::{OneBotAdapter, OneBotConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = AdapterRuntime::new();
//!     let adapter = OneBotAdapter::new(runtime.adapter_config::<OneBotConfig>("onebot")?);
//!     adapter.set_callback(Arc::new(MyCore::default()));
//!
//!     runtime.register_adapter(adapter).await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `onebot` *(default)*: the OneBot v11 adapter
//! - `toml-config` *(default)* / `yaml-config`: configuration file formats
//! - `json-log`: JSON log lines

pub use dicebot_core as core;
pub use dicebot_runtime as runtime;
pub use dicebot_transport as transport;

#[cfg(feature = "onebot")]
pub use dicebot_adapter_onebot as onebot;

/// Commonly used types.
///
/// ```rust,ignore
/// use dicebot::prelude::*;
/// ```
pub mod prelude {
    pub use dicebot_core::prelude::*;
    pub use dicebot_runtime::prelude::*;
    pub use dicebot_runtime::{AdapterRuntime, AppConfig, ConfigLoader, RuntimeError};

    #[cfg(feature = "onebot")]
    pub use dicebot_adapter_onebot::{OneBotAdapter, OneBotConfig};
}
