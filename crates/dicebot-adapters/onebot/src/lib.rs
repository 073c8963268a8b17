//! # Dicebot Adapter for OneBot v11
//!
//! Connects the dicebot dispatch core to a OneBot v11 gateway over
//! WebSocket, in reverse mode (the adapter dials), forward mode (the gateway
//! dials) or both.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dicebot_adapter_onebot::{OneBotAdapter, OneBotConfig};
//! use dicebot_core::{Adapter, PlatformAdapter};
//!
//! let adapter = OneBotAdapter::new(OneBotConfig {
//!     ws_reverse: "ws://127.0.0.1:8100/onebot/v11/ws".into(),
//!     ..Default::default()
//! });
//! adapter.set_callback(callback);
//! adapter.serve(&shutdown).await?;
//! ```
//!
//! ## Roles
//!
//! A connection serves the `api` channel, the `event` channel, or both
//! (`unified`). Reverse connections are always unified. Forward connections
//! pick their role from the `X-Client-Role` header, else from the request
//! path, and default to `event`. At most one connection holds each channel;
//! a newer one replaces and closes the older.
//!
//! ## Wire Types
//!
//! The [`model`] module holds the frames exchanged with the gateway. Ids on
//! the wire may be numbers or strings; everything reported to the callback
//! uses the `QQ:<n>` / `QQ-Group:<n>` forms.

mod adapter;
pub mod config;
mod correlator;
mod dispatcher;
mod forward;
pub mod model;
mod outbound;
mod registry;
mod reverse;
mod session;

#[cfg(test)]
mod testing;

pub use adapter::{OneBotAdapter, OneBotAdapterBuilder};
pub use config::OneBotConfig;
pub use dispatcher::{envelope_to_message, frame_to_event};
pub use outbound::{IdKind, normalize_id};
pub use session::SessionRole;
