//! # Dicebot Transport
//!
//! WebSocket plumbing for dicebot adapters.
//!
//! ## Features
//!
//! - `ws-client` (default): outbound dialing via `tokio-tungstenite`
//! - `ws-server` (default): inbound upgrades via `axum`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Adapter Layer      │  (OneBot11)
//! ├─────────────────────┤
//! │  dicebot-transport  │  <- This crate
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```
//!
//! Adapters never see library-specific socket types: both directions yield a
//! [`WsConnection`] made of a [`FrameSink`] and a [`FrameStream`].
//!
//! ```rust,ignore
//! use dicebot_transport::ws_dial;
//!
//! let conn = ws_dial("ws://127.0.0.1:8100/ws", &[("Authorization", "Bearer t".into())]).await?;
//! let (info, sink, stream) = conn.into_parts();
//! ```

pub mod connection;

#[cfg(feature = "ws-client")]
pub mod ws_client;

#[cfg(feature = "ws-server")]
pub mod ws_server;

pub use connection::{ConnectionInfo, FrameSink, FrameStream, ListenerHandle, WsConnection};

#[cfg(feature = "ws-client")]
pub use ws_client::ws_dial;

#[cfg(feature = "ws-server")]
pub use ws_server::{UpgradeHandler, UpgradeRejection, ws_listen};
