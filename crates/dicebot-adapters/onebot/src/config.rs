//! Configuration types for the OneBot v11 adapter.
//!
//! Loaded by the runtime from the `adapters.onebot` section.
//!
//! # Example Configuration
//!
//! ```yaml
//! adapters:
//!   onebot:
//!     # Reverse mode: dial out to the gateway
//!     ws_reverse: ws://127.0.0.1:8100/onebot/v11/ws
//!     # Forward mode: accept connections from the gateway
//!     ws_forward: 0.0.0.0:8101
//!     access_token: ${BOT_TOKEN:-}
//!     secret: ""
//!     api_timeout_ms: 15000
//!     reconnect_initial_delay_ms: 1000
//!     reconnect_max_delay_ms: 30000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// OneBot adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OneBotConfig {
    /// Gateway URL to dial (reverse mode). Empty disables dialing.
    pub ws_reverse: String,

    /// Address to listen on (forward mode). Empty disables listening.
    pub ws_forward: String,

    /// Bearer token sent when dialing and required from inbound peers.
    pub access_token: String,

    /// Value of the `X-Self-Secret` header sent when dialing.
    pub secret: String,

    /// How long an API call waits for its response.
    pub api_timeout_ms: u64,

    /// First reconnect delay.
    pub reconnect_initial_delay_ms: u64,

    /// Upper bound of the reconnect delay.
    pub reconnect_max_delay_ms: u64,
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            ws_reverse: String::new(),
            ws_forward: String::new(),
            access_token: String::new(),
            secret: String::new(),
            api_timeout_ms: 15_000,
            reconnect_initial_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

impl OneBotConfig {
    /// Returns the reverse URL if dialing is enabled.
    pub fn reverse_url(&self) -> Option<&str> {
        non_empty(&self.ws_reverse)
    }

    /// Returns the listen address if forward mode is enabled.
    pub fn forward_addr(&self) -> Option<&str> {
        non_empty(&self.ws_forward)
    }

    pub fn access_token(&self) -> Option<&str> {
        non_empty(&self.access_token)
    }

    pub fn secret(&self) -> Option<&str> {
        non_empty(&self.secret)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    /// At least [`MIN_RECONNECT_DELAY_MS`], so the delay can double.
    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms.max(MIN_RECONNECT_DELAY_MS))
    }

    /// Never below the initial delay.
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms).max(self.reconnect_initial_delay())
    }
}

/// Floor for the first reconnect delay.
pub const MIN_RECONNECT_DELAY_MS: u64 = 10;

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
