//! Reverse mode: dial the gateway, and redial whenever the connection ends.
//!
//! ```text
//! Dialing ──ok──▶ Connected ──▶ Reading ──error──┐
//!    ▲  │                                        │
//!    │  └──error──────────────┐                  │
//!    │                        ▼                  ▼
//!    └──────────────────── BackoffWait ◀─────────┘
//! ```
//!
//! The wait doubles after every cycle up to the configured maximum, whether
//! the cycle ended in a failed dial or a lost connection; a successful
//! connect does not reset it. Cancellation ends the loop from any state.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dicebot_transport::ws_dial;

use crate::adapter::{AdapterInner, consume_session};
use crate::config::OneBotConfig;
use crate::session::{Session, SessionRole};

/// Headers attached to every dial.
pub(crate) fn dial_headers(config: &OneBotConfig) -> Vec<(&'static str, String)> {
    let mut headers = Vec::with_capacity(2);
    if let Some(token) = config.access_token() {
        headers.push(("Authorization", format!("Bearer {token}")));
    }
    if let Some(secret) = config.secret() {
        headers.push(("X-Self-Secret", secret.to_string()));
    }
    headers
}

/// Doubling reconnect delay, capped at a maximum.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// The delay the next wait will use.
    pub(crate) fn current(&self) -> Duration {
        self.current
    }

    /// Returns the delay to wait now and doubles the following one.
    pub(crate) fn advance(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

pub(crate) async fn run_dialer(inner: Arc<AdapterInner>, url: String, shutdown: CancellationToken) {
    let headers = dial_headers(&inner.config);
    let mut backoff = Backoff::new(
        inner.config.reconnect_initial_delay(),
        inner.config.reconnect_max_delay(),
    );

    loop {
        let dialed = tokio::select! {
            () = shutdown.cancelled() => break,
            dialed = ws_dial(&url, &headers) => dialed,
        };

        match dialed {
            Ok(conn) => {
                let (_, sink, stream) = conn.into_parts();
                let session = Session::new(SessionRole::Unified, sink);
                info!(url = %url, session = %session.id(), "Connected to OneBot gateway");

                let cause = consume_session(&inner, session, stream, &shutdown).await;
                if shutdown.is_cancelled() {
                    break;
                }
                warn!(url = %url, error = %cause, retry_in = ?backoff.current(), "OneBot gateway connection lost");
            }
            Err(e) => {
                warn!(url = %url, error = %e, retry_in = ?backoff.current(), "Failed to connect to OneBot gateway");
            }
        }

        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(backoff.advance()) => {}
        }
    }

    debug!(url = %url, "OneBot reverse dialer stopped");
}
