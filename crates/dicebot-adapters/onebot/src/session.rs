//! A single live connection and the role it serves.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::SinkExt;
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::trace;
use uuid::Uuid;

use dicebot_core::{TransportError, TransportResult};
use dicebot_transport::{ConnectionInfo, FrameSink};

const SINK_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Which logical channel(s) a session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Role could not be determined; treated as an event stream.
    Unknown,
    /// Event stream only.
    Event,
    /// API calls only.
    Api,
    /// Both API calls and events over one connection.
    Unified,
}

impl SessionRole {
    /// Whether this role occupies the `api` slot.
    pub fn serves_api(self) -> bool {
        matches!(self, Self::Api | Self::Unified)
    }

    /// Whether this role occupies the `event` slot.
    pub fn serves_events(self) -> bool {
        matches!(self, Self::Event | Self::Unified | Self::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Event => "event",
            Self::Api => "api",
            Self::Unified => "unified",
        }
    }

    /// Infers the role of an inbound connection.
    ///
    /// `X-Client-Role` (`event` / `api`, any case) wins; otherwise the request
    /// path is searched for `api`, then `event`. Defaults to [`Event`](Self::Event).
    pub fn determine(info: &ConnectionInfo) -> Self {
        if let Some(role) = info.header("x-client-role") {
            match role.trim().to_ascii_lowercase().as_str() {
                "event" => return Self::Event,
                "api" => return Self::Api,
                _ => {}
            }
        }

        let path = info.path.to_ascii_lowercase();
        if path.contains("api") {
            Self::Api
        } else {
            Self::Event
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical connection plus its role.
///
/// Writes are serialized through an async mutex. [`close`](Self::close) is
/// synchronous and idempotent: it flips a flag and cancels a token that the
/// session's read loop observes; the read loop then tears the socket down.
pub struct Session {
    id: Uuid,
    role: SessionRole,
    sink: Mutex<FrameSink>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(role: SessionRole, sink: FrameSink) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            role,
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Random id, used in log fields only.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Writes one text frame. Fails once the session is closed, including
    /// while waiting for the write lock or for a stalled socket.
    pub async fn send_text(&self, text: String) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::closed("session closed"));
        }
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(text).await
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(TransportError::closed("session closed")),
            sent = write => sent,
        }
    }

    /// Marks the session closed. Returns `true` only for the first call.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        trace!(session = %self.id, role = %self.role, "Session closed");
        self.cancel.cancel();
        true
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Sends a close frame, waiting at most a short grace period for the
    /// write lock.
    pub(crate) async fn shutdown_sink(&self) {
        let close = async {
            let mut sink = self.sink.lock().await;
            let _ = sink.close().await;
        };
        let _ = tokio::time::timeout(SINK_CLOSE_GRACE, close).await;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}
