//! Transport-neutral connection types.
//!
//! Both the dialer and the listener hand adapters a [`WsConnection`]: a
//! boxed text sink, a boxed inbound frame stream and the [`ConnectionInfo`]
//! captured while the connection was established. Control frames (ping,
//! pong) never reach the stream; a close frame surfaces as
//! [`TransportError::ConnectionClosed`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use futures::{Sink, Stream};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::form_urlencoded;

use dicebot_core::{TransportError, TransportResult};

/// Outbound half of a connection: accepts text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a connection: yields data frame payloads.
pub type FrameStream = Pin<Box<dyn Stream<Item = TransportResult<Vec<u8>>> + Send>>;

// =============================================================================
// Connection Info
// =============================================================================

/// Information about a connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    /// Remote address (if available).
    pub remote_addr: Option<String>,
    /// Connection protocol ("websocket").
    pub protocol: String,
    /// Request path for accepted connections, dialed URL for outbound ones.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    /// Request headers, keys lowercased.
    pub metadata: HashMap<String, String>,
}

impl ConnectionInfo {
    /// Creates new connection info.
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            ..Default::default()
        }
    }

    /// Sets the remote address.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Sets the path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the query string.
    pub fn with_query(mut self, query: Option<impl Into<String>>) -> Self {
        self.query = query.map(Into::into);
        self
    }

    /// Adds metadata. The key is lowercased.
    pub fn with_metadata(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.metadata
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Looks up a header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.metadata
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Looks up a query parameter by its decoded name. The value is
    /// percent-decoded, with `+` read as a space.
    pub fn query_param(&self, name: &str) -> Option<String> {
        form_urlencoded::parse(self.query.as_deref()?.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

// =============================================================================
// Connection
// =============================================================================

/// An established WebSocket connection.
pub struct WsConnection {
    pub info: ConnectionInfo,
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl WsConnection {
    /// Assembles a connection from already boxed halves.
    ///
    /// Used by the dialer and the listener, and by tests that drive a
    /// connection through in-memory channels.
    pub fn from_parts(info: ConnectionInfo, sink: FrameSink, stream: FrameStream) -> Self {
        Self { info, sink, stream }
    }

    /// Splits the connection into its parts.
    pub fn into_parts(self) -> (ConnectionInfo, FrameSink, FrameStream) {
        (self.info, self.sink, self.stream)
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Handle to a running listener.
///
/// Dropping this handle stops accepting new connections but does not wait
/// for the server task; call [`stop`](Self::stop) for an orderly shutdown.
#[derive(Debug)]
pub struct ListenerHandle {
    /// Unique identifier for this listener.
    pub id: String,
    /// The address the listener actually bound (resolves port `0`).
    pub local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerHandle {
    /// Creates a new listener handle.
    pub fn new(
        id: impl Into<String>,
        local_addr: SocketAddr,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            id: id.into(),
            local_addr,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Requests a graceful shutdown and waits up to `grace` for the server task.
    ///
    /// Calling this more than once is harmless.
    pub async fn stop(&self, grace: Duration) {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };

        match tokio::time::timeout(grace, task).await {
            Ok(Ok(())) => debug!(id = %self.id, "Listener stopped"),
            Ok(Err(e)) => warn!(id = %self.id, error = %e, "Listener task failed"),
            Err(_) => warn!(id = %self.id, ?grace, "Listener did not stop in time"),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_info_lookup() {
        let info = ConnectionInfo::new("websocket")
            .with_path("/onebot/v11/ws/api")
            .with_query(Some("foo=1&access_token=abc&bare"))
            .with_metadata("X-Client-Role", "Event");

        assert_eq!(info.header("x-client-role"), Some("Event"));
        assert_eq!(info.header("X-CLIENT-ROLE"), Some("Event"));
        assert_eq!(info.query_param("access_token").as_deref(), Some("abc"));
        assert_eq!(info.query_param("bare").as_deref(), Some(""));
        assert_eq!(info.query_param("missing"), None);
    }

    #[test]
    fn test_query_param_is_percent_decoded() {
        let info = ConnectionInfo::new("websocket")
            .with_query(Some("access_token=a%2Bb&note=hello+world&access%5Fkey=x"));
        assert_eq!(info.query_param("access_token").as_deref(), Some("a+b"));
        assert_eq!(info.query_param("note").as_deref(), Some("hello world"));
        assert_eq!(info.query_param("access_key").as_deref(), Some("x"));
    }

    #[test]
    fn test_connection_info_without_query() {
        let info = ConnectionInfo::new("websocket").with_query(None::<String>);
        assert_eq!(info.query_param("access_token"), None);
    }

    #[tokio::test]
    async fn test_listener_handle_stop_is_idempotent() {
        let token = CancellationToken::new();
        let watched = token.clone();
        let task = tokio::spawn(async move { watched.cancelled().await });
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let handle = ListenerHandle::new("test", addr, token, task);

        handle.stop(Duration::from_secs(1)).await;
        assert!(handle.is_stopping());
        handle.stop(Duration::from_secs(1)).await;
    }
}
