//! Inbound WebSocket listener.
//!
//! A single axum router accepts upgrades on every path (`/` and `/{*path}`).
//! Each request is first shown to [`UpgradeHandler::authorize`]; only when it
//! passes is the connection upgraded and handed to
//! [`UpgradeHandler::on_upgrade`].
//!
//! ```text
//! GET /any/path  ──▶ authorize ──Err──▶ 401 / 503
//!                        │
//!                        Ok
//!                        ▼
//!                 WebSocket upgrade ──▶ on_upgrade(WsConnection)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt, future};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use dicebot_core::{TransportError, TransportResult};

use crate::connection::{ConnectionInfo, FrameSink, FrameStream, ListenerHandle, WsConnection};

/// Why an upgrade request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeRejection {
    /// The owner is shutting down (503).
    Unavailable,
    /// Missing or wrong credentials (401).
    Unauthorized,
}

impl IntoResponse for UpgradeRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "adapter shutting down").into_response()
            }
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized").into_response(),
        }
    }
}

/// Receives accepted connections from [`ws_listen`].
#[async_trait]
pub trait UpgradeHandler: Send + Sync + 'static {
    /// Decides whether a request may be upgraded. Runs before the handshake.
    fn authorize(&self, info: &ConnectionInfo) -> Result<(), UpgradeRejection>;

    /// Owns an upgraded connection until it ends.
    async fn on_upgrade(&self, conn: WsConnection);
}

type SharedHandler = Arc<dyn UpgradeHandler>;

/// Binds `addr` and serves WebSocket upgrades until the returned handle is
/// stopped or `parent` is cancelled.
pub async fn ws_listen(
    addr: &str,
    handler: SharedHandler,
    parent: &CancellationToken,
) -> TransportResult<ListenerHandle> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
    let local_addr = listener.local_addr()?;

    let router = Router::new()
        .route("/{*path}", get(ws_dispatch))
        .route("/", get(ws_dispatch))
        .with_state(handler);

    let shutdown = parent.child_token();
    let signal = shutdown.clone();

    let task = tokio::spawn(async move {
        let server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { signal.cancelled().await });

        if let Err(e) = server.await {
            error!(addr = %local_addr, error = %e, "WebSocket server error");
        }
        info!(addr = %local_addr, "WebSocket server stopped");
    });

    info!(addr = %local_addr, "WebSocket server listening");

    Ok(ListenerHandle::new(
        format!("ws-server-{local_addr}"),
        local_addr,
        shutdown,
        task,
    ))
}

/// Axum handler for every GET request.
async fn ws_dispatch(
    State(handler): State<SharedHandler>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let mut info = ConnectionInfo::new("websocket")
        .with_remote_addr(addr.to_string())
        .with_path(uri.path())
        .with_query(uri.query());
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            info = info.with_metadata(name.as_str(), value);
        }
    }

    if let Err(rejection) = handler.authorize(&info) {
        debug!(remote_addr = %addr, path = %info.path, ?rejection, "Upgrade refused");
        return rejection.into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    debug!(remote_addr = %addr, path = %info.path, "Upgrading WebSocket connection");
    ws.on_upgrade(move |socket| async move {
        handler.on_upgrade(into_connection(info, socket)).await;
    })
}

fn into_connection(info: ConnectionInfo, socket: WebSocket) -> WsConnection {
    let (ws_tx, ws_rx) = socket.split();

    let sink: FrameSink = Box::pin(
        ws_tx
            .sink_map_err(|e: axum::Error| TransportError::SendFailed(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into())))),
    );

    let stream: FrameStream = Box::pin(ws_rx.filter_map(|msg| {
        future::ready(match msg {
            Ok(Message::Text(text)) => Some(Ok(text.as_bytes().to_vec())),
            Ok(Message::Binary(data)) => Some(Ok(data.to_vec())),
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.as_str().to_owned())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by peer".to_string());
                Some(Err(TransportError::closed(reason)))
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                trace!("Control frame");
                None
            }
            Err(e) => Some(Err(TransportError::ReceiveFailed(e.to_string()))),
        })
    }));

    WsConnection::from_parts(info, sink, stream)
}

#[cfg(all(test, feature = "ws-client"))]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::ws_client::ws_dial;

    struct EchoHandler {
        seen_paths: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UpgradeHandler for EchoHandler {
        fn authorize(&self, info: &ConnectionInfo) -> Result<(), UpgradeRejection> {
            match info.query_param("access_token").as_deref() {
                Some("letmein") => Ok(()),
                _ => Err(UpgradeRejection::Unauthorized),
            }
        }

        async fn on_upgrade(&self, conn: WsConnection) {
            let (info, mut sink, mut stream) = conn.into_parts();
            self.seen_paths.lock().push(info.path);
            while let Some(Ok(frame)) = stream.next().await {
                let text = String::from_utf8_lossy(&frame).into_owned();
                if sink.send(text).await.is_err() {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_listen_echo_and_auth() {
        let handler = Arc::new(EchoHandler {
            seen_paths: Mutex::new(Vec::new()),
        });
        let root = CancellationToken::new();
        let listener = ws_listen("127.0.0.1:0", handler.clone(), &root)
            .await
            .unwrap();
        let addr = listener.local_addr;

        // Missing token: the handshake fails with 401.
        let denied = ws_dial(&format!("ws://{addr}/ws"), &[]).await;
        assert!(matches!(denied, Err(TransportError::ConnectionFailed { .. })));

        let conn = ws_dial(&format!("ws://{addr}/deep/path?access_token=letmein"), &[])
            .await
            .unwrap();
        let (_, mut sink, mut stream) = conn.into_parts();
        sink.send("ping".to_string()).await.unwrap();
        let echoed = stream.next().await.unwrap().unwrap();
        assert_eq!(echoed, b"ping");
        assert_eq!(handler.seen_paths.lock().as_slice(), ["/deep/path"]);

        drop(sink);
        drop(stream);
        listener.stop(Duration::from_secs(2)).await;
        assert!(listener.is_stopping());
    }
}
