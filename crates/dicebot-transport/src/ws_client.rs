//! Outbound WebSocket dialing.

use futures::{SinkExt, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace};

use dicebot_core::{TransportError, TransportResult};

use crate::connection::{ConnectionInfo, FrameSink, FrameStream, WsConnection};

/// Dials `url` once, attaching `headers` to the upgrade request.
///
/// Reconnection is the caller's concern; this only performs a single attempt.
pub async fn ws_dial(url: &str, headers: &[(&str, String)]) -> TransportResult<WsConnection> {
    let mut request =
        url.into_client_request()
            .map_err(|e| TransportError::InvalidRequest(format!("{url}: {e}")))?;

    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        request.headers_mut().insert(name, value);
    }

    debug!(url = %url, "Dialing WebSocket");

    let (ws_stream, _response) =
        connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

    let (ws_tx, ws_rx) = ws_stream.split();

    let sink: FrameSink = Box::pin(
        ws_tx
            .sink_map_err(|e: WsError| TransportError::SendFailed(e.to_string()))
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
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                trace!("Control frame");
                None
            }
            Err(e) => Some(Err(TransportError::ReceiveFailed(e.to_string()))),
        })
    }));

    let info = ConnectionInfo::new("websocket").with_path(url);
    Ok(WsConnection::from_parts(info, sink, stream))
}
