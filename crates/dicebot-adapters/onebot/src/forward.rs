//! Forward mode: accept connections from the gateway.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dicebot_transport::{ConnectionInfo, UpgradeHandler, UpgradeRejection, WsConnection};

use crate::adapter::{AdapterInner, consume_session};
use crate::session::{Session, SessionRole};

/// Token a peer presented: the `Authorization` bearer value, else the
/// `access_token` query parameter.
fn presented_token(info: &ConnectionInfo) -> Option<String> {
    info.header("authorization")
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .or_else(|| info.query_param("access_token"))
}

pub(crate) struct ForwardHandler {
    inner: Arc<AdapterInner>,
    shutdown: CancellationToken,
}

impl ForwardHandler {
    pub(crate) fn new(inner: Arc<AdapterInner>, shutdown: CancellationToken) -> Self {
        Self { inner, shutdown }
    }
}

#[async_trait]
impl UpgradeHandler for ForwardHandler {
    fn authorize(&self, info: &ConnectionInfo) -> Result<(), UpgradeRejection> {
        if self.shutdown.is_cancelled() {
            return Err(UpgradeRejection::Unavailable);
        }
        match self.inner.config.access_token() {
            Some(expected) if presented_token(info).as_deref() != Some(expected) => {
                Err(UpgradeRejection::Unauthorized)
            }
            _ => Ok(()),
        }
    }

    async fn on_upgrade(&self, conn: WsConnection) {
        let (info, sink, stream) = conn.into_parts();
        let role = SessionRole::determine(&info);
        let session = Session::new(role, sink);
        info!(
            remote_addr = info.remote_addr.as_deref().unwrap_or("unknown"),
            path = %info.path,
            role = %role,
            session = %session.id(),
            "OneBot peer connected"
        );

        let cause = self
            .inner
            .tracker
            .track_future(consume_session(&self.inner, session, stream, &self.shutdown))
            .await;
        debug!(path = %info.path, reason = %cause, "OneBot forward connection closed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use serde_json::{Value, json};

    use dicebot_core::{Adapter, FriendOperationRequest, PlatformAdapter, TransportError};
    use dicebot_transport::ws_dial;

    use super::*;
    use crate::adapter::OneBotAdapter;
    use crate::testing::Recorder;

    #[test]
    fn test_presented_token() {
        let info = ConnectionInfo::new("websocket").with_metadata("Authorization", "Bearer abc");
        assert_eq!(presented_token(&info).as_deref(), Some("abc"));

        let info = ConnectionInfo::new("websocket")
            .with_metadata("Authorization", "Bearer ")
            .with_query(Some("access_token=xyz"));
        assert_eq!(presented_token(&info).as_deref(), Some("xyz"));

        let info = ConnectionInfo::new("websocket").with_query(Some("access_token=a%2Bb"));
        assert_eq!(presented_token(&info).as_deref(), Some("a+b"));

        let info = ConnectionInfo::new("websocket").with_query(Some("other=1"));
        assert_eq!(presented_token(&info), None);
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_split_api_and_event_connections() {
        let adapter = OneBotAdapter::builder()
            .ws_forward("127.0.0.1:0")
            .access_token("tok")
            .build();
        let recorder = Arc::new(Recorder::default());
        adapter.set_callback(recorder.clone());
        adapter.serve(&CancellationToken::new()).await.unwrap();
        let addr = adapter.local_addr().unwrap();

        // Wrong or missing token is refused before the upgrade.
        let denied = ws_dial(&format!("ws://{addr}/api"), &[]).await;
        assert!(matches!(denied, Err(TransportError::ConnectionFailed { .. })));
        let denied = ws_dial(&format!("ws://{addr}/api?access_token=nope"), &[]).await;
        assert!(denied.is_err());

        // Path decides the role; the token may come from the query string.
        let api = ws_dial(&format!("ws://{addr}/onebot/API?access_token=tok"), &[])
            .await
            .unwrap();
        let (_, mut api_sink, mut api_stream) = api.into_parts();
        wait_until(|| adapter.is_alive()).await;

        // The header wins over the path.
        let event = ws_dial(
            &format!("ws://{addr}/onebot/api"),
            &[
                ("Authorization", "Bearer tok".to_string()),
                ("X-Client-Role", "Event".to_string()),
            ],
        )
        .await
        .unwrap();
        let (_, mut event_sink, _event_stream) = event.into_parts();

        let call = tokio::spawn({
            let adapter = adapter.clone();
            async move {
                adapter
                    .friend_delete(FriendOperationRequest {
                        user_id: "QQ:5".into(),
                    })
                    .await
            }
        });
        let frame = api_stream.next().await.unwrap().unwrap();
        let request: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(request["action"], "delete_friend");
        api_sink
            .send(json!({"status": "ok", "retcode": 0, "echo": request["echo"]}).to_string())
            .await
            .unwrap();
        assert!(call.await.unwrap().unwrap());

        event_sink
            .send(
                json!({"post_type": "request", "request_type": "friend", "user_id": 5})
                    .to_string(),
            )
            .await
            .unwrap();
        wait_until(|| !recorder.events.lock().is_empty()).await;
        assert_eq!(recorder.events.lock()[0].event_type, "friend");

        adapter.close().await.unwrap();
        assert!(!adapter.is_alive());
        assert!(ws_dial(&format!("ws://{addr}/api?access_token=tok"), &[]).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_new_api_connection_replaces_old() {
        let adapter = OneBotAdapter::builder().ws_forward("127.0.0.1:0").build();
        adapter.serve(&CancellationToken::new()).await.unwrap();
        let addr = adapter.local_addr().unwrap();

        let first = ws_dial(&format!("ws://{addr}/api"), &[]).await.unwrap();
        let (_, _first_sink, mut first_stream) = first.into_parts();
        wait_until(|| adapter.is_alive()).await;

        let second = ws_dial(&format!("ws://{addr}/api"), &[]).await.unwrap();
        let (_, _second_sink, _second_stream) = second.into_parts();

        // The displaced connection is closed by the adapter.
        let ended = tokio::time::timeout(Duration::from_secs(5), first_stream.next())
            .await
            .unwrap();
        assert!(matches!(ended, None | Some(Err(_))));
        assert!(adapter.is_alive());

        adapter.close().await.unwrap();
    }
}
