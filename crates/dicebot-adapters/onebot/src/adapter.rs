//! The OneBot v11 adapter.
//!
//! Bridges a OneBot v11 gateway with the dicebot dispatch core. Either or
//! both connection modes may be enabled:
//!
//! - **Reverse** (`ws_reverse`): dial the gateway and redial with backoff.
//! - **Forward** (`ws_forward`): listen and let the gateway connect, possibly
//!   with separate `api` and `event` connections.
//!
//! ```text
//!              ┌────────────── OneBotAdapter ──────────────┐
//!  gateway ◀──▶│ Session ─▶ FrameDispatcher ─▶ callback    │
//!              │    ▲              │                        │
//!              │    │              ▼                        │
//!              │ Registry ◀── RequestCorrelator ◀── calls   │
//!              └───────────────────────────────────────────┘
//! ```
//!
//! # Programmatic Usage
//!
//! ```rust,ignore
//! let adapter = OneBotAdapter::builder()
//!     .ws_reverse("ws://127.0.0.1:8100/onebot/v11/ws")
//!     .access_token("secret-token")
//!     .build();
//! adapter.set_callback(Arc::new(MyCallback));
//! adapter.serve(&shutdown).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use dicebot_core::{
    Adapter, AdapterResult, ApiError, ApiResult, FriendOperationRequest, GroupInfo,
    GroupOperationBanRequest, GroupOperationCardNameSetRequest, GroupOperationKickRequest,
    GroupOperationQuitRequest, MessageOperationRequest, MessageSendFileRequest,
    MessageSendRequest, MessageType, PlatformAdapter, SharedCallback, TargetId, TransportError,
    format_qq_group, format_qq_user,
};
use dicebot_transport::{FrameStream, ListenerHandle, ws_listen};

use crate::config::OneBotConfig;
use crate::correlator::RequestCorrelator;
use crate::dispatcher::{CallbackSlot, FrameDispatcher};
use crate::forward::ForwardHandler;
use crate::model::{GroupInfoData, SendMsgData, build_message, id_string};
use crate::outbound::{IdKind, echo_message, normalize_id};
use crate::registry::SessionRegistry;
use crate::reverse::run_dialer;
use crate::session::Session;

const LISTENER_STOP_GRACE: Duration = Duration::from_secs(5);
const TASK_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// State shared by the adapter handle and its background tasks.
pub(crate) struct AdapterInner {
    pub(crate) config: OneBotConfig,
    registry: SessionRegistry,
    correlator: Arc<RequestCorrelator>,
    dispatcher: FrameDispatcher,
    callback: Arc<CallbackSlot>,
    shutdown: Mutex<CancellationToken>,
    pub(crate) tracker: TaskTracker,
    listener: Mutex<Option<ListenerHandle>>,
}

impl AdapterInner {
    fn new(config: OneBotConfig) -> Self {
        let correlator = Arc::new(RequestCorrelator::new(config.api_timeout()));
        let callback = Arc::new(CallbackSlot::default());
        Self {
            dispatcher: FrameDispatcher::new(correlator.clone(), callback.clone()),
            config,
            registry: SessionRegistry::new(),
            correlator,
            callback,
            shutdown: Mutex::new(CancellationToken::new()),
            tracker: TaskTracker::new(),
            listener: Mutex::new(None),
        }
    }

    /// Issues a call over the active API session.
    async fn call_action(&self, action: &str, params: Value) -> ApiResult<Value> {
        let Some(session) = self.registry.active_api_session() else {
            debug!(action = %action, "No active OneBot API session");
            return Err(ApiError::NotConnected);
        };
        self.correlator.call(&session, action, params).await
    }

    /// Reports a successfully sent message back through the callback.
    fn emit_echo(
        &self,
        request: MessageSendRequest,
        message_type: MessageType,
        target: String,
        data: Value,
    ) {
        let Some(callback) = self.callback.get() else {
            return;
        };
        let raw_id = serde_json::from_value::<SendMsgData>(data)
            .map(|data| id_string(data.message_id.as_ref()))
            .ok();
        callback.on_message_received(echo_message(
            &request.segments,
            request.sender,
            message_type,
            target,
            raw_id,
        ));
    }
}

/// Installs `session`, feeds its frames to the dispatcher until it ends, then
/// clears it. Returns why the session ended.
pub(crate) async fn consume_session(
    inner: &AdapterInner,
    session: Arc<Session>,
    mut stream: FrameStream,
    shutdown: &CancellationToken,
) -> TransportError {
    inner.registry.install(session.clone());

    let cause = loop {
        tokio::select! {
            () = shutdown.cancelled() => break TransportError::closed("adapter closed"),
            () = session.closed() => break TransportError::closed("session closed"),
            frame = stream.next() => match frame {
                Some(Ok(payload)) => {
                    if let Err(e) = inner.dispatcher.dispatch(&payload) {
                        debug!(session = %session.id(), error = %e, "Dropping malformed OneBot frame");
                    }
                }
                Some(Err(e)) => break e,
                None => break TransportError::closed("stream ended"),
            },
        }
    };

    if inner.registry.clear(&session) {
        inner.correlator.fail_all("api socket closed");
    }
    session.shutdown_sink().await;
    info!(session = %session.id(), role = %session.role(), reason = %cause, "OneBot session ended");
    cause
}

/// The OneBot v11 adapter. Cheap to clone; clones share one connection state.
#[derive(Clone)]
pub struct OneBotAdapter {
    inner: Arc<AdapterInner>,
}

impl OneBotAdapter {
    pub fn new(config: OneBotConfig) -> Self {
        Self {
            inner: Arc::new(AdapterInner::new(config)),
        }
    }

    /// Creates an adapter builder.
    pub fn builder() -> OneBotAdapterBuilder {
        OneBotAdapterBuilder::default()
    }

    pub fn config(&self) -> &OneBotConfig {
        &self.inner.config
    }

    /// Address the forward listener is bound to, once serving.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.listener.lock().as_ref().map(|l| l.local_addr)
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.correlator.pending_count()
    }
}

/// Builder for [`OneBotAdapter`].
#[derive(Default)]
pub struct OneBotAdapterBuilder {
    config: OneBotConfig,
}

impl OneBotAdapterBuilder {
    /// Dials `url` (reverse mode).
    pub fn ws_reverse(mut self, url: impl Into<String>) -> Self {
        self.config.ws_reverse = url.into();
        self
    }

    /// Listens on `addr` (forward mode).
    pub fn ws_forward(mut self, addr: impl Into<String>) -> Self {
        self.config.ws_forward = addr.into();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = token.into();
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.config.secret = secret.into();
        self
    }

    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the first and the largest reconnect delay.
    pub fn reconnect_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.config.reconnect_initial_delay_ms = initial.as_millis() as u64;
        self.config.reconnect_max_delay_ms = max.as_millis() as u64;
        self
    }

    pub fn build(self) -> OneBotAdapter {
        OneBotAdapter::new(self.config)
    }
}

#[async_trait]
impl Adapter for OneBotAdapter {
    fn name(&self) -> &'static str {
        "onebot"
    }

    async fn serve(&self, shutdown: &CancellationToken) -> AdapterResult<()> {
        let inner = &self.inner;
        let reverse = inner.config.reverse_url().map(str::to_string);
        let forward = inner.config.forward_addr().map(str::to_string);

        if reverse.is_none() && forward.is_none() {
            warn!("OneBot adapter has neither ws_reverse nor ws_forward configured");
            return Ok(());
        }

        // A repeated serve replaces the previous run instead of leaking it.
        let token = shutdown.child_token();
        let previous = std::mem::replace(&mut *inner.shutdown.lock(), token.clone());
        previous.cancel();
        let stale = inner.listener.lock().take();
        if let Some(listener) = stale {
            debug!("Stopping listener of the previous serve");
            listener.stop(LISTENER_STOP_GRACE).await;
        }
        inner.tracker.reopen();

        if let Some(url) = reverse {
            info!(url = %url, "Starting OneBot reverse dialer");
            inner
                .tracker
                .spawn(run_dialer(inner.clone(), url, token.clone()));
        }

        if let Some(addr) = forward {
            let handler = Arc::new(ForwardHandler::new(inner.clone(), token.clone()));
            let listener = ws_listen(&addr, handler, &token).await?;
            info!(addr = %listener.local_addr, "OneBot forward listener started");
            *inner.listener.lock() = Some(listener);
        }

        Ok(())
    }

    async fn close(&self) -> AdapterResult<()> {
        let inner = &self.inner;

        // Empty the slots before the read loops notice the shutdown, so
        // pending calls fail with the adapter's cause.
        let sessions = inner.registry.take_all();
        inner.correlator.fail_all("adapter closed");

        inner.shutdown.lock().cancel();
        let listener = inner.listener.lock().take();
        if let Some(listener) = listener {
            listener.stop(LISTENER_STOP_GRACE).await;
        }

        for session in &sessions {
            session.close();
        }

        inner.tracker.close();
        if tokio::time::timeout(TASK_DRAIN_GRACE, inner.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = inner.tracker.len(),
                "OneBot tasks did not stop in time"
            );
        }

        info!(sessions = sessions.len(), "OneBot adapter closed");
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for OneBotAdapter {
    fn is_alive(&self) -> bool {
        self.inner.registry.is_running()
    }

    fn set_callback(&self, callback: SharedCallback) {
        self.inner.callback.set(callback);
    }

    async fn msg_send_to_group(&self, request: MessageSendRequest) -> ApiResult<bool> {
        let group_id = normalize_id(&request.target_id, IdKind::Group)?;
        let params = json!({
            "group_id": group_id,
            "message": build_message(&request.segments),
        });
        let data = self.inner.call_action("send_group_msg", params).await?;

        let target = format_qq_group(&group_id.to_string());
        self.inner
            .emit_echo(request, MessageType::Group, target, data);
        Ok(true)
    }

    async fn msg_send_to_person(&self, request: MessageSendRequest) -> ApiResult<bool> {
        let user_id = normalize_id(&request.target_id, IdKind::User)?;
        let params = json!({
            "user_id": user_id,
            "message": build_message(&request.segments),
        });
        let data = self.inner.call_action("send_private_msg", params).await?;

        let target = format_qq_user(&user_id.to_string());
        self.inner
            .emit_echo(request, MessageType::Private, target, data);
        Ok(true)
    }

    async fn msg_send_file_to_group(&self, _request: MessageSendFileRequest) -> ApiResult<bool> {
        Err(ApiError::NotSupported("group file send"))
    }

    async fn msg_send_file_to_person(&self, _request: MessageSendFileRequest) -> ApiResult<bool> {
        Err(ApiError::NotSupported("private file send"))
    }

    async fn msg_edit(&self, _request: MessageOperationRequest) -> ApiResult<bool> {
        Err(ApiError::NotSupported("message edit"))
    }

    async fn msg_recall(&self, request: MessageOperationRequest) -> ApiResult<bool> {
        let message_id = normalize_id(&request.message_id, IdKind::Message)?;
        self.inner
            .call_action("delete_msg", json!({ "message_id": message_id }))
            .await?;
        Ok(true)
    }

    async fn group_member_ban(&self, request: GroupOperationBanRequest) -> ApiResult<bool> {
        let group_id = normalize_id(&request.group_id, IdKind::Group)?;
        let user_id = normalize_id(&request.user_id, IdKind::User)?;
        let params = json!({
            "group_id": group_id,
            "user_id": user_id,
            "duration": request.duration,
        });
        self.inner.call_action("set_group_ban", params).await?;
        Ok(true)
    }

    async fn group_member_kick(&self, request: GroupOperationKickRequest) -> ApiResult<bool> {
        let group_id = normalize_id(&request.group_id, IdKind::Group)?;
        let user_id = normalize_id(&request.user_id, IdKind::User)?;
        let params = json!({
            "group_id": group_id,
            "user_id": user_id,
            "reject_add_request": true,
        });
        self.inner.call_action("set_group_kick", params).await?;
        Ok(true)
    }

    async fn group_quit(&self, request: GroupOperationQuitRequest) -> ApiResult<bool> {
        let group_id = normalize_id(&request.group_id, IdKind::Group)?;
        let params = json!({ "group_id": group_id, "is_dismiss": false });
        self.inner.call_action("set_group_leave", params).await?;
        Ok(true)
    }

    async fn group_card_name_set(
        &self,
        request: GroupOperationCardNameSetRequest,
    ) -> ApiResult<bool> {
        let group_id = normalize_id(&request.group_id, IdKind::Group)?;
        let user_id = normalize_id(&request.user_id, IdKind::User)?;
        let params = json!({
            "group_id": group_id,
            "user_id": user_id,
            "card": request.name,
        });
        self.inner.call_action("set_group_card", params).await?;
        Ok(true)
    }

    async fn group_info_get(&self, group_id: TargetId) -> ApiResult<GroupInfo> {
        let group_id = normalize_id(&group_id, IdKind::Group)?;
        let data = self
            .inner
            .call_action("get_group_info", json!({ "group_id": group_id }))
            .await?;

        let info: GroupInfoData = serde_json::from_value(data)
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
        let raw_id = match id_string(info.group_id.as_ref()) {
            id if id.is_empty() => group_id.to_string(),
            id => id,
        };
        trace!(group_id = %raw_id, name = %info.group_name, "Fetched group info");

        Ok(GroupInfo {
            group_id: format_qq_group(&raw_id),
            group_name: info.group_name,
            member_count: info.member_count,
            max_member_count: info.max_member_count,
        })
    }

    async fn friend_delete(&self, request: FriendOperationRequest) -> ApiResult<bool> {
        let user_id = normalize_id(&request.user_id, IdKind::User)?;
        self.inner
            .call_action("delete_friend", json!({ "user_id": user_id }))
            .await?;
        Ok(true)
    }

    async fn friend_add(&self, _request: FriendOperationRequest) -> ApiResult<bool> {
        Err(ApiError::NotSupported("friend add"))
    }
}
