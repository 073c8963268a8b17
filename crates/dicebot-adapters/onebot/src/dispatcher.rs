//! Inbound frame classification.
//!
//! Every frame is probed for `echo` and `post_type`:
//!
//! ```text
//! frame ─┬─ echo present ──────────▶ resolve pending call
//!        ├─ post_type != message ──▶ AdapterEvent ──▶ on_event
//!        └─ post_type == message ──▶ Message ──────▶ on_message_received
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use dicebot_core::{
    AdapterEvent, AdapterResult, ApiError, Message, MessageSegment,
    MessageSendCallbackInfo, MessageType, PLATFORM_QQ, SenderInfo, SharedCallback,
    SimpleUserInfo, format_qq_group, format_qq_user,
};

use crate::correlator::RequestCorrelator;
use crate::model::{
    ApiResponse, BaseFrame, MessageEnvelope, MetaFrame, NoticeFrame, RequestFrame, id_string,
    parse_message,
};

/// The replaceable callback receiving inbound traffic.
#[derive(Default)]
pub struct CallbackSlot(RwLock<Option<SharedCallback>>);

impl CallbackSlot {
    pub fn set(&self, callback: SharedCallback) {
        *self.0.write() = Some(callback);
    }

    pub fn get(&self) -> Option<SharedCallback> {
        self.0.read().clone()
    }
}

/// Routes inbound frames to the correlator or the callback.
pub struct FrameDispatcher {
    correlator: Arc<RequestCorrelator>,
    callback: Arc<CallbackSlot>,
}

impl FrameDispatcher {
    pub fn new(correlator: Arc<RequestCorrelator>, callback: Arc<CallbackSlot>) -> Self {
        Self {
            correlator,
            callback,
        }
    }

    /// Handles one frame. An error means the frame was malformed and dropped.
    pub fn dispatch(&self, payload: &[u8]) -> AdapterResult<()> {
        let base: BaseFrame = serde_json::from_slice(payload)?;

        if let Some(echo) = base.echo_token() {
            let outcome = serde_json::from_slice::<ApiResponse>(payload)
                .map_err(|e| ApiError::MalformedResponse(e.to_string()));
            if !self.correlator.resolve(&echo, outcome) {
                trace!(echo = %echo, "Late or unknown OneBot response");
            }
            return Ok(());
        }

        let post_type = base.post_type();
        if post_type != "message" {
            let Some(callback) = self.callback.get() else {
                return Ok(());
            };
            match frame_to_event(post_type, payload) {
                Ok(event) => callback.on_event(event),
                Err(e) => {
                    debug!(post_type = %post_type, error = %e, "Failed to convert OneBot event");
                    callback.on_error(&e);
                }
            }
            return Ok(());
        }

        let envelope: MessageEnvelope = serde_json::from_slice(payload)?;
        let Some(message) = envelope_to_message(&envelope) else {
            trace!("Empty or unsupported OneBot message suppressed");
            return Ok(());
        };

        if let Some(callback) = self.callback.get() {
            let sender = SimpleUserInfo {
                user_id: message.sender.user_id.clone(),
                user_name: message.sender.nickname.clone(),
            };
            callback.on_message_received(MessageSendCallbackInfo {
                sender: Some(sender),
                message,
            });
        }
        Ok(())
    }
}

fn qq_user(value: Option<&Value>) -> String {
    let id = id_string(value);
    if id.is_empty() { id } else { format_qq_user(&id) }
}

fn qq_group(value: Option<&Value>) -> String {
    let id = id_string(value);
    if id.is_empty() { id } else { format_qq_group(&id) }
}

/// Builds an [`AdapterEvent`] from a non-message frame.
pub fn frame_to_event(post_type: &str, payload: &[u8]) -> AdapterResult<AdapterEvent> {
    let raw: Map<String, Value> = serde_json::from_slice(payload)?;

    let mut event = AdapterEvent {
        platform: PLATFORM_QQ.to_string(),
        post_type: post_type.to_string(),
        ..Default::default()
    };

    match post_type {
        "notice" => {
            let notice = from_raw::<NoticeFrame>(&raw)?;
            event.event_type = notice.notice_type;
            event.sub_type = notice.sub_type;
            event.time = notice.time.unwrap_or_default();
            event.group_id = qq_group(notice.group_id.as_ref());
            event.guild_id = id_string(notice.guild_id.as_ref());
            event.channel_id = id_string(notice.channel_id.as_ref());
            event.user_id = qq_user(notice.user_id.as_ref());
            if event.user_id.is_empty() {
                event.user_id = qq_user(notice.target_id.as_ref());
            }
            event.operator_id = qq_user(notice.operator_id.as_ref());
        }
        "request" => {
            let request = from_raw::<RequestFrame>(&raw)?;
            event.event_type = request.request_type;
            event.sub_type = request.sub_type;
            event.time = request.time.unwrap_or_default();
            event.group_id = qq_group(request.group_id.as_ref());
            event.guild_id = id_string(request.guild_id.as_ref());
            event.channel_id = id_string(request.channel_id.as_ref());
            event.user_id = qq_user(request.user_id.as_ref());
            event.operator_id = qq_user(request.operator_id.as_ref());
            if event.operator_id.is_empty() {
                event.operator_id = qq_user(request.invitor_id.as_ref());
            }
        }
        "meta_event" => {
            let meta = from_raw::<MetaFrame>(&raw)?;
            event.event_type = meta.meta_event_type;
            event.sub_type = meta.sub_type;
            event.time = meta.time.unwrap_or_default();
        }
        _ => {}
    }

    if event.event_type.is_empty() {
        event.event_type = post_type.to_string();
    }
    event.raw = raw;
    Ok(event)
}

/// Builds a [`Message`] from a message frame. Returns `None` when the frame
/// carries no usable content or a message type that cannot be answered.
///
/// An unknown or missing `message_type` on a frame with a `group_id` is
/// treated as a group message; a missing one without it as private.
pub fn envelope_to_message(envelope: &MessageEnvelope) -> Option<Message> {
    let mut segments = parse_message(&envelope.message);
    if segments.is_empty() && !envelope.raw_message.is_empty() {
        segments.push(MessageSegment::text(envelope.raw_message.as_str()));
    }
    if segments.is_empty() {
        return None;
    }

    let sender_raw = match id_string(envelope.sender.user_id.as_ref()) {
        id if id.is_empty() => id_string(envelope.user_id.as_ref()),
        id => id,
    };
    let sender_id = format_qq_user(&sender_raw);
    let nickname = [&envelope.sender.card, &envelope.sender.nickname]
        .into_iter()
        .find(|name| !name.is_empty())
        .cloned()
        .unwrap_or_else(|| sender_id.clone());

    let message_type = match MessageType::parse(&envelope.message_type) {
        Some(kind) => kind,
        None if !id_string(envelope.group_id.as_ref()).is_empty() => MessageType::Group,
        None if envelope.message_type.is_empty() => MessageType::Private,
        None => {
            debug!(message_type = %envelope.message_type, "Skipping message of unsupported type");
            return None;
        }
    };
    let mut message = Message {
        platform: PLATFORM_QQ.to_string(),
        time: envelope.time.unwrap_or_default(),
        message_type: message_type.clone(),
        sender: SenderInfo {
            user_id: sender_id,
            nickname,
            group_role: envelope.sender.role.clone(),
        },
        message: segments.to_text(),
        segments,
        raw_id: Some(id_string(envelope.message_id.as_ref())).filter(|id| !id.is_empty()),
        ..Default::default()
    };

    match message_type {
        MessageType::Group => message.group_id = qq_group(envelope.group_id.as_ref()),
        MessageType::Guild => {
            message.guild_id = id_string(envelope.guild_id.as_ref());
            message.channel_id = id_string(envelope.channel_id.as_ref());
        }
        MessageType::Private => {}
    }

    Some(message)
}

fn from_raw<T: DeserializeOwned>(raw: &Map<String, Value>) -> AdapterResult<T> {
    Ok(T::deserialize(&Value::Object(raw.clone()))?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::Recorder;

    fn dispatcher() -> (FrameDispatcher, Arc<Recorder>, Arc<RequestCorrelator>) {
        let correlator = Arc::new(RequestCorrelator::new(std::time::Duration::from_secs(5)));
        let slot = Arc::new(CallbackSlot::default());
        let recorder = Arc::new(Recorder::default());
        slot.set(recorder.clone());
        (
            FrameDispatcher::new(correlator.clone(), slot),
            recorder,
            correlator,
        )
    }

    fn dispatch(d: &FrameDispatcher, frame: Value) -> AdapterResult<()> {
        d.dispatch(frame.to_string().as_bytes())
    }

    #[test]
    fn test_group_message() {
        let (d, recorder, _) = dispatcher();
        dispatch(
            &d,
            json!({
                "post_type": "message",
                "message_type": "group",
                "time": 1700000000,
                "message_id": 123456,
                "group_id": 20002,
                "user_id": 10001,
                "message": [{"type": "text", "data": {"text": ".r 1d100"}}],
                "raw_message": ".r 1d100",
                "sender": {"user_id": 10001, "nickname": "Alice", "card": "KP", "role": "admin"}
            }),
        )
        .unwrap();

        let messages = recorder.messages.lock();
        assert_eq!(messages.len(), 1);
        let info = &messages[0];
        let msg = &info.message;
        assert_eq!(msg.platform, "QQ");
        assert_eq!(msg.message_type, MessageType::Group);
        assert_eq!(msg.group_id, "QQ-Group:20002");
        assert_eq!(msg.sender.user_id, "QQ:10001");
        assert_eq!(msg.sender.nickname, "KP");
        assert_eq!(msg.sender.group_role, "admin");
        assert_eq!(msg.message, ".r 1d100");
        assert_eq!(msg.raw_id.as_deref(), Some("123456"));
        assert_eq!(msg.time, 1_700_000_000);

        let sender = info.sender.as_ref().unwrap();
        assert_eq!(sender.user_id, "QQ:10001");
        assert_eq!(sender.user_name, "KP");
    }

    #[test]
    fn test_private_message_from_plain_string() {
        let (d, recorder, _) = dispatcher();
        dispatch(
            &d,
            json!({
                "post_type": "message",
                "message_type": "private",
                "message": ".help",
                "sender": {"user_id": "10001"}
            }),
        )
        .unwrap();

        let messages = recorder.messages.lock();
        let msg = &messages[0].message;
        assert_eq!(msg.message_type, MessageType::Private);
        assert_eq!(msg.group_id, "");
        // Nickname falls back to the sender id.
        assert_eq!(msg.sender.nickname, "QQ:10001");
        assert_eq!(msg.message, ".help");
    }

    #[test]
    fn test_raw_message_fallback_and_guild_ids() {
        let (d, recorder, _) = dispatcher();
        dispatch(
            &d,
            json!({
                "post_type": "message",
                "message_type": "guild",
                "guild_id": "g1",
                "channel_id": 77,
                "message": [{"type": "unknown", "data": {}}],
                "raw_message": "fallback text",
                "sender": {"user_id": 1, "nickname": "Bob"}
            }),
        )
        .unwrap();

        let messages = recorder.messages.lock();
        let msg = &messages[0].message;
        assert_eq!(msg.guild_id, "g1");
        assert_eq!(msg.channel_id, "77");
        assert_eq!(msg.message, "fallback text");
        assert_eq!(msg.sender.nickname, "Bob");
    }

    #[test]
    fn test_unknown_message_type() {
        let (d, recorder, _) = dispatcher();
        let frame = |message_type: Option<&str>, group_id: Option<i64>| {
            let mut frame = json!({
                "post_type": "message",
                "message": "hi",
                "sender": {"user_id": 5}
            });
            if let Some(kind) = message_type {
                frame["message_type"] = json!(kind);
            }
            if let Some(id) = group_id {
                frame["group_id"] = json!(id);
            }
            frame
        };

        dispatch(&d, frame(None, Some(30003))).unwrap();
        dispatch(&d, frame(Some("discuss"), Some(30004))).unwrap();
        dispatch(&d, frame(None, None)).unwrap();
        dispatch(&d, frame(Some("discuss"), None)).unwrap();

        let messages = recorder.messages.lock();
        let kinds: Vec<_> = messages
            .iter()
            .map(|info| (info.message.message_type.clone(), info.message.group_id.clone()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (MessageType::Group, "QQ-Group:30003".to_string()),
                (MessageType::Group, "QQ-Group:30004".to_string()),
                (MessageType::Private, String::new()),
            ]
        );
        assert!(recorder.errors.lock().is_empty());
    }

    #[test]
    fn test_empty_message_is_suppressed() {
        let (d, recorder, _) = dispatcher();
        dispatch(
            &d,
            json!({
                "post_type": "message",
                "message_type": "group",
                "group_id": 1,
                "message": [],
                "raw_message": "",
                "sender": {"user_id": 1}
            }),
        )
        .unwrap();
        assert!(recorder.messages.lock().is_empty());
        assert!(recorder.errors.lock().is_empty());
    }

    #[test]
    fn test_notice_event_falls_back_to_target_id() {
        let (d, recorder, _) = dispatcher();
        dispatch(
            &d,
            json!({
                "post_type": "notice",
                "notice_type": "notify",
                "sub_type": "poke",
                "time": 1700000001,
                "group_id": 20002,
                "target_id": 10001,
                "operator_id": "30003"
            }),
        )
        .unwrap();

        let events = recorder.events.lock();
        let event = &events[0];
        assert_eq!(event.post_type, "notice");
        assert_eq!(event.event_type, "notify");
        assert_eq!(event.sub_type, "poke");
        assert_eq!(event.group_id, "QQ-Group:20002");
        assert_eq!(event.user_id, "QQ:10001");
        assert_eq!(event.operator_id, "QQ:30003");
        assert_eq!(event.raw_str("sub_type"), Some("poke"));
    }

    #[test]
    fn test_request_event_falls_back_to_invitor() {
        let (d, recorder, _) = dispatcher();
        dispatch(
            &d,
            json!({
                "post_type": "request",
                "request_type": "group",
                "sub_type": "invite",
                "group_id": 20002,
                "user_id": 10001,
                "invitor_id": 40004,
                "flag": "abc"
            }),
        )
        .unwrap();

        let events = recorder.events.lock();
        assert_eq!(events[0].event_type, "group");
        assert_eq!(events[0].user_id, "QQ:10001");
        assert_eq!(events[0].operator_id, "QQ:40004");
        assert_eq!(events[0].raw_str("flag"), Some("abc"));
    }

    #[test]
    fn test_meta_and_unknown_post_types() {
        let (d, recorder, _) = dispatcher();
        dispatch(
            &d,
            json!({"post_type": "meta_event", "meta_event_type": "heartbeat", "time": 5}),
        )
        .unwrap();
        dispatch(&d, json!({"post_type": "message_sent", "self_id": 1})).unwrap();

        let events = recorder.events.lock();
        assert_eq!(events[0].event_type, "heartbeat");
        assert_eq!(events[0].time, 5);
        // Type defaults to the post type.
        assert_eq!(events[1].event_type, "message_sent");
        assert_eq!(events[1].raw.get("self_id"), Some(&json!(1)));
    }

    #[test]
    fn test_event_decode_failure_reports_error() {
        let (d, recorder, _) = dispatcher();
        dispatch(
            &d,
            json!({"post_type": "notice", "notice_type": "group_increase", "time": "later"}),
        )
        .unwrap();
        assert!(recorder.events.lock().is_empty());
        assert_eq!(recorder.errors.lock().len(), 1);
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        let (d, recorder, _) = dispatcher();
        assert!(d.dispatch(b"not json").is_err());
        assert!(d.dispatch(b"[1,2]").is_err());
        assert!(recorder.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_response_routes_to_correlator() {
        let (d, recorder, correlator) = dispatcher();
        let (sink, mut outbound) = crate::testing::fake_sink();
        let session = crate::session::Session::new(crate::session::SessionRole::Api, sink);

        let call = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                correlator
                    .call(&session, "get_group_info", json!({"group_id": 1}))
                    .await
            })
        };
        let text = futures::StreamExt::next(&mut outbound).await.unwrap();
        let echo = serde_json::from_str::<Value>(&text).unwrap()["echo"].clone();

        dispatch(
            &d,
            json!({"status": "ok", "retcode": 0, "data": {"group_name": "dice"}, "echo": echo}),
        )
        .unwrap();
        assert_eq!(call.await.unwrap().unwrap(), json!({"group_name": "dice"}));

        // A duplicate response is dropped silently.
        dispatch(&d, json!({"status": "ok", "echo": echo})).unwrap();
        assert!(recorder.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_response_fails_the_call() {
        let (d, _, correlator) = dispatcher();
        let (sink, mut outbound) = crate::testing::fake_sink();
        let session = crate::session::Session::new(crate::session::SessionRole::Api, sink);

        let call = {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.call(&session, "delete_msg", json!({})).await })
        };
        let text = futures::StreamExt::next(&mut outbound).await.unwrap();
        let echo = serde_json::from_str::<Value>(&text).unwrap()["echo"].clone();

        dispatch(&d, json!({"status": 5, "echo": echo})).unwrap();
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
    }
}
