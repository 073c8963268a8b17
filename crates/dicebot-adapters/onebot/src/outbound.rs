//! Outbound helpers: id normalization and the echo of sent messages.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use dicebot_core::{
    ApiError, ApiResult, Message, MessageSegment, MessageSegments, MessageSendCallbackInfo,
    MessageType, PLATFORM_QQ, SimpleUserInfo, TargetId, extract_qq_group, extract_qq_user,
};

/// What an identifier refers to, deciding which prefix is stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// `QQ:<n>`
    User,
    /// `QQ-Group:<n>`
    Group,
    /// Bare numeric message id.
    Message,
}

impl IdKind {
    fn strip(self, id: &str) -> &str {
        match self {
            Self::User => extract_qq_user(id),
            Self::Group => extract_qq_group(id),
            Self::Message => id,
        }
    }
}

/// Turns a caller-supplied id into the numeric id OneBot expects.
pub fn normalize_id(id: &TargetId, kind: IdKind) -> ApiResult<i64> {
    match id.as_value() {
        Value::String(s) => {
            let stripped = kind.strip(s.trim()).trim();
            if stripped.is_empty() {
                return Err(ApiError::InvalidId("empty id".into()));
            }
            stripped
                .parse()
                .map_err(|_| ApiError::InvalidId(s.clone()))
        }
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| ApiError::InvalidId(n.to_string())),
        other => Err(ApiError::InvalidId(other.to_string())),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Builds the callback reporting a message the bot just sent.
///
/// `target` is the prefixed group id for group sends and the prefixed user
/// id for private sends.
pub fn echo_message(
    segments: &[MessageSegment],
    sender: Option<SimpleUserInfo>,
    message_type: MessageType,
    target: String,
    raw_id: Option<String>,
) -> MessageSendCallbackInfo {
    let segments = MessageSegments::from(segments.to_vec());
    let mut message = Message {
        platform: PLATFORM_QQ.to_string(),
        time: unix_now(),
        message_type: message_type.clone(),
        message: segments.to_text(),
        segments,
        raw_id: raw_id.filter(|id| !id.is_empty()),
        ..Default::default()
    };

    if let Some(sender) = &sender {
        message.sender.user_id = sender.user_id.clone();
        message.sender.nickname = sender.user_name.clone();
    }

    match message_type {
        MessageType::Group => message.group_id = target,
        MessageType::Private => {
            if message.sender.nickname.is_empty() {
                message.sender.nickname = target.clone();
            }
            message.sender.user_id = target;
        }
        MessageType::Guild => {}
    }

    MessageSendCallbackInfo { sender, message }
}
