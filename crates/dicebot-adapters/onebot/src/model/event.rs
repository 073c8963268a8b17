//! Inbound event frames.
//!
//! Identifier fields are kept as raw JSON values because implementations
//! disagree on whether ids are numbers or strings; [`id_string`] normalizes
//! them. `time` is strict: a non-integer timestamp rejects the frame.
//!
//! [`id_string`]: super::frame::id_string

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accepts a string, a number or `null` for text fields.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// `post_type = "message"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageEnvelope {
    #[serde(deserialize_with = "lenient_string")]
    pub message_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub sub_type: String,
    pub time: Option<i64>,
    #[serde(deserialize_with = "lenient_string")]
    pub raw_message: String,
    /// Segment array or plain string.
    pub message: Value,
    pub message_id: Option<Value>,
    pub group_id: Option<Value>,
    pub guild_id: Option<Value>,
    pub channel_id: Option<Value>,
    pub user_id: Option<Value>,
    pub sender: SenderFrame,
}

/// The `sender` object of a message frame.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SenderFrame {
    pub user_id: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    pub nickname: String,
    #[serde(deserialize_with = "lenient_string")]
    pub card: String,
    #[serde(deserialize_with = "lenient_string")]
    pub role: String,
}

/// `post_type = "notice"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NoticeFrame {
    #[serde(deserialize_with = "lenient_string")]
    pub notice_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub sub_type: String,
    pub time: Option<i64>,
    pub group_id: Option<Value>,
    pub guild_id: Option<Value>,
    pub channel_id: Option<Value>,
    pub user_id: Option<Value>,
    pub operator_id: Option<Value>,
    pub target_id: Option<Value>,
}

/// `post_type = "request"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestFrame {
    #[serde(deserialize_with = "lenient_string")]
    pub request_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub sub_type: String,
    pub time: Option<i64>,
    pub group_id: Option<Value>,
    pub guild_id: Option<Value>,
    pub channel_id: Option<Value>,
    pub user_id: Option<Value>,
    pub operator_id: Option<Value>,
    pub invitor_id: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    pub flag: String,
    #[serde(deserialize_with = "lenient_string")]
    pub comment: String,
}

/// `post_type = "meta_event"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetaFrame {
    #[serde(deserialize_with = "lenient_string")]
    pub meta_event_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub sub_type: String,
    pub time: Option<i64>,
}
