//! Non-message notifications pushed by platform adapters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A normalized out-of-band event (membership changes, friend requests,
/// heartbeats, ...).
///
/// All identifiers are already platform-prefixed. `raw` keeps the complete
/// inbound payload so handlers can read fields this type does not model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterEvent {
    /// Source platform, e.g. "QQ".
    pub platform: String,
    /// Raw `post_type` (`notice`, `request`, `meta_event`, ...).
    pub post_type: String,
    /// Event type, e.g. `group_increase`. Falls back to `post_type`.
    pub event_type: String,
    /// Event sub type, may be empty.
    #[serde(default)]
    pub sub_type: String,
    /// Unix timestamp in seconds.
    pub time: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub guild_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operator_id: String,
    /// The complete inbound payload.
    #[serde(default)]
    pub raw: Map<String, Value>,
}

impl AdapterEvent {
    /// Reads a string field from the raw payload.
    pub fn raw_str(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Value::as_str)
    }
}
