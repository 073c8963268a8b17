//! Outbound request shapes produced by the command-dispatch core.
//!
//! Target identifiers are loosely typed: the core hands over whatever it has
//! (`"QQ-Group:10001"`, `"10001"` or `10001`) and each adapter normalizes it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, MessageSegment, MessageSegments};

// ============================================================================
// TargetId
// ============================================================================

/// A loosely typed identifier, either a string or a platform-native integer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(Value);

impl TargetId {
    /// Wraps an arbitrary JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns the wrapped value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns the string form if this id is a string.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Returns the integer form if this id is a JSON integer.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.as_i64()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_owned()))
    }
}

impl From<String> for TargetId {
    fn from(value: String) -> Self {
        Self(Value::String(value))
    }
}

impl From<Value> for TargetId {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

macro_rules! impl_target_id_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for TargetId {
                fn from(value: $ty) -> Self {
                    Self(Value::from(value))
                }
            }
        )*
    };
}

impl_target_id_from_int!(i32, i64, u32, u64);

// ============================================================================
// Requests
// ============================================================================

/// Minimal user reference attached to send requests and callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleUserInfo {
    pub user_id: String,
    pub user_name: String,
}

/// Send a message to a group or a person.
#[derive(Debug, Clone, Default)]
pub struct MessageSendRequest {
    /// Optional sending identity, unused by most adapters.
    pub sender: Option<SimpleUserInfo>,
    pub segments: Vec<MessageSegment>,
    pub target_id: TargetId,
}

impl MessageSendRequest {
    /// Creates a request with no explicit sender.
    pub fn new(target_id: impl Into<TargetId>, segments: impl Into<MessageSegments>) -> Self {
        Self {
            sender: None,
            segments: segments.into().into_inner(),
            target_id: target_id.into(),
        }
    }
}

/// Send a local file to a group or a person.
#[derive(Debug, Clone, Default)]
pub struct MessageSendFileRequest {
    pub sender: Option<SimpleUserInfo>,
    pub file_path: String,
    pub target_id: TargetId,
}

/// Edit or recall an existing message.
#[derive(Debug, Clone, Default)]
pub struct MessageOperationRequest {
    pub message_id: TargetId,
    /// Replacement content for edits; ignored by recalls.
    pub segments: Vec<MessageSegment>,
}

/// Mute a group member.
#[derive(Debug, Clone, Default)]
pub struct GroupOperationBanRequest {
    pub group_id: TargetId,
    pub user_id: TargetId,
    /// Mute duration in seconds; `0` lifts the mute.
    pub duration: i64,
}

/// Remove a member from a group.
#[derive(Debug, Clone, Default)]
pub struct GroupOperationKickRequest {
    pub group_id: TargetId,
    pub user_id: TargetId,
}

/// Leave a group.
#[derive(Debug, Clone, Default)]
pub struct GroupOperationQuitRequest {
    pub group_id: TargetId,
}

/// Set a member's group card.
#[derive(Debug, Clone, Default)]
pub struct GroupOperationCardNameSetRequest {
    pub group_id: TargetId,
    pub user_id: TargetId,
    pub name: String,
}

/// Add or remove a friend.
#[derive(Debug, Clone, Default)]
pub struct FriendOperationRequest {
    pub user_id: TargetId,
}

// ============================================================================
// Responses
// ============================================================================

/// Basic group information.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Platform-prefixed group id.
    pub group_id: String,
    pub group_name: String,
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub max_member_count: u32,
}

/// A message observed by the adapter, inbound or echoed after a send.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageSendCallbackInfo {
    pub sender: Option<SimpleUserInfo>,
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_id_conversions() {
        assert_eq!(TargetId::from("QQ:1").as_str(), Some("QQ:1"));
        assert_eq!(TargetId::from(10001_i64).as_i64(), Some(10001));
        assert_eq!(TargetId::from(7_u32).to_string(), "7");
        assert_eq!(TargetId::default().as_value(), &Value::Null);
    }

    #[test]
    fn test_send_request_builder() {
        let req = MessageSendRequest::new("QQ-Group:10001", MessageSegment::text("hi"));
        assert!(req.sender.is_none());
        assert_eq!(req.segments.len(), 1);
        assert_eq!(req.target_id.as_str(), Some("QQ-Group:10001"));
    }
}
