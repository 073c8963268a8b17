//! Call frames and the minimal envelope every inbound frame is probed with.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dicebot_core::{ApiError, ApiResult};

/// Renders a loosely typed id (`"123"`, `123`, `null`) as a trimmed string.
///
/// Anything that is neither a string nor a number yields an empty string.
pub fn id_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// The fields needed to classify any inbound frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaseFrame {
    #[serde(default)]
    pub post_type: Option<String>,
    #[serde(default)]
    pub echo: Option<Value>,
}

impl BaseFrame {
    /// The correlation token, when this frame answers a call.
    pub fn echo_token(&self) -> Option<String> {
        Some(id_string(self.echo.as_ref())).filter(|echo| !echo.is_empty())
    }

    pub fn post_type(&self) -> &str {
        self.post_type.as_deref().unwrap_or_default()
    }
}

/// An outbound call.
#[derive(Debug, Serialize)]
pub struct ApiRequest<'a> {
    pub action: &'a str,
    pub params: &'a Value,
    pub echo: &'a str,
}

/// A call response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiResponse {
    pub status: String,
    pub retcode: i64,
    pub message: String,
    pub wording: String,
    pub data: Value,
    pub echo: Value,
}

impl ApiResponse {
    /// Converts the response into its payload, or the remote error.
    pub fn into_data(self) -> ApiResult<Value> {
        if self.status == "ok" {
            return Ok(self.data);
        }

        let message = if !self.message.is_empty() {
            self.message
        } else if !self.wording.is_empty() {
            self.wording
        } else {
            format!("retcode={}", self.retcode)
        };
        Err(ApiError::Remote {
            retcode: self.retcode,
            message,
        })
    }
}

/// Data of `send_group_msg` / `send_private_msg` responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SendMsgData {
    pub message_id: Option<Value>,
}

/// Data of `get_group_info` responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GroupInfoData {
    pub group_id: Option<Value>,
    pub group_name: String,
    pub member_count: i64,
    pub max_member_count: u32,
}
