//! OneBot v11 message segments.
//!
//! Outbound segments are strongly typed ([`Segment`]); inbound segments are
//! read leniently ([`RawSegment`]) because implementations disagree on field
//! types. Both convert to and from the engine's [`MessageSegment`].
//!
//! | Domain | Wire | Notes |
//! |--------|------|-------|
//! | `Text` | `text` | |
//! | `Image` | `image` | url, else file url, else file path |
//! | `At` | `at` | `qq` may arrive as a number |
//! | `Reply` | `reply` | inbound `text` becomes the quoted content |
//! | `Record` | `record` | file url, else path |
//! | `Face` | `face` | |
//! | `Poke` | `poke` | |
//! | `File`, `Tts` | - | not sendable |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use dicebot_core::{FileRef, MessageSegment, MessageSegments, extract_qq_user};

// ============================================================================
// Outbound
// ============================================================================

/// A OneBot v11 message segment as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    Image { file: String },
    At { qq: String },
    Reply { id: String },
    Record { file: String },
    Face { id: String },
    Poke { id: String },
}

impl Segment {
    /// Converts a domain segment. Returns `None` for segments OneBot v11
    /// cannot send or that have no usable source.
    pub fn from_domain(segment: &MessageSegment) -> Option<Self> {
        match segment {
            MessageSegment::Text { content } => Some(Self::Text {
                text: content.clone(),
            }),
            MessageSegment::Image { url, file } => {
                let source = if url.is_empty() {
                    file.as_ref().and_then(FileRef::source).unwrap_or_default()
                } else {
                    url.as_str()
                };
                if source.is_empty() {
                    debug!("Skipping image segment with empty source");
                    return None;
                }
                Some(Self::Image {
                    file: source.to_string(),
                })
            }
            MessageSegment::At { target } => Some(Self::At {
                qq: extract_qq_user(target).to_string(),
            }),
            MessageSegment::Reply { id, .. } => Some(Self::Reply { id: id.clone() }),
            MessageSegment::Record { file } => match file.source() {
                Some(source) => Some(Self::Record {
                    file: source.to_string(),
                }),
                None => {
                    debug!("Skipping record segment with empty source");
                    None
                }
            },
            MessageSegment::Face { id } => Some(Self::Face { id: id.clone() }),
            MessageSegment::Poke { target } => Some(Self::Poke {
                id: extract_qq_user(target).to_string(),
            }),
            other => {
                debug!(segment_type = other.segment_type(), "Unsupported segment type");
                None
            }
        }
    }
}

/// Converts domain segments into a wire message, dropping unsendable ones.
pub fn build_message(segments: &[MessageSegment]) -> Vec<Segment> {
    segments.iter().filter_map(Segment::from_domain).collect()
}

// ============================================================================
// Inbound
// ============================================================================

/// A segment as received, with untyped data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSegment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl RawSegment {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// A string, or a number rendered as a string.
    fn id_field(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Converts to a domain segment. Unknown types and segments missing
    /// their key field yield `None`.
    pub fn to_domain(&self) -> Option<MessageSegment> {
        match self.kind.as_str() {
            "text" => self.str_field("text").map(MessageSegment::text),
            "image" => {
                let url = self.str_field("url").filter(|u| !u.is_empty());
                let file = self.str_field("file");
                url.or(file).map(MessageSegment::image)
            }
            "at" => self.id_field("qq").map(MessageSegment::at),
            "face" => self.id_field("id").map(|id| MessageSegment::Face { id }),
            "reply" => {
                let id = self.id_field("id").unwrap_or_default();
                let elements = self
                    .str_field("text")
                    .map(|text| vec![MessageSegment::text(text)])
                    .unwrap_or_default();
                Some(MessageSegment::Reply { id, elements })
            }
            "record" => self.str_field("file").map(|file| MessageSegment::Record {
                file: FileRef::url(file),
            }),
            "poke" => self
                .id_field("id")
                .map(|target| MessageSegment::Poke { target }),
            _ => None,
        }
    }
}

/// Extracts segments from a `message` field: an array of segments or a
/// plain string. Anything else yields an empty list.
pub fn parse_message(message: &Value) -> MessageSegments {
    match message {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| RawSegment::deserialize(item).ok())
            .filter_map(|raw| raw.to_domain())
            .collect(),
        Value::String(text) if !text.is_empty() => MessageSegment::text(text.as_str()).into(),
        _ => MessageSegments::new(),
    }
}
