//! Message types shared between adapters and the dispatch core.
//!
//! # Architecture
//!
//! - [`MessageSegment`]: a single unit of content (text, image, mention, ...)
//! - [`MessageSegments`]: an ordered list of segments
//! - [`Message`]: a received (or echoed) chat message with its routing info
//!
//! Adapters translate their wire segments into [`MessageSegment`] on the way
//! in and back on the way out. Segment kinds a platform cannot express are
//! dropped by that adapter, never by the core.

use std::fmt::{self, Display};
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

// ============================================================================
// File reference
// ============================================================================

/// A reference to binary content, either remote or local.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileRef {
    /// Remote location, if known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Local path or platform file token.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
}

impl FileRef {
    /// Creates a reference to a remote resource.
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Creates a reference to a local path.
    pub fn path(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }

    /// Returns the URL if set, otherwise the file path; `None` when both are empty.
    pub fn source(&self) -> Option<&str> {
        if !self.url.is_empty() {
            Some(&self.url)
        } else if !self.file.is_empty() {
            Some(&self.file)
        } else {
            None
        }
    }
}

// ============================================================================
// Message Segment
// ============================================================================

/// A single unit of message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageSegment {
    /// Plain text.
    Text {
        /// Text content.
        content: String,
    },
    /// An image. `url` wins over `file` when both are present.
    Image {
        /// Direct image URL.
        #[serde(default)]
        url: String,
        /// Fallback file reference.
        #[serde(default)]
        file: Option<FileRef>,
    },
    /// A mention of a user (or `all`).
    At {
        /// Mentioned user, raw platform id.
        target: String,
    },
    /// A quote of an earlier message.
    Reply {
        /// Raw platform id of the quoted message.
        id: String,
        /// Quoted content, if the platform supplied it.
        #[serde(default)]
        elements: Vec<MessageSegment>,
    },
    /// A voice clip.
    Record {
        /// Audio source.
        file: FileRef,
    },
    /// A platform emoji.
    Face {
        /// Platform face id.
        id: String,
    },
    /// A poke / nudge.
    Poke {
        /// Poked user, raw platform id.
        target: String,
    },
    /// An attached file.
    File(FileRef),
    /// Text to be spoken by the platform.
    Tts {
        /// Text content.
        content: String,
    },
}

impl MessageSegment {
    /// Creates a text segment.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Creates an image segment from a URL.
    pub fn image(url: impl Into<String>) -> Self {
        Self::Image {
            url: url.into(),
            file: None,
        }
    }

    /// Creates a mention segment.
    pub fn at(target: impl Into<String>) -> Self {
        Self::At {
            target: target.into(),
        }
    }

    /// Returns the type identifier of this segment (e.g. "text", "image").
    pub fn segment_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::At { .. } => "at",
            Self::Reply { .. } => "reply",
            Self::Record { .. } => "record",
            Self::Face { .. } => "face",
            Self::Poke { .. } => "poke",
            Self::File(_) => "file",
            Self::Tts { .. } => "tts",
        }
    }

    /// Returns the text content if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            _ => None,
        }
    }
}

impl Display for MessageSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { content } => write!(f, "{content}"),
            Self::Image { url, file } => {
                let source = if url.is_empty() {
                    file.as_ref().and_then(FileRef::source).unwrap_or_default()
                } else {
                    url
                };
                write!(f, "[Image: {source}]")
            }
            Self::At { target } => write!(f, "@{target}"),
            Self::Reply { id, .. } => write!(f, "[Reply: {id}]"),
            Self::Record { file } => write!(f, "[Record: {}]", file.source().unwrap_or_default()),
            Self::Face { id } => write!(f, "[Face: {id}]"),
            Self::Poke { target } => write!(f, "[Poke: {target}]"),
            Self::File(file) => write!(f, "[File: {}]", file.source().unwrap_or_default()),
            Self::Tts { content } => write!(f, "[TTS: {content}]"),
        }
    }
}

// ============================================================================
// Message Segments
// ============================================================================

/// An ordered list of [`MessageSegment`]s.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageSegments(Vec<MessageSegment>);

impl MessageSegments {
    /// Creates an empty list.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Concatenates the content of all text segments.
    pub fn to_text(&self) -> String {
        self.iter().filter_map(MessageSegment::as_text).collect()
    }

    /// Consumes the list and adds a segment (builder pattern).
    pub fn with(mut self, segment: MessageSegment) -> Self {
        self.0.push(segment);
        self
    }

    /// Adds a segment to the end of the list.
    pub fn push(&mut self, segment: MessageSegment) {
        self.0.push(segment);
    }

    /// Consumes the list and returns the inner vector.
    pub fn into_inner(self) -> Vec<MessageSegment> {
        self.0
    }
}

impl Deref for MessageSegments {
    type Target = [MessageSegment];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MessageSegments {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Display for MessageSegments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<Vec<MessageSegment>> for MessageSegments {
    fn from(segments: Vec<MessageSegment>) -> Self {
        Self(segments)
    }
}

impl From<MessageSegment> for MessageSegments {
    fn from(segment: MessageSegment) -> Self {
        Self(vec![segment])
    }
}

impl FromIterator<MessageSegment> for MessageSegments {
    fn from_iter<T: IntoIterator<Item = MessageSegment>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a MessageSegments {
    type Item = &'a MessageSegment;
    type IntoIter = std::slice::Iter<'a, MessageSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Message
// ============================================================================

/// Where a message was sent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// A group chat.
    Group,
    /// A one-to-one chat.
    #[default]
    Private,
    /// A guild channel.
    Guild,
}

impl MessageType {
    /// Returns the wire name ("group", "private", "guild").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Private => "private",
            Self::Guild => "guild",
        }
    }

    /// Parses a wire name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "group" => Some(Self::Group),
            "private" => Some(Self::Private),
            "guild" => Some(Self::Guild),
            _ => None,
        }
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    /// Platform-prefixed user id.
    pub user_id: String,
    /// Display name (group card if set).
    pub nickname: String,
    /// Group role ("owner", "admin", "member"), when known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_role: String,
}

/// A normalized chat message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Source platform (e.g. "QQ").
    pub platform: String,
    /// Unix timestamp in seconds.
    pub time: i64,
    /// Group, private or guild.
    pub message_type: MessageType,
    /// Platform-prefixed group id for group messages.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_id: String,
    /// Guild id for guild messages.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub guild_id: String,
    /// Channel id for guild messages.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel_id: String,
    /// Sender.
    pub sender: SenderInfo,
    /// Plain-text rendering of `segments`.
    pub message: String,
    /// Typed content.
    pub segments: MessageSegments,
    /// Raw platform message id, used for recalls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,
}
