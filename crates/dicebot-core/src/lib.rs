//! # Dicebot Core
//!
//! Domain model and adapter contracts shared by the dicebot engine and its
//! platform adapters.
//!
//! - **Messages**: [`Message`], [`MessageSegment`], [`MessageSegments`]
//! - **Events**: [`AdapterEvent`]
//! - **Requests**: [`MessageSendRequest`] and the group/friend operation requests
//! - **Contracts**: [`AdapterCallback`], [`PlatformAdapter`], [`Adapter`]
//! - **Errors**: [`TransportError`], [`AdapterError`], [`ApiError`]
//!
//! ```text
//! ┌────────────┐  on_message_received   ┌──────────────┐
//! │  Adapter   │───────────────────────▶│ Dispatch core│
//! │ (OneBot11) │◀───────────────────────│  (callback)  │
//! └────────────┘   msg_send_to_group    └──────────────┘
//! ```

pub mod adapter;
pub mod error;
pub mod event;
pub mod ids;
pub mod message;
pub mod request;

pub use adapter::{Adapter, AdapterCallback, BoxedAdapter, PlatformAdapter, SharedCallback};
pub use error::{
    AdapterError, AdapterResult, ApiError, ApiResult, TransportError, TransportResult,
};
pub use event::AdapterEvent;
pub use ids::{PLATFORM_QQ, extract_qq_group, extract_qq_user, format_qq_group, format_qq_user};
pub use message::{FileRef, Message, MessageSegment, MessageSegments, MessageType, SenderInfo};
pub use request::{
    FriendOperationRequest, GroupInfo, GroupOperationBanRequest, GroupOperationCardNameSetRequest,
    GroupOperationKickRequest, GroupOperationQuitRequest, MessageOperationRequest,
    MessageSendCallbackInfo, MessageSendFileRequest, MessageSendRequest, SimpleUserInfo, TargetId,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::adapter::*;
    pub use super::error::*;
    pub use super::event::AdapterEvent;
    pub use super::message::*;
    pub use super::request::*;
}
