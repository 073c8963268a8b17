//! Adapter contracts.
//!
//! Three traits meet at the adapter boundary:
//!
//! - [`AdapterCallback`]: implemented by the dispatch core, invoked by
//!   adapters for every inbound message, event and background error.
//! - [`PlatformAdapter`]: implemented by adapters, the outbound operations the
//!   dispatch core may request.
//! - [`Adapter`]: lifecycle hooks used by the runtime to start and stop an
//!   adapter.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Printer;
//!
//! impl AdapterCallback for Printer {
//!     fn on_error(&self, err: &AdapterError) {
//!         eprintln!("adapter error: {err}");
//!     }
//!     fn on_message_received(&self, info: MessageSendCallbackInfo) {
//!         println!("{}: {}", info.message.sender.nickname, info.message.message);
//!     }
//!     fn on_event(&self, event: AdapterEvent) {
//!         println!("event {}", event.event_type);
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{AdapterError, AdapterResult, ApiResult};
use crate::event::AdapterEvent;
use crate::request::{
    FriendOperationRequest, GroupInfo, GroupOperationBanRequest, GroupOperationCardNameSetRequest,
    GroupOperationKickRequest, GroupOperationQuitRequest, MessageOperationRequest,
    MessageSendCallbackInfo, MessageSendFileRequest, MessageSendRequest, TargetId,
};

/// Receiver for everything an adapter observes.
///
/// Methods may be called concurrently from any worker task and must not block.
pub trait AdapterCallback: Send + Sync {
    /// A background failure that could not be returned to a caller.
    fn on_error(&self, err: &AdapterError);

    /// An inbound chat message, or the echo of a message the bot just sent.
    fn on_message_received(&self, info: MessageSendCallbackInfo);

    /// A non-message notification.
    fn on_event(&self, event: AdapterEvent);
}

/// A shared callback handle.
pub type SharedCallback = Arc<dyn AdapterCallback>;

/// Outbound operations offered to the dispatch core.
///
/// Operations a platform cannot express return
/// [`ApiError::NotSupported`](crate::error::ApiError::NotSupported).
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Whether at least one session is currently connected.
    fn is_alive(&self) -> bool;

    /// Replaces the callback receiving inbound traffic.
    fn set_callback(&self, callback: SharedCallback);

    async fn msg_send_to_group(&self, request: MessageSendRequest) -> ApiResult<bool>;

    async fn msg_send_to_person(&self, request: MessageSendRequest) -> ApiResult<bool>;

    async fn msg_send_file_to_group(&self, request: MessageSendFileRequest) -> ApiResult<bool>;

    async fn msg_send_file_to_person(&self, request: MessageSendFileRequest) -> ApiResult<bool>;

    async fn msg_edit(&self, request: MessageOperationRequest) -> ApiResult<bool>;

    async fn msg_recall(&self, request: MessageOperationRequest) -> ApiResult<bool>;

    async fn group_member_ban(&self, request: GroupOperationBanRequest) -> ApiResult<bool>;

    async fn group_member_kick(&self, request: GroupOperationKickRequest) -> ApiResult<bool>;

    async fn group_quit(&self, request: GroupOperationQuitRequest) -> ApiResult<bool>;

    async fn group_card_name_set(
        &self,
        request: GroupOperationCardNameSetRequest,
    ) -> ApiResult<bool>;

    async fn group_info_get(&self, group_id: TargetId) -> ApiResult<GroupInfo>;

    async fn friend_delete(&self, request: FriendOperationRequest) -> ApiResult<bool>;

    async fn friend_add(&self, request: FriendOperationRequest) -> ApiResult<bool>;
}

/// Lifecycle hooks driven by the runtime.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapter name, also the key of its configuration section.
    fn name(&self) -> &'static str;

    /// Starts background work and returns once it is running.
    ///
    /// Background tasks stop when `shutdown` is cancelled or [`close`](Self::close)
    /// is called.
    async fn serve(&self, shutdown: &CancellationToken) -> AdapterResult<()>;

    /// Stops all background work and releases connections.
    async fn close(&self) -> AdapterResult<()>;
}

/// A shared adapter handle.
pub type BoxedAdapter = Arc<dyn Adapter>;
