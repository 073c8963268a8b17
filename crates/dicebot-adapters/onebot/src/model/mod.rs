//! OneBot v11 wire types.

pub mod event;
pub mod frame;
pub mod segment;

pub use event::{MessageEnvelope, MetaFrame, NoticeFrame, RequestFrame, SenderFrame};
pub use frame::{ApiRequest, ApiResponse, BaseFrame, GroupInfoData, SendMsgData, id_string};
pub use segment::{RawSegment, Segment, build_message, parse_message};
