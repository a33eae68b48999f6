//! 应用层实现。
//!
//! 围绕领域模型的用例服务：消息发送与历史查询、表情回应聚合、群组管理和实时会话，
//! 以及对外部适配器（缓存、附件上传、在线状态）的抽象。

pub mod attachments;
pub mod cache;
pub mod clock;
pub mod connection;
pub mod dispatch;
pub mod dto;
pub mod error;
pub mod events;
pub mod membership;
pub mod memory;
pub mod presence;
pub mod rooms;
pub mod services;

pub use attachments::{
    AttachmentSource, AttachmentUploader, PreparedAttachment, UploadError, UploadRequest,
    UploadsDisabled,
};
pub use cache::{CacheError, CacheKey, CacheSettings, CacheStore, MessageCache, Snapshot};
pub use clock::{Clock, SystemClock};
pub use connection::{ConnectionHandle, DeliveryError};
pub use dispatch::{DispatchEngine, DispatchReport};
pub use dto::{
    BulkReactions, GroupMessageView, GroupView, MessagePage, PrivateMessageView, ReactionGroups,
    ReactionView,
};
pub use error::{ApplicationError, ApplicationResult};
pub use events::{ClientEvent, ServerEvent};
pub use membership::MembershipResolver;
pub use presence::PresenceRegistry;
pub use rooms::RoomRegistry;
pub use services::{
    AddReactionRequest, CreateGroupRequest, FetchMessagesRequest, GroupService,
    GroupServiceDependencies, MemberChangeRequest, MessageScope, MessageService,
    MessageServiceDependencies, MessagesPage, ReactionSelector, ReactionService,
    ReactionServiceDependencies, RemoveReactionRequest, SendGroupMessageRequest,
    SendPrivateMessageRequest, SessionService, SessionServiceDependencies,
};
