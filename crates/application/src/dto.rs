//! 返回给客户端、并作为投递事件负载的视图对象

use std::collections::BTreeMap;

use domain::{
    Attachment, ConversationKey, GroupId, GroupMessage, MessageId, MessageKind, PrivateMessage,
    Reaction, ReactionId, TargetKind, Timestamp, UserId, UserProfile,
};
use serde::{Deserialize, Serialize};

/// 私聊消息，发送者与接收者展开为展示身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessageView {
    pub id: MessageId,
    pub sender: UserProfile,
    pub receiver: UserProfile,
    pub text: Option<String>,
    pub attachment_url: Option<String>,
    pub conversation_key: ConversationKey,
    pub created_at: Timestamp,
}

impl PrivateMessageView {
    pub fn new(message: PrivateMessage, sender: UserProfile, receiver: UserProfile) -> Self {
        Self {
            id: message.id,
            sender,
            receiver,
            text: message.text.map(|text| text.as_str().to_owned()),
            attachment_url: message.attachment_url,
            conversation_key: message.conversation_key,
            created_at: message.created_at,
        }
    }
}

/// 群聊消息。`client_message_id` 只在发送响应与投递事件中出现，历史记录中恒为空。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessageView {
    pub id: MessageId,
    pub group_id: GroupId,
    pub sender: UserProfile,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub message_kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    pub created_at: Timestamp,
}

impl GroupMessageView {
    pub fn new(message: GroupMessage, sender: UserProfile) -> Self {
        Self {
            id: message.id,
            group_id: message.group_id,
            sender,
            text: message.text.map(|text| text.as_str().to_owned()),
            attachment: message.attachment,
            message_kind: message.message_kind,
            client_message_id: None,
            created_at: message.created_at,
        }
    }

    pub fn with_client_message_id(mut self, client_message_id: Option<String>) -> Self {
        self.client_message_id = client_message_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionView {
    pub id: ReactionId,
    pub actor: UserProfile,
    pub target_message_id: MessageId,
    pub target_kind: TargetKind,
    pub emoji: String,
    pub created_at: Timestamp,
}

impl ReactionView {
    pub fn new(reaction: Reaction, actor: UserProfile) -> Self {
        Self {
            id: reaction.id,
            actor,
            target_message_id: reaction.target_message_id,
            target_kind: reaction.target_kind,
            emoji: reaction.emoji.as_str().to_owned(),
            created_at: reaction.created_at,
        }
    }
}

/// 表情 → 按回应时间排序的回应者
pub type ReactionGroups = BTreeMap<String, Vec<UserProfile>>;

/// 消息 ID → 该消息的表情分组
pub type BulkReactions = BTreeMap<MessageId, ReactionGroups>;

/// 一页历史消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage<T> {
    pub messages: Vec<T>,
    pub has_more: bool,
    pub total_count: u64,
}

/// 成员变化后的群组视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: GroupId,
    pub name: String,
    pub admin: UserProfile,
    pub members: Vec<UserProfile>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// 用于按 ID 保序装配展示身份；存储中缺失的用户退化为只有 ID 的身份
pub(crate) fn profile_or_placeholder(
    profiles: &BTreeMap<UserId, UserProfile>,
    id: UserId,
) -> UserProfile {
    profiles
        .get(&id)
        .cloned()
        .unwrap_or_else(|| UserProfile::new(id, String::new(), None))
}
