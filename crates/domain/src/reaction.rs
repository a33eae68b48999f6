use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{Emoji, MessageId, ReactionId, Timestamp, UserId};

/// 表情回应指向的消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Private,
    Group,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "private" => Ok(Self::Private),
            "group" => Ok(Self::Group),
            _ => Err(DomainError::invalid_argument(
                "target_kind",
                "invalid message type",
            )),
        }
    }
}

/// 表情回应。(actor, target, emoji) 三元组唯一，只会被创建和删除，不会原地修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: ReactionId,
    pub actor_id: UserId,
    pub target_message_id: MessageId,
    pub target_kind: TargetKind,
    pub emoji: Emoji,
    pub created_at: Timestamp,
}

impl Reaction {
    pub fn new(
        id: ReactionId,
        actor_id: UserId,
        target_message_id: MessageId,
        target_kind: TargetKind,
        emoji: Emoji,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            actor_id,
            target_message_id,
            target_kind,
            emoji,
            created_at,
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.actor_id == user_id
    }
}
