//! 存储适配器契约
//!
//! 存储只保证单条记录的原子性；调用方不能假设写入后立即读回是原子的。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RepositoryError;
use crate::group::Group;
use crate::message::{GroupMessage, PrivateMessage};
use crate::reaction::{Reaction, TargetKind};
use crate::user::UserProfile;
use crate::value_objects::{ConversationKey, Emoji, GroupId, MessageId, ReactionId, UserId};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 分页参数，页码从 1 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 100;

    /// 规范化分页参数：页码至少为 1，条数落在 [1, MAX_LIMIT]
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn first() -> Self {
        Self::new(None, None)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn is_first_page(&self) -> bool {
        self.page == 1
    }

    pub fn has_more(&self, total_count: u64) -> bool {
        total_count > self.offset() + u64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::first()
    }
}

/// 一页消息，页内按创建时间从旧到新排列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            total_count: self.total_count,
        }
    }
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert_private(&self, message: &PrivateMessage) -> RepositoryResult<()>;
    async fn insert_group(&self, message: &GroupMessage) -> RepositoryResult<()>;
    async fn find_private(&self, id: MessageId) -> RepositoryResult<Option<PrivateMessage>>;
    async fn find_group(&self, id: MessageId) -> RepositoryResult<Option<GroupMessage>>;

    /// 按创建时间倒序取一页，再反转为页内从旧到新
    async fn page_conversation(
        &self,
        key: &ConversationKey,
        pagination: Pagination,
    ) -> RepositoryResult<Page<PrivateMessage>>;
    async fn page_group(
        &self,
        group_id: GroupId,
        pagination: Pagination,
    ) -> RepositoryResult<Page<GroupMessage>>;

    async fn count_conversation(&self, key: &ConversationKey) -> RepositoryResult<u64>;
    async fn count_group(&self, group_id: GroupId) -> RepositoryResult<u64>;

    /// 与该用户有过私聊往来的所有用户
    async fn chat_partner_ids(&self, user_id: UserId) -> RepositoryResult<Vec<UserId>>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create(&self, group: &Group) -> RepositoryResult<()>;
    async fn find_by_id(&self, id: GroupId) -> RepositoryResult<Option<Group>>;
    /// 整体保存。`group.version` 必须等于存储中的版本，否则返回 `RepositoryError::Conflict`；
    /// 成功后存储中的版本加一
    async fn save(&self, group: &Group) -> RepositoryResult<()>;
    /// 包含该用户的活跃群组
    async fn list_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Group>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<UserProfile>>;
    async fn find_many(&self, ids: &[UserId]) -> RepositoryResult<Vec<UserProfile>>;
    /// 除自己以外的所有用户
    async fn list_contacts(&self, user_id: UserId) -> RepositoryResult<Vec<UserProfile>>;
    /// 账号系统同步展示身份时写入或覆盖
    async fn upsert(&self, profile: &UserProfile) -> RepositoryResult<()>;
}

#[async_trait]
pub trait ReactionRepository: Send + Sync {
    /// 三元组重复时返回 `RepositoryError::Conflict`
    async fn insert(&self, reaction: &Reaction) -> RepositoryResult<()>;
    async fn find_by_id(&self, id: ReactionId) -> RepositoryResult<Option<Reaction>>;
    async fn find_by_triple(
        &self,
        actor_id: UserId,
        target_message_id: MessageId,
        emoji: &Emoji,
    ) -> RepositoryResult<Option<Reaction>>;
    /// 删除成功返回 true
    async fn delete(&self, id: ReactionId) -> RepositoryResult<bool>;
    async fn list_for_target(
        &self,
        target_message_id: MessageId,
        target_kind: TargetKind,
    ) -> RepositoryResult<Vec<Reaction>>;
    async fn list_for_targets(
        &self,
        target_message_ids: &[MessageId],
        target_kind: TargetKind,
    ) -> RepositoryResult<Vec<Reaction>>;
}

/// 存储可用性检查，供健康检查接口使用
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn check(&self) -> RepositoryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_normalizes_bounds() {
        let pagination = Pagination::new(Some(0), Some(500));
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.limit, Pagination::MAX_LIMIT);
        assert_eq!(Pagination::new(None, Some(0)).limit, 1);
        assert_eq!(Pagination::default().limit, Pagination::DEFAULT_LIMIT);
    }

    #[test]
    fn has_more_compares_against_window_end() {
        let second = Pagination::new(Some(2), Some(10));
        assert_eq!(second.offset(), 10);
        assert!(second.has_more(21));
        assert!(!second.has_more(20));
    }
}
