//! 群组成员解析
//!
//! 每次都直接读取存储中的群组，不经过缓存；客户端声明的成员列表一律不信任。

use std::collections::BTreeSet;
use std::sync::Arc;

use domain::{DomainError, Group, GroupId, GroupRepository, UserId};

use crate::error::ApplicationError;

#[derive(Clone)]
pub struct MembershipResolver {
    groups: Arc<dyn GroupRepository>,
}

impl MembershipResolver {
    pub fn new(groups: Arc<dyn GroupRepository>) -> Self {
        Self { groups }
    }

    pub async fn is_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<bool, ApplicationError> {
        Ok(self.authorized_members(group_id).await?.contains(&user_id))
    }

    /// 群组不存在或已停用时返回空集
    pub async fn authorized_members(
        &self,
        group_id: GroupId,
    ) -> Result<BTreeSet<UserId>, ApplicationError> {
        Ok(self
            .groups
            .find_by_id(group_id)
            .await?
            .map(|group| group.authorized_members())
            .unwrap_or_default())
    }

    pub async fn authorized_members_excluding(
        &self,
        group_id: GroupId,
        actor: UserId,
    ) -> Result<BTreeSet<UserId>, ApplicationError> {
        let mut members = self.authorized_members(group_id).await?;
        members.remove(&actor);
        Ok(members)
    }

    /// 要求用户是活跃群组的当前成员。
    /// 非成员统一返回 `NotGroupMember`，不泄露群组是否存在。
    pub async fn require_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Group, ApplicationError> {
        match self.groups.find_by_id(group_id).await? {
            Some(group) if group.is_member(user_id) => {
                group.ensure_active()?;
                Ok(group)
            }
            _ => Err(DomainError::NotGroupMember.into()),
        }
    }
}
