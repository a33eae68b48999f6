use std::sync::Arc;

use domain::{DomainError, Group, GroupId, GroupRepository, RepositoryError, UserId, UserRepository};

use crate::{
    cache::{CacheKey, MessageCache},
    clock::Clock,
    dto::GroupView,
    error::ApplicationError,
    rooms::{room_name, RoomRegistry},
};

use super::group_views;

/// 版本冲突后重新读取群组的最大次数
const MAX_SAVE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct CreateGroupRequest {
    pub creator_id: UserId,
    pub name: String,
    pub member_ids: Vec<UserId>,
}

/// 成员变更：`operator_id` 来自认证信息，`target_user_id` 是被操作的用户
#[derive(Debug, Clone, Copy)]
pub struct MemberChangeRequest {
    pub group_id: GroupId,
    pub operator_id: UserId,
    pub target_user_id: UserId,
}

pub struct GroupServiceDependencies {
    pub group_repository: Arc<dyn GroupRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub rooms: Arc<RoomRegistry>,
    pub cache: MessageCache,
    pub clock: Arc<dyn Clock>,
}

/// 群组管理。每次成员变化都会使群组缓存失效，并把被移除的用户踢出实时房间。
pub struct GroupService {
    deps: GroupServiceDependencies,
}

impl GroupService {
    pub fn new(deps: GroupServiceDependencies) -> Self {
        Self { deps }
    }

    async fn load(&self, group_id: GroupId) -> Result<Group, ApplicationError> {
        self.deps
            .group_repository
            .find_by_id(group_id)
            .await?
            .ok_or_else(|| DomainError::GroupNotFound.into())
    }

    /// 读取、修改、按版本保存；版本冲突时基于最新状态重做修改
    async fn modify<F>(&self, group_id: GroupId, mut change: F) -> Result<Group, ApplicationError>
    where
        F: FnMut(&mut Group) -> Result<(), ApplicationError> + Send,
    {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let mut group = self.load(group_id).await?;
            change(&mut group)?;
            match self.deps.group_repository.save(&group).await {
                Ok(()) => {
                    group.version += 1;
                    return Ok(group);
                }
                Err(RepositoryError::Conflict) => {
                    tracing::debug!(group_id = %group_id, attempt, "群组并发修改，重试");
                }
                Err(err) => return Err(ApplicationError::Repository(err)),
            }
        }
        tracing::warn!(group_id = %group_id, "群组修改多次冲突，放弃");
        Err(ApplicationError::Repository(RepositoryError::Conflict))
    }

    async fn ensure_user_exists(&self, user_id: UserId) -> Result<(), ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        Ok(())
    }

    async fn view(&self, group: Group) -> Result<GroupView, ApplicationError> {
        group_views(self.deps.user_repository.as_ref(), vec![group])
            .await?
            .pop()
            .ok_or_else(|| DomainError::GroupNotFound.into())
    }

    async fn invalidate(&self, group_id: GroupId, users: impl IntoIterator<Item = UserId>) {
        self.deps.cache.invalidate_group(group_id).await;
        for user_id in users {
            self.deps
                .cache
                .delete(&CacheKey::user_groups(user_id))
                .await;
        }
    }

    pub async fn create_group(
        &self,
        request: CreateGroupRequest,
    ) -> Result<GroupView, ApplicationError> {
        let mut member_ids = request.member_ids;
        member_ids.sort();
        member_ids.dedup();
        member_ids.retain(|id| *id != request.creator_id);
        if !member_ids.is_empty() {
            let found = self.deps.user_repository.find_many(&member_ids).await?;
            if found.len() != member_ids.len() {
                return Err(DomainError::UserNotFound.into());
            }
        }

        let group = Group::create(
            GroupId::generate(),
            request.name,
            request.creator_id,
            member_ids,
            self.deps.clock.now(),
        )?;
        self.deps.group_repository.create(&group).await?;

        tracing::info!(
            group_id = %group.id,
            admin_id = %group.admin_id,
            members = group.members.len(),
            "创建群组"
        );
        self.invalidate(group.id, group.members.iter().map(|member| member.user_id).collect::<Vec<_>>())
            .await;
        self.view(group).await
    }

    pub async fn get_group(
        &self,
        group_id: GroupId,
        viewer: UserId,
    ) -> Result<GroupView, ApplicationError> {
        match self.deps.group_repository.find_by_id(group_id).await? {
            Some(group) if group.is_member(viewer) => self.view(group).await,
            _ => Err(DomainError::GroupNotFound.into()),
        }
    }

    pub async fn add_member(
        &self,
        request: MemberChangeRequest,
    ) -> Result<GroupView, ApplicationError> {
        let (operator_id, target_user_id) = (request.operator_id, request.target_user_id);
        self.ensure_user_exists(request.target_user_id).await?;
        let group = self
            .modify(request.group_id, |group| {
                ensure_admin(group, operator_id)?;
                group.add_member(target_user_id, self.deps.clock.now())?;
                Ok(())
            })
            .await?;

        tracing::info!(
            group_id = %group.id,
            user_id = %request.target_user_id,
            "添加群成员"
        );
        self.invalidate(group.id, [request.target_user_id]).await;
        self.view(group).await
    }

    pub async fn remove_member(
        &self,
        request: MemberChangeRequest,
    ) -> Result<GroupView, ApplicationError> {
        let (operator_id, target_user_id) = (request.operator_id, request.target_user_id);
        let group = self
            .modify(request.group_id, |group| {
                ensure_admin(group, operator_id)?;
                group.remove_member(target_user_id, self.deps.clock.now())?;
                Ok(())
            })
            .await?;

        self.after_departure(group.id, request.target_user_id).await;
        tracing::info!(
            group_id = %group.id,
            user_id = %request.target_user_id,
            "移除群成员"
        );
        self.view(group).await
    }

    /// 管理员不能直接离开，需先转让管理员身份
    pub async fn leave_group(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<(), ApplicationError> {
        self.modify(group_id, |group| {
            if !group.is_member(user_id) {
                return Err(DomainError::NotGroupMember.into());
            }
            group.remove_member(user_id, self.deps.clock.now())?;
            Ok(())
        })
        .await
        .map_err(|err| match err {
            ApplicationError::Domain(DomainError::GroupNotFound) => {
                DomainError::NotGroupMember.into()
            }
            other => other,
        })?;

        self.after_departure(group_id, user_id).await;
        tracing::info!(group_id = %group_id, user_id = %user_id, "成员退出群组");
        Ok(())
    }

    pub async fn transfer_admin(
        &self,
        request: MemberChangeRequest,
    ) -> Result<GroupView, ApplicationError> {
        let (operator_id, target_user_id) = (request.operator_id, request.target_user_id);
        let group = self
            .modify(request.group_id, |group| {
                ensure_admin(group, operator_id)?;
                group.transfer_admin(target_user_id, self.deps.clock.now())?;
                Ok(())
            })
            .await?;

        tracing::info!(
            group_id = %group.id,
            new_admin_id = %request.target_user_id,
            "转让群管理员"
        );
        self.invalidate(group.id, std::iter::empty()).await;
        self.view(group).await
    }

    pub async fn deactivate_group(
        &self,
        group_id: GroupId,
        operator_id: UserId,
    ) -> Result<(), ApplicationError> {
        let group = self
            .modify(group_id, |group| {
                ensure_admin(group, operator_id)?;
                group.deactivate(self.deps.clock.now());
                Ok(())
            })
            .await?;

        let evicted = self.deps.rooms.clear(group_id);
        self.invalidate(group_id, group.members.iter().map(|member| member.user_id).collect::<Vec<_>>())
            .await;
        tracing::info!(
            group_id = %group_id,
            room = %room_name(group_id),
            evicted,
            "群组已停用"
        );
        Ok(())
    }

    /// 用户所在的活跃群组
    pub async fn list_user_groups(
        &self,
        user_id: UserId,
    ) -> Result<Vec<GroupView>, ApplicationError> {
        let cache_key = CacheKey::user_groups(user_id);
        if let Some(groups) = self.deps.cache.get_json(&cache_key).await {
            return Ok(groups);
        }

        let groups = self.deps.group_repository.list_for_user(user_id).await?;
        let views = group_views(self.deps.user_repository.as_ref(), groups).await?;
        self.deps
            .cache
            .put_json(&cache_key, &views, self.deps.cache.settings().short_ttl)
            .await;
        Ok(views)
    }

    async fn after_departure(&self, group_id: GroupId, user_id: UserId) {
        let evicted = self.deps.rooms.evict_user(group_id, user_id);
        self.invalidate(group_id, [user_id]).await;
        tracing::debug!(
            group_id = %group_id,
            user_id = %user_id,
            evicted,
            "已将离开的成员移出房间"
        );
    }
}

fn ensure_admin(group: &Group, operator_id: UserId) -> Result<(), ApplicationError> {
    if group.is_admin(operator_id) {
        Ok(())
    } else {
        Err(DomainError::OperationNotAllowed.into())
    }
}
