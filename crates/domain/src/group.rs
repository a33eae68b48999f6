//! 群组实体
//!
//! 群组持有有序的成员列表，管理员必须始终是成员之一。停用的群组对分发而言没有任何授权成员。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{GroupId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub user_id: UserId,
    pub joined_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub admin_id: UserId,
    pub members: Vec<GroupMember>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// 乐观并发版本：存储只接受版本与当前一致的保存，并在保存时加一
    #[serde(default)]
    pub version: u64,
}

impl Group {
    pub const MAX_NAME_CHARS: usize = 100;

    /// 创建群组，创建者成为管理员和第一个成员
    pub fn create(
        id: GroupId,
        name: impl Into<String>,
        admin_id: UserId,
        initial_members: impl IntoIterator<Item = UserId>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(DomainError::invalid_argument("name", "cannot be empty"));
        }
        if name.chars().count() > Self::MAX_NAME_CHARS {
            return Err(DomainError::invalid_argument("name", "too long"));
        }

        let mut group = Self {
            id,
            name,
            admin_id,
            members: vec![GroupMember {
                user_id: admin_id,
                joined_at: now,
            }],
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        for user_id in initial_members {
            if !group.is_member(user_id) {
                group.members.push(GroupMember {
                    user_id,
                    joined_at: now,
                });
            }
        }
        Ok(group)
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.iter().any(|member| member.user_id == user_id)
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_id == user_id
    }

    /// 当前可接收分发的成员集合；停用的群组返回空集
    pub fn authorized_members(&self) -> BTreeSet<UserId> {
        if !self.is_active {
            return BTreeSet::new();
        }
        self.members.iter().map(|member| member.user_id).collect()
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.is_active {
            Ok(())
        } else {
            Err(DomainError::GroupInactive)
        }
    }

    pub fn add_member(&mut self, user_id: UserId, now: Timestamp) -> DomainResult<()> {
        self.ensure_active()?;
        if self.is_member(user_id) {
            return Err(DomainError::AlreadyGroupMember);
        }
        self.members.push(GroupMember {
            user_id,
            joined_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// 移除成员；管理员必须先转让身份才能离开
    pub fn remove_member(&mut self, user_id: UserId, now: Timestamp) -> DomainResult<()> {
        if self.is_admin(user_id) {
            return Err(DomainError::OperationNotAllowed);
        }
        let before = self.members.len();
        self.members.retain(|member| member.user_id != user_id);
        if self.members.len() == before {
            return Err(DomainError::NotGroupMember);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn transfer_admin(&mut self, new_admin: UserId, now: Timestamp) -> DomainResult<()> {
        self.ensure_active()?;
        if !self.is_member(new_admin) {
            return Err(DomainError::NotGroupMember);
        }
        self.admin_id = new_admin;
        self.updated_at = now;
        Ok(())
    }

    pub fn deactivate(&mut self, now: Timestamp) {
        self.is_active = false;
        self.updated_at = now;
    }
}
