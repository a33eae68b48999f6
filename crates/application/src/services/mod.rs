mod group_service;
mod message_service;
mod reaction_service;
mod session_service;

pub use group_service::{
    CreateGroupRequest, GroupService, GroupServiceDependencies, MemberChangeRequest,
};
pub use message_service::{
    FetchMessagesRequest, MessageScope, MessageService, MessageServiceDependencies,
    MessagesPage, SendGroupMessageRequest, SendPrivateMessageRequest,
};
pub use reaction_service::{
    AddReactionRequest, ReactionService, ReactionServiceDependencies, RemoveReactionRequest,
    ReactionSelector,
};
pub use session_service::{SessionService, SessionServiceDependencies};

use std::collections::BTreeMap;

use domain::{Group, UserId, UserProfile, UserRepository};

use crate::dto::{profile_or_placeholder, GroupView};
use crate::error::ApplicationError;

/// 批量加载展示身份
pub(crate) async fn load_profiles(
    users: &dyn UserRepository,
    ids: impl IntoIterator<Item = UserId>,
) -> Result<BTreeMap<UserId, UserProfile>, ApplicationError> {
    let mut ids: Vec<UserId> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(users
        .find_many(&ids)
        .await?
        .into_iter()
        .map(|profile| (profile.id, profile))
        .collect())
}

pub(crate) async fn group_views(
    users: &dyn UserRepository,
    groups: Vec<Group>,
) -> Result<Vec<GroupView>, ApplicationError> {
    let profiles = load_profiles(
        users,
        groups.iter().flat_map(|group| {
            group
                .members
                .iter()
                .map(|member| member.user_id)
                .chain(std::iter::once(group.admin_id))
        })
        .collect::<Vec<_>>(),
    )
    .await?;

    Ok(groups
        .into_iter()
        .map(|group| GroupView {
            id: group.id,
            admin: profile_or_placeholder(&profiles, group.admin_id),
            members: group
                .members
                .iter()
                .map(|member| profile_or_placeholder(&profiles, member.user_id))
                .collect(),
            name: group.name,
            is_active: group.is_active,
            created_at: group.created_at,
            updated_at: group.updated_at,
        })
        .collect())
}
