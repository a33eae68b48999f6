use std::collections::BTreeSet;
use std::sync::Arc;

use domain::{
    DomainError, Emoji, GroupId, MessageId, MessageRepository, Reaction, ReactionId,
    ReactionRepository, TargetKind, UserId, UserProfile, UserRepository,
};

use crate::{
    clock::Clock,
    dispatch::DispatchEngine,
    dto::{profile_or_placeholder, BulkReactions, ReactionGroups, ReactionView},
    error::ApplicationError,
    events::ServerEvent,
    membership::MembershipResolver,
};

use super::load_profiles;

#[derive(Debug, Clone)]
pub struct AddReactionRequest {
    pub actor_id: UserId,
    pub target_message_id: MessageId,
    pub target_kind: TargetKind,
    pub emoji: String,
}

#[derive(Debug, Clone)]
pub enum ReactionSelector {
    ById(ReactionId),
    ByTarget {
        target_message_id: MessageId,
        target_kind: TargetKind,
        emoji: String,
    },
}

#[derive(Debug, Clone)]
pub struct RemoveReactionRequest {
    pub actor_id: UserId,
    pub selector: ReactionSelector,
}

/// 回应事件的投递范围
enum Audience {
    /// 私聊双方，各投递一次
    Participants(BTreeSet<UserId>),
    /// 群组房间
    Room(GroupId),
}

pub struct ReactionServiceDependencies {
    pub reaction_repository: Arc<dyn ReactionRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub membership: MembershipResolver,
    pub dispatcher: DispatchEngine,
    pub clock: Arc<dyn Clock>,
}

/// 表情回应聚合。服务本身无状态，三元组唯一性由存储的唯一约束兜底。
pub struct ReactionService {
    deps: ReactionServiceDependencies,
}

impl ReactionService {
    pub fn new(deps: ReactionServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn add_reaction(
        &self,
        request: AddReactionRequest,
    ) -> Result<ReactionView, ApplicationError> {
        let emoji = Emoji::parse(request.emoji)?;
        let audience = self
            .authorize(
                request.actor_id,
                request.target_message_id,
                request.target_kind,
            )
            .await?;

        let existing = self
            .deps
            .reaction_repository
            .find_by_triple(request.actor_id, request.target_message_id, &emoji)
            .await?;
        if existing.is_some() {
            return Err(DomainError::DuplicateReaction.into());
        }

        let reaction = Reaction::new(
            ReactionId::generate(),
            request.actor_id,
            request.target_message_id,
            request.target_kind,
            emoji,
            self.deps.clock.now(),
        );
        // 并发的重复插入由唯一约束拒绝，映射为 DuplicateReaction
        self.deps.reaction_repository.insert(&reaction).await?;

        let actor = self
            .deps
            .user_repository
            .find_by_id(reaction.actor_id)
            .await?
            .unwrap_or_else(|| UserProfile::new(reaction.actor_id, String::new(), None));
        let view = ReactionView::new(reaction, actor);

        tracing::info!(
            actor_id = %view.actor.id,
            message_id = %view.target_message_id,
            emoji = %view.emoji,
            "添加表情回应"
        );

        self.emit(
            audience,
            ServerEvent::MessageReactionAdded {
                target_message_id: view.target_message_id,
                reaction: view.clone(),
                target_kind: view.target_kind,
            },
        )
        .await;
        Ok(view)
    }

    /// 只有创建者可以删除；找不到或不属于自己都返回 `ReactionNotFound`
    pub async fn remove_reaction(
        &self,
        request: RemoveReactionRequest,
    ) -> Result<(), ApplicationError> {
        let reaction = match request.selector {
            ReactionSelector::ById(id) => self
                .deps
                .reaction_repository
                .find_by_id(id)
                .await?
                .filter(|reaction| reaction.is_owned_by(request.actor_id)),
            ReactionSelector::ByTarget {
                target_message_id,
                target_kind,
                emoji,
            } => {
                let emoji = Emoji::parse(emoji)?;
                self.deps
                    .reaction_repository
                    .find_by_triple(request.actor_id, target_message_id, &emoji)
                    .await?
                    .filter(|reaction| reaction.target_kind == target_kind)
            }
        }
        .ok_or(DomainError::ReactionNotFound)?;

        if !self.deps.reaction_repository.delete(reaction.id).await? {
            return Err(DomainError::ReactionNotFound.into());
        }

        tracing::info!(
            actor_id = %reaction.actor_id,
            message_id = %reaction.target_message_id,
            emoji = %reaction.emoji,
            "删除表情回应"
        );

        match self
            .audience_of(reaction.target_message_id, reaction.target_kind)
            .await
        {
            Ok(Some(audience)) => {
                self.emit(
                    audience,
                    ServerEvent::MessageReactionRemoved {
                        target_message_id: reaction.target_message_id,
                        actor_id: reaction.actor_id,
                        emoji: reaction.emoji.as_str().to_owned(),
                        target_kind: reaction.target_kind,
                    },
                )
                .await;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    message_id = %reaction.target_message_id,
                    error = %err,
                    "无法确定回应删除事件的投递范围"
                );
            }
        }
        Ok(())
    }

    /// 表情 → 按回应时间排序的回应者
    pub async fn get_reactions(
        &self,
        target_message_id: MessageId,
        target_kind: TargetKind,
    ) -> Result<ReactionGroups, ApplicationError> {
        let mut bulk = self
            .get_reactions_for_many(&[target_message_id], target_kind)
            .await?;
        Ok(bulk.remove(&target_message_id).unwrap_or_default())
    }

    /// 每个请求的消息 ID 都有一项，没有回应时为空
    pub async fn get_reactions_for_many(
        &self,
        target_message_ids: &[MessageId],
        target_kind: TargetKind,
    ) -> Result<BulkReactions, ApplicationError> {
        let mut bulk: BulkReactions = target_message_ids
            .iter()
            .map(|id| (*id, ReactionGroups::new()))
            .collect();
        if target_message_ids.is_empty() {
            return Ok(bulk);
        }

        let reactions = self
            .deps
            .reaction_repository
            .list_for_targets(target_message_ids, target_kind)
            .await?;
        let profiles = load_profiles(
            self.deps.user_repository.as_ref(),
            reactions.iter().map(|reaction| reaction.actor_id),
        )
        .await?;

        for reaction in reactions {
            let Some(groups) = bulk.get_mut(&reaction.target_message_id) else {
                continue;
            };
            let reactors = groups
                .entry(reaction.emoji.as_str().to_owned())
                .or_default();
            if reactors.iter().all(|profile| profile.id != reaction.actor_id) {
                reactors.push(profile_or_placeholder(&profiles, reaction.actor_id));
            }
        }
        Ok(bulk)
    }

    /// 私聊：操作者必须是发送方或接收方；群聊：操作者必须是当前成员
    async fn authorize(
        &self,
        actor_id: UserId,
        target_message_id: MessageId,
        target_kind: TargetKind,
    ) -> Result<Audience, ApplicationError> {
        match target_kind {
            TargetKind::Private => {
                let message = self
                    .deps
                    .message_repository
                    .find_private(target_message_id)
                    .await?
                    .filter(|message| message.involves(actor_id))
                    .ok_or(DomainError::MessageNotFound)?;
                Ok(Audience::Participants(
                    [message.sender_id, message.receiver_id].into_iter().collect(),
                ))
            }
            TargetKind::Group => {
                let message = self
                    .deps
                    .message_repository
                    .find_group(target_message_id)
                    .await?
                    .ok_or(DomainError::MessageNotFound)?;
                if !self
                    .deps
                    .membership
                    .is_member(message.group_id, actor_id)
                    .await?
                {
                    return Err(DomainError::NotGroupMember.into());
                }
                Ok(Audience::Room(message.group_id))
            }
        }
    }

    async fn audience_of(
        &self,
        target_message_id: MessageId,
        target_kind: TargetKind,
    ) -> Result<Option<Audience>, ApplicationError> {
        Ok(match target_kind {
            TargetKind::Private => self
                .deps
                .message_repository
                .find_private(target_message_id)
                .await?
                .map(|message| {
                    Audience::Participants(
                        [message.sender_id, message.receiver_id].into_iter().collect(),
                    )
                }),
            TargetKind::Group => self
                .deps
                .message_repository
                .find_group(target_message_id)
                .await?
                .map(|message| Audience::Room(message.group_id)),
        })
    }

    async fn emit(&self, audience: Audience, event: ServerEvent) {
        match audience {
            Audience::Participants(users) => {
                self.deps.dispatcher.deliver_to_users(users, event).await;
            }
            Audience::Room(group_id) => {
                if let Err(err) = self.deps.dispatcher.broadcast_room(group_id, event).await {
                    tracing::warn!(group_id = %group_id, error = %err, "回应事件房间广播失败");
                }
            }
        }
    }
}
