//! 进程内的存储实现，用于测试和单进程开发模式

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use domain::{
    ConversationKey, Emoji, Group, GroupId, GroupMessage, GroupRepository, MessageId,
    MessageRepository, Page, Pagination, PrivateMessage, Reaction, ReactionId,
    ReactionRepository, RepositoryError, RepositoryResult, StoreHealth, TargetKind, Timestamp,
    UserId, UserProfile, UserRepository,
};
use tokio::sync::RwLock;

/// 按创建时间倒序截取一页后再反转为从旧到新；同一时间戳按写入顺序排列
fn paginate<T: Clone>(
    mut matching: Vec<(usize, Timestamp, T)>,
    pagination: Pagination,
) -> Page<T> {
    let total_count = matching.len() as u64;
    matching.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
    let mut items: Vec<T> = matching
        .into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.limit as usize)
        .map(|(_, _, item)| item)
        .collect();
    items.reverse();
    Page {
        items,
        has_more: pagination.has_more(total_count),
        total_count,
    }
}

#[derive(Default)]
pub struct MemoryMessageRepository {
    private: RwLock<Vec<PrivateMessage>>,
    group: RwLock<Vec<GroupMessage>>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn insert_private(&self, message: &PrivateMessage) -> RepositoryResult<()> {
        let mut messages = self.private.write().await;
        if messages.iter().any(|existing| existing.id == message.id) {
            return Err(RepositoryError::Conflict);
        }
        messages.push(message.clone());
        Ok(())
    }

    async fn insert_group(&self, message: &GroupMessage) -> RepositoryResult<()> {
        let mut messages = self.group.write().await;
        if messages.iter().any(|existing| existing.id == message.id) {
            return Err(RepositoryError::Conflict);
        }
        messages.push(message.clone());
        Ok(())
    }

    async fn find_private(&self, id: MessageId) -> RepositoryResult<Option<PrivateMessage>> {
        let messages = self.private.read().await;
        Ok(messages.iter().find(|message| message.id == id).cloned())
    }

    async fn find_group(&self, id: MessageId) -> RepositoryResult<Option<GroupMessage>> {
        let messages = self.group.read().await;
        Ok(messages.iter().find(|message| message.id == id).cloned())
    }

    async fn page_conversation(
        &self,
        key: &ConversationKey,
        pagination: Pagination,
    ) -> RepositoryResult<Page<PrivateMessage>> {
        let messages = self.private.read().await;
        let matching = messages
            .iter()
            .enumerate()
            .filter(|(_, message)| &message.conversation_key == key)
            .map(|(index, message)| (index, message.created_at, message.clone()))
            .collect();
        Ok(paginate(matching, pagination))
    }

    async fn page_group(
        &self,
        group_id: GroupId,
        pagination: Pagination,
    ) -> RepositoryResult<Page<GroupMessage>> {
        let messages = self.group.read().await;
        let matching = messages
            .iter()
            .enumerate()
            .filter(|(_, message)| message.group_id == group_id)
            .map(|(index, message)| (index, message.created_at, message.clone()))
            .collect();
        Ok(paginate(matching, pagination))
    }

    async fn count_conversation(&self, key: &ConversationKey) -> RepositoryResult<u64> {
        let messages = self.private.read().await;
        Ok(messages
            .iter()
            .filter(|message| &message.conversation_key == key)
            .count() as u64)
    }

    async fn count_group(&self, group_id: GroupId) -> RepositoryResult<u64> {
        let messages = self.group.read().await;
        Ok(messages
            .iter()
            .filter(|message| message.group_id == group_id)
            .count() as u64)
    }

    async fn chat_partner_ids(&self, user_id: UserId) -> RepositoryResult<Vec<UserId>> {
        let messages = self.private.read().await;
        let partners: BTreeSet<UserId> = messages
            .iter()
            .filter(|message| message.involves(user_id))
            .map(|message| message.counterpart_of(user_id))
            .collect();
        Ok(partners.into_iter().collect())
    }
}

#[derive(Default)]
pub struct MemoryGroupRepository {
    groups: RwLock<HashMap<GroupId, Group>>,
}

impl MemoryGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupRepository for MemoryGroupRepository {
    async fn create(&self, group: &Group) -> RepositoryResult<()> {
        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.id) {
            return Err(RepositoryError::Conflict);
        }
        groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: GroupId) -> RepositoryResult<Option<Group>> {
        Ok(self.groups.read().await.get(&id).cloned())
    }

    async fn save(&self, group: &Group) -> RepositoryResult<()> {
        let mut groups = self.groups.write().await;
        let Some(existing) = groups.get_mut(&group.id) else {
            return Err(RepositoryError::NotFound);
        };
        if existing.version != group.version {
            return Err(RepositoryError::Conflict);
        }
        *existing = Group {
            version: group.version + 1,
            ..group.clone()
        };
        Ok(())
    }

    async fn list_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Group>> {
        let groups = self.groups.read().await;
        let mut found: Vec<Group> = groups
            .values()
            .filter(|group| group.is_active && group.is_member(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<BTreeMap<UserId, UserProfile>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用户资料由外部系统维护，这里只提供写入入口
    pub async fn insert(&self, profile: UserProfile) {
        self.users.write().await.insert(profile.id, profile);
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<UserProfile>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[UserId]) -> RepositoryResult<Vec<UserProfile>> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn list_contacts(&self, user_id: UserId) -> RepositoryResult<Vec<UserProfile>> {
        let users = self.users.read().await;
        let mut contacts: Vec<UserProfile> = users
            .values()
            .filter(|profile| profile.id != user_id)
            .cloned()
            .collect();
        contacts.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(contacts)
    }

    async fn upsert(&self, profile: &UserProfile) -> RepositoryResult<()> {
        self.insert(profile.clone()).await;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryReactionRepository {
    reactions: RwLock<Vec<Reaction>>,
}

impl MemoryReactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReactionRepository for MemoryReactionRepository {
    async fn insert(&self, reaction: &Reaction) -> RepositoryResult<()> {
        // 在写锁内检查三元组，等价于存储层的唯一索引
        let mut reactions = self.reactions.write().await;
        let duplicate = reactions.iter().any(|existing| {
            existing.actor_id == reaction.actor_id
                && existing.target_message_id == reaction.target_message_id
                && existing.emoji == reaction.emoji
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        reactions.push(reaction.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ReactionId) -> RepositoryResult<Option<Reaction>> {
        let reactions = self.reactions.read().await;
        Ok(reactions.iter().find(|reaction| reaction.id == id).cloned())
    }

    async fn find_by_triple(
        &self,
        actor_id: UserId,
        target_message_id: MessageId,
        emoji: &Emoji,
    ) -> RepositoryResult<Option<Reaction>> {
        let reactions = self.reactions.read().await;
        Ok(reactions
            .iter()
            .find(|reaction| {
                reaction.actor_id == actor_id
                    && reaction.target_message_id == target_message_id
                    && &reaction.emoji == emoji
            })
            .cloned())
    }

    async fn delete(&self, id: ReactionId) -> RepositoryResult<bool> {
        let mut reactions = self.reactions.write().await;
        let before = reactions.len();
        reactions.retain(|reaction| reaction.id != id);
        Ok(reactions.len() != before)
    }

    async fn list_for_target(
        &self,
        target_message_id: MessageId,
        target_kind: TargetKind,
    ) -> RepositoryResult<Vec<Reaction>> {
        self.list_for_targets(&[target_message_id], target_kind)
            .await
    }

    async fn list_for_targets(
        &self,
        target_message_ids: &[MessageId],
        target_kind: TargetKind,
    ) -> RepositoryResult<Vec<Reaction>> {
        let reactions = self.reactions.read().await;
        let mut found: Vec<Reaction> = reactions
            .iter()
            .filter(|reaction| {
                reaction.target_kind == target_kind
                    && target_message_ids.contains(&reaction.target_message_id)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}

/// 进程内存储总是可用
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryStoreHealth;

#[async_trait]
impl StoreHealth for MemoryStoreHealth {
    async fn check(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domain::MessageText;

    #[tokio::test]
    async fn conversation_pages_are_oldest_first() {
        let repo = MemoryMessageRepository::new();
        let a = UserId::generate();
        let b = UserId::generate();
        let start = Utc::now();

        for i in 0..5 {
            let message = PrivateMessage::new(
                MessageId::generate(),
                if i % 2 == 0 { a } else { b },
                if i % 2 == 0 { b } else { a },
                MessageText::parse(format!("m{i}")).unwrap(),
                None,
                start + Duration::seconds(i),
            )
            .unwrap();
            repo.insert_private(&message).await.unwrap();
        }

        let key = ConversationKey::between(a, b);
        let first = repo
            .page_conversation(&key, Pagination::new(Some(1), Some(2)))
            .await
            .unwrap();
        let texts: Vec<_> = first
            .items
            .iter()
            .map(|m| m.text.as_ref().unwrap().as_str().to_owned())
            .collect();
        assert_eq!(texts, vec!["m3", "m4"]);
        assert!(first.has_more);
        assert_eq!(first.total_count, 5);

        let last = repo
            .page_conversation(&key, Pagination::new(Some(3), Some(2)))
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more);
        assert_eq!(repo.chat_partner_ids(a).await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn stale_group_save_is_rejected() {
        let repo = MemoryGroupRepository::new();
        let admin = UserId::generate();
        let group =
            Group::create(GroupId::generate(), "team", admin, Vec::new(), Utc::now()).unwrap();
        repo.create(&group).await.unwrap();

        let mut first = repo.find_by_id(group.id).await.unwrap().unwrap();
        let mut second = first.clone();
        first.add_member(UserId::generate(), Utc::now()).unwrap();
        second.add_member(UserId::generate(), Utc::now()).unwrap();

        repo.save(&first).await.unwrap();
        assert!(matches!(
            repo.save(&second).await,
            Err(RepositoryError::Conflict)
        ));

        let stored = repo.find_by_id(group.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.members, first.members);
    }
}
