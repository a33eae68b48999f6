use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Attachment, AttachmentKind, ConversationKey, Emoji, Group, GroupId, GroupMember, GroupMessage,
    GroupRepository, MessageId, MessageKind, MessageRepository, MessageText, Page, Pagination,
    PrivateMessage, Reaction, ReactionId, ReactionRepository, RepositoryError, RepositoryResult,
    StoreHealth, TargetKind, UserId, UserProfile, UserRepository,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn parse_text(value: Option<String>) -> RepositoryResult<Option<MessageText>> {
    match value {
        Some(text) => MessageText::parse(text).map_err(|err| invalid_data(err.to_string())),
        None => Ok(None),
    }
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn to_sql_page(pagination: Pagination) -> (i64, i64) {
    (
        i64::try_from(pagination.offset()).unwrap_or(i64::MAX),
        i64::from(pagination.limit),
    )
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    full_name: String,
    profile_pic: Option<String>,
}

impl From<UserRecord> for UserProfile {
    fn from(value: UserRecord) -> Self {
        UserProfile::new(UserId::from(value.id), value.full_name, value.profile_pic)
    }
}

#[derive(Debug, FromRow)]
struct PrivateMessageRecord {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    text: Option<String>,
    attachment_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PrivateMessageRecord> for PrivateMessage {
    type Error = RepositoryError;

    fn try_from(value: PrivateMessageRecord) -> Result<Self, Self::Error> {
        PrivateMessage::new(
            MessageId::from(value.id),
            UserId::from(value.sender_id),
            UserId::from(value.receiver_id),
            parse_text(value.text)?,
            value.attachment_url,
            value.created_at,
        )
        .map_err(|err| invalid_data(err.to_string()))
    }
}

#[derive(Debug, FromRow)]
struct GroupMessageRecord {
    id: Uuid,
    group_id: Uuid,
    sender_id: Uuid,
    text: Option<String>,
    attachment_url: Option<String>,
    attachment_kind: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    message_kind: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<GroupMessageRecord> for GroupMessage {
    type Error = RepositoryError;

    fn try_from(value: GroupMessageRecord) -> Result<Self, Self::Error> {
        let attachment = match (value.attachment_url, value.attachment_kind) {
            (Some(url), Some(kind)) => {
                let kind =
                    AttachmentKind::parse(&kind).map_err(|err| invalid_data(err.to_string()))?;
                let file_size = value.file_size.and_then(|size| u64::try_from(size).ok());
                Some(
                    Attachment::new(url, kind)
                        .map_err(|err| invalid_data(err.to_string()))?
                        .with_file(value.file_name, file_size),
                )
            }
            (None, _) => None,
            (Some(_), None) => return Err(invalid_data("attachment without kind")),
        };
        let message_kind =
            MessageKind::parse(&value.message_kind).map_err(|err| invalid_data(err.to_string()))?;

        Ok(GroupMessage::restore(
            MessageId::from(value.id),
            GroupId::from(value.group_id),
            UserId::from(value.sender_id),
            parse_text(value.text)?,
            attachment,
            message_kind,
            value.created_at,
        ))
    }
}

fn version_param(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct GroupRecord {
    id: Uuid,
    name: String,
    admin_id: Uuid,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

#[derive(Debug, FromRow)]
struct GroupMemberRecord {
    group_id: Uuid,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
}

impl GroupRecord {
    fn into_group(self, members: Vec<GroupMember>) -> Group {
        Group {
            id: GroupId::from(self.id),
            name: self.name,
            admin_id: UserId::from(self.admin_id),
            members,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: u64::try_from(self.version).unwrap_or_default(),
        }
    }
}

#[derive(Debug, FromRow)]
struct ReactionRecord {
    id: Uuid,
    actor_id: Uuid,
    target_message_id: Uuid,
    target_kind: String,
    emoji: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReactionRecord> for Reaction {
    type Error = RepositoryError;

    fn try_from(value: ReactionRecord) -> Result<Self, Self::Error> {
        let target_kind =
            TargetKind::parse(&value.target_kind).map_err(|err| invalid_data(err.to_string()))?;
        let emoji = Emoji::parse(value.emoji).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Reaction::new(
            ReactionId::from(value.id),
            UserId::from(value.actor_id),
            MessageId::from(value.target_message_id),
            target_kind,
            emoji,
            value.created_at,
        ))
    }
}

const PRIVATE_COLUMNS: &str = "id, sender_id, receiver_id, text, attachment_url, created_at";
const GROUP_MESSAGE_COLUMNS: &str = "id, group_id, sender_id, text, attachment_url, \
     attachment_kind, file_name, file_size, message_kind, created_at";
const REACTION_COLUMNS: &str = "id, actor_id, target_message_id, target_kind, emoji, created_at";

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert_private(&self, message: &PrivateMessage) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO private_messages
                (id, sender_id, receiver_id, conversation_key, text, attachment_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.sender_id))
        .bind(Uuid::from(message.receiver_id))
        .bind(message.conversation_key.as_str())
        .bind(message.text.as_ref().map(|text| text.as_str()))
        .bind(message.attachment_url.as_deref())
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn insert_group(&self, message: &GroupMessage) -> RepositoryResult<()> {
        let attachment = message.attachment.as_ref();
        sqlx::query(
            r#"
            INSERT INTO group_messages
                (id, group_id, sender_id, text, attachment_url, attachment_kind,
                 file_name, file_size, message_kind, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.group_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.text.as_ref().map(|text| text.as_str()))
        .bind(attachment.map(|a| a.url.as_str()))
        .bind(attachment.map(|a| a.kind.as_str()))
        .bind(attachment.and_then(|a| a.file_name.as_deref()))
        .bind(
            attachment
                .and_then(|a| a.file_size)
                .and_then(|size| i64::try_from(size).ok()),
        )
        .bind(message.message_kind.as_str())
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_private(&self, id: MessageId) -> RepositoryResult<Option<PrivateMessage>> {
        let record = sqlx::query_as::<_, PrivateMessageRecord>(&format!(
            "SELECT {PRIVATE_COLUMNS} FROM private_messages WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(PrivateMessage::try_from).transpose()
    }

    async fn find_group(&self, id: MessageId) -> RepositoryResult<Option<GroupMessage>> {
        let record = sqlx::query_as::<_, GroupMessageRecord>(&format!(
            "SELECT {GROUP_MESSAGE_COLUMNS} FROM group_messages WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(GroupMessage::try_from).transpose()
    }

    async fn page_conversation(
        &self,
        key: &ConversationKey,
        pagination: Pagination,
    ) -> RepositoryResult<Page<PrivateMessage>> {
        let (offset, limit) = to_sql_page(pagination);
        let records = sqlx::query_as::<_, PrivateMessageRecord>(&format!(
            "SELECT {PRIVATE_COLUMNS} FROM private_messages \
             WHERE conversation_key = $1 \
             ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3"
        ))
        .bind(key.as_str())
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        let total_count = self.count_conversation(key).await?;

        let mut items = records
            .into_iter()
            .map(PrivateMessage::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        items.reverse();
        Ok(Page {
            items,
            has_more: pagination.has_more(total_count),
            total_count,
        })
    }

    async fn page_group(
        &self,
        group_id: GroupId,
        pagination: Pagination,
    ) -> RepositoryResult<Page<GroupMessage>> {
        let (offset, limit) = to_sql_page(pagination);
        let records = sqlx::query_as::<_, GroupMessageRecord>(&format!(
            "SELECT {GROUP_MESSAGE_COLUMNS} FROM group_messages \
             WHERE group_id = $1 \
             ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3"
        ))
        .bind(Uuid::from(group_id))
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        let total_count = self.count_group(group_id).await?;

        let mut items = records
            .into_iter()
            .map(GroupMessage::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        items.reverse();
        Ok(Page {
            items,
            has_more: pagination.has_more(total_count),
            total_count,
        })
    }

    async fn count_conversation(&self, key: &ConversationKey) -> RepositoryResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM private_messages WHERE conversation_key = $1")
                .bind(key.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(to_count(count))
    }

    async fn count_group(&self, group_id: GroupId) -> RepositoryResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM group_messages WHERE group_id = $1")
                .bind(Uuid::from(group_id))
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(to_count(count))
    }

    async fn chat_partner_ids(&self, user_id: UserId) -> RepositoryResult<Vec<UserId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END
            FROM private_messages
            WHERE sender_id = $1 OR receiver_id = $1
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(ids.into_iter().map(UserId::from).collect())
    }
}

#[derive(Clone)]
pub struct PgGroupRepository {
    pool: PgPool,
}

impl PgGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_members(
        &self,
        group_ids: &[Uuid],
    ) -> RepositoryResult<HashMap<Uuid, Vec<GroupMember>>> {
        let records = sqlx::query_as::<_, GroupMemberRecord>(
            r#"
            SELECT group_id, user_id, joined_at
            FROM group_members
            WHERE group_id = ANY($1)
            ORDER BY group_id, position
            "#,
        )
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut members: HashMap<Uuid, Vec<GroupMember>> = HashMap::new();
        for record in records {
            members.entry(record.group_id).or_default().push(GroupMember {
                user_id: UserId::from(record.user_id),
                joined_at: record.joined_at,
            });
        }
        Ok(members)
    }

    async fn write_members(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        group: &Group,
    ) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM group_members WHERE group_id = $1")
            .bind(Uuid::from(group.id))
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_err)?;

        for (position, member) in group.members.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO group_members (group_id, user_id, position, joined_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::from(group.id))
            .bind(Uuid::from(member.user_id))
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(member.joined_at)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl GroupRepository for PgGroupRepository {
    async fn create(&self, group: &Group) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        sqlx::query(
            r#"
            INSERT INTO groups (id, name, admin_id, is_active, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::from(group.id))
        .bind(&group.name)
        .bind(Uuid::from(group.admin_id))
        .bind(group.is_active)
        .bind(group.created_at)
        .bind(group.updated_at)
        .bind(version_param(group.version))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        Self::write_members(&mut tx, group).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: GroupId) -> RepositoryResult<Option<Group>> {
        let record = sqlx::query_as::<_, GroupRecord>(
            r#"
            SELECT id, name, admin_id, is_active, created_at, updated_at, version
            FROM groups WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let Some(record) = record else {
            return Ok(None);
        };
        let mut members = self.load_members(&[record.id]).await?;
        let members = members.remove(&record.id).unwrap_or_default();
        Ok(Some(record.into_group(members)))
    }

    async fn save(&self, group: &Group) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let updated = sqlx::query(
            r#"
            UPDATE groups
            SET name = $2, admin_id = $3, is_active = $4, updated_at = $5, version = version + 1
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(Uuid::from(group.id))
        .bind(&group.name)
        .bind(Uuid::from(group.admin_id))
        .bind(group.is_active)
        .bind(group.updated_at)
        .bind(version_param(group.version))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if updated.rows_affected() == 0 {
            // 行被并发更新时 UPDATE 会等待对方提交后重新判断版本
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM groups WHERE id = $1)")
                    .bind(Uuid::from(group.id))
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx_err)?;
            return Err(if exists {
                RepositoryError::Conflict
            } else {
                RepositoryError::NotFound
            });
        }

        Self::write_members(&mut tx, group).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Group>> {
        let records = sqlx::query_as::<_, GroupRecord>(
            r#"
            SELECT g.id, g.name, g.admin_id, g.is_active, g.created_at, g.updated_at, g.version
            FROM groups g
            JOIN group_members m ON m.group_id = g.id
            WHERE m.user_id = $1 AND g.is_active
            ORDER BY g.updated_at DESC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let ids: Vec<Uuid> = records.iter().map(|record| record.id).collect();
        let mut members = self.load_members(&ids).await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let group_members = members.remove(&record.id).unwrap_or_default();
                record.into_group(group_members)
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<UserProfile>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, full_name, profile_pic FROM users WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(UserProfile::from))
    }

    async fn find_many(&self, ids: &[UserId]) -> RepositoryResult<Vec<UserProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT id, full_name, profile_pic FROM users WHERE id = ANY($1)",
        )
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(UserProfile::from).collect())
    }

    async fn list_contacts(&self, user_id: UserId) -> RepositoryResult<Vec<UserProfile>> {
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT id, full_name, profile_pic FROM users WHERE id <> $1 ORDER BY full_name",
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(UserProfile::from).collect())
    }

    async fn upsert(&self, profile: &UserProfile) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, full_name, profile_pic)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, profile_pic = EXCLUDED.profile_pic
            "#,
        )
        .bind(Uuid::from(profile.id))
        .bind(&profile.full_name)
        .bind(profile.profile_pic.as_deref())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgReactionRepository {
    pool: PgPool,
}

impl PgReactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReactionRepository for PgReactionRepository {
    async fn insert(&self, reaction: &Reaction) -> RepositoryResult<()> {
        // 唯一索引保证并发插入只有一个成功
        sqlx::query(
            r#"
            INSERT INTO message_reactions
                (id, actor_id, target_message_id, target_kind, emoji, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(reaction.id))
        .bind(Uuid::from(reaction.actor_id))
        .bind(Uuid::from(reaction.target_message_id))
        .bind(reaction.target_kind.as_str())
        .bind(reaction.emoji.as_str())
        .bind(reaction.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: ReactionId) -> RepositoryResult<Option<Reaction>> {
        let record = sqlx::query_as::<_, ReactionRecord>(&format!(
            "SELECT {REACTION_COLUMNS} FROM message_reactions WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Reaction::try_from).transpose()
    }

    async fn find_by_triple(
        &self,
        actor_id: UserId,
        target_message_id: MessageId,
        emoji: &Emoji,
    ) -> RepositoryResult<Option<Reaction>> {
        let record = sqlx::query_as::<_, ReactionRecord>(&format!(
            "SELECT {REACTION_COLUMNS} FROM message_reactions \
             WHERE actor_id = $1 AND target_message_id = $2 AND emoji = $3"
        ))
        .bind(Uuid::from(actor_id))
        .bind(Uuid::from(target_message_id))
        .bind(emoji.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Reaction::try_from).transpose()
    }

    async fn delete(&self, id: ReactionId) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM message_reactions WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
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
        if target_message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, ReactionRecord>(&format!(
            "SELECT {REACTION_COLUMNS} FROM message_reactions \
             WHERE target_message_id = ANY($1) AND target_kind = $2 \
             ORDER BY created_at, id"
        ))
        .bind(uuids(target_message_ids))
        .bind(target_kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        records.into_iter().map(Reaction::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgStoreHealth {
    pool: PgPool,
}

impl PgStoreHealth {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreHealth for PgStoreHealth {
    async fn check(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}

/// Postgres 存储集合
#[derive(Clone)]
pub struct PgStorage {
    pub user_repository: Arc<PgUserRepository>,
    pub group_repository: Arc<PgGroupRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub reaction_repository: Arc<PgReactionRepository>,
    pub health: Arc<PgStoreHealth>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            group_repository: Arc::new(PgGroupRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            reaction_repository: Arc::new(PgReactionRepository::new(pool.clone())),
            health: Arc::new(PgStoreHealth::new(pool)),
        }
    }
}

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
