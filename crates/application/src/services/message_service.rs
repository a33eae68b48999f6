use std::collections::BTreeMap;
use std::sync::Arc;

use domain::{
    Attachment, ClientMessageId, ConversationKey, DomainError, GroupId, GroupMessage, MessageId,
    MessageRepository, MessageText, Pagination, PrivateMessage, UserId, UserProfile,
    UserRepository,
};
use serde::{Deserialize, Serialize};

use crate::{
    attachments::{AttachmentSource, AttachmentUploader, PreparedAttachment},
    cache::{CacheKey, MessageCache},
    clock::Clock,
    dispatch::DispatchEngine,
    dto::{profile_or_placeholder, GroupMessageView, MessagePage, PrivateMessageView},
    error::ApplicationError,
    membership::MembershipResolver,
};

use super::load_profiles;

#[derive(Debug, Clone)]
pub struct SendPrivateMessageRequest {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: Option<String>,
    pub attachment: Option<AttachmentSource>,
}

#[derive(Debug, Clone)]
pub struct SendGroupMessageRequest {
    pub sender_id: UserId,
    pub group_id: GroupId,
    pub text: Option<String>,
    pub attachment: Option<AttachmentSource>,
    /// 客户端关联令牌，原样带回响应和投递事件，不落库
    pub client_message_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageScope {
    Conversation { peer: UserId },
    Group { group_id: GroupId },
}

#[derive(Debug, Clone, Copy)]
pub struct FetchMessagesRequest {
    pub viewer: UserId,
    pub scope: MessageScope,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagesPage {
    Conversation(MessagePage<PrivateMessageView>),
    Group(MessagePage<GroupMessageView>),
}

pub struct MessageServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub uploader: Arc<dyn AttachmentUploader>,
    pub membership: MembershipResolver,
    pub cache: MessageCache,
    pub dispatcher: DispatchEngine,
    pub clock: Arc<dyn Clock>,
}

pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn send_private_message(
        &self,
        request: SendPrivateMessageRequest,
    ) -> Result<PrivateMessageView, ApplicationError> {
        let text = match request.text {
            Some(text) => MessageText::parse(text)?,
            None => None,
        };
        if request.sender_id == request.receiver_id {
            return Err(
                DomainError::invalid_argument("receiver_id", "cannot send messages to yourself")
                    .into(),
            );
        }
        if text.is_none() && request.attachment.is_none() {
            return Err(DomainError::invalid_argument("body", "text or attachment is required").into());
        }
        let prepared = request.attachment.map(AttachmentSource::prepare).transpose()?;

        let profiles = load_profiles(
            self.deps.user_repository.as_ref(),
            [request.sender_id, request.receiver_id],
        )
        .await?;
        let receiver = profiles
            .get(&request.receiver_id)
            .cloned()
            .ok_or(DomainError::UserNotFound)?;
        let sender = profile_or_placeholder(&profiles, request.sender_id);

        let attachment = self.upload(prepared).await?;
        let uploaded_url = attachment
            .as_ref()
            .filter(|attachment| attachment.uploaded)
            .map(|attachment| attachment.value.url.clone());

        let message = PrivateMessage::new(
            MessageId::generate(),
            request.sender_id,
            request.receiver_id,
            text,
            attachment.map(|attachment| attachment.value.url),
            self.deps.clock.now(),
        )?;

        if let Err(err) = self.deps.message_repository.insert_private(&message).await {
            self.flag_orphan(uploaded_url.as_deref()).await;
            tracing::error!(
                sender_id = %message.sender_id,
                receiver_id = %message.receiver_id,
                error = %err,
                "私聊消息持久化失败"
            );
            return Err(err.into());
        }

        self.deps
            .cache
            .invalidate_conversation(&message.conversation_key)
            .await;
        self.deps
            .cache
            .delete(&CacheKey::chat_partners(message.sender_id))
            .await;
        self.deps
            .cache
            .delete(&CacheKey::chat_partners(message.receiver_id))
            .await;

        let view = PrivateMessageView::new(message, sender, receiver);
        self.deps.dispatcher.dispatch_private(&view).await;
        Ok(view)
    }

    pub async fn send_group_message(
        &self,
        request: SendGroupMessageRequest,
    ) -> Result<GroupMessageView, ApplicationError> {
        let text = match request.text {
            Some(text) => MessageText::parse(text)?,
            None => None,
        };
        let client_message_id = request
            .client_message_id
            .map(ClientMessageId::parse)
            .transpose()?;
        if text.is_none() && request.attachment.is_none() {
            return Err(
                DomainError::invalid_argument("body", "text, image, or file is required").into(),
            );
        }
        let prepared = request.attachment.map(AttachmentSource::prepare).transpose()?;

        self.deps
            .membership
            .require_member(request.group_id, request.sender_id)
            .await?;
        let sender = self
            .deps
            .user_repository
            .find_by_id(request.sender_id)
            .await?
            .unwrap_or_else(|| UserProfile::new(request.sender_id, String::new(), None));

        let attachment = self.upload(prepared).await?;
        let uploaded_url = attachment
            .as_ref()
            .filter(|attachment| attachment.uploaded)
            .map(|attachment| attachment.value.url.clone());

        let message = GroupMessage::new(
            MessageId::generate(),
            request.group_id,
            request.sender_id,
            text,
            attachment.map(|attachment| attachment.value),
            self.deps.clock.now(),
        )?;

        if let Err(err) = self.deps.message_repository.insert_group(&message).await {
            self.flag_orphan(uploaded_url.as_deref()).await;
            tracing::error!(
                group_id = %message.group_id,
                sender_id = %message.sender_id,
                error = %err,
                "群聊消息持久化失败"
            );
            return Err(err.into());
        }

        self.deps.cache.invalidate_group(message.group_id).await;

        let view = GroupMessageView::new(message, sender).with_client_message_id(
            client_message_id.map(|id| id.as_str().to_owned()),
        );

        if let Err(err) = self.deps.dispatcher.dispatch_group(&view).await {
            // 消息已持久化，分发失败只影响实时投递
            tracing::warn!(
                group_id = %view.group_id,
                message_id = %view.id,
                error = %err,
                "群聊消息分发失败"
            );
        }
        Ok(view)
    }

    pub async fn fetch_messages_page(
        &self,
        request: FetchMessagesRequest,
    ) -> Result<MessagesPage, ApplicationError> {
        match request.scope {
            MessageScope::Conversation { peer } => self
                .fetch_conversation_page(request.viewer, peer, request.pagination)
                .await
                .map(MessagesPage::Conversation),
            MessageScope::Group { group_id } => self
                .fetch_group_page(request.viewer, group_id, request.pagination)
                .await
                .map(MessagesPage::Group),
        }
    }

    /// 一次取回多个会话的第一页，逐个走与单会话相同的读穿透缓存。
    /// 标识中不包含查看者的会话一律拒绝，结果以规范化后的会话标识为键。
    pub async fn fetch_first_pages(
        &self,
        viewer: UserId,
        conversation_ids: &[String],
    ) -> Result<BTreeMap<String, MessagePage<PrivateMessageView>>, ApplicationError> {
        let mut peers = BTreeMap::new();
        for raw in conversation_ids {
            let key = ConversationKey::parse(raw)?;
            let (first, second) = key.participants()?;
            let peer = match (first == viewer, second == viewer) {
                (true, _) => second,
                (_, true) => first,
                _ => return Err(DomainError::OperationNotAllowed.into()),
            };
            peers.insert(key.to_string(), peer);
        }

        let mut pages = BTreeMap::new();
        for (key, peer) in peers {
            let page = self
                .fetch_conversation_page(viewer, peer, Pagination::first())
                .await?;
            pages.insert(key, page);
        }
        tracing::debug!(viewer = %viewer, conversations = pages.len(), "批量加载会话第一页");
        Ok(pages)
    }

    async fn fetch_conversation_page(
        &self,
        viewer: UserId,
        peer: UserId,
        pagination: Pagination,
    ) -> Result<MessagePage<PrivateMessageView>, ApplicationError> {
        let key = ConversationKey::between(viewer, peer);
        let cache_key = CacheKey::conversation_messages(&key);
        let cacheable = pagination == Pagination::first();

        // 代数快照必须先于存储读取
        let snapshot = if cacheable {
            if let Some(page) = self.deps.cache.get_json(&cache_key).await {
                tracing::debug!(conversation = %key, "会话第一页命中缓存");
                return Ok(page);
            }
            Some(self.deps.cache.snapshot(&cache_key).await)
        } else {
            None
        };

        let page = self
            .deps
            .message_repository
            .page_conversation(&key, pagination)
            .await?;
        let profiles = load_profiles(self.deps.user_repository.as_ref(), [viewer, peer]).await?;
        let page = MessagePage {
            has_more: page.has_more,
            total_count: page.total_count,
            messages: page
                .items
                .into_iter()
                .map(|message| {
                    let sender = profile_or_placeholder(&profiles, message.sender_id);
                    let receiver = profile_or_placeholder(&profiles, message.receiver_id);
                    PrivateMessageView::new(message, sender, receiver)
                })
                .collect(),
        };

        if let Some(snapshot) = snapshot {
            self.deps
                .cache
                .fill_json(
                    &cache_key,
                    &page,
                    self.deps.cache.settings().conversation_ttl,
                    snapshot,
                )
                .await;
        }
        Ok(page)
    }

    async fn fetch_group_page(
        &self,
        viewer: UserId,
        group_id: GroupId,
        pagination: Pagination,
    ) -> Result<MessagePage<GroupMessageView>, ApplicationError> {
        // 先鉴权再读缓存，被移出的成员拿不到缓存页
        self.deps
            .membership
            .require_member(group_id, viewer)
            .await?;

        let cache_key = CacheKey::group_page(group_id, 1);
        let cacheable = pagination == Pagination::first();

        // 代数快照必须先于存储读取
        let snapshot = if cacheable {
            if let Some(page) = self.deps.cache.get_json(&cache_key).await {
                tracing::debug!(group_id = %group_id, "群聊第一页命中缓存");
                return Ok(page);
            }
            Some(self.deps.cache.snapshot(&cache_key).await)
        } else {
            None
        };

        let page = self
            .deps
            .message_repository
            .page_group(group_id, pagination)
            .await?;
        let profiles = load_profiles(
            self.deps.user_repository.as_ref(),
            page.items.iter().map(|message| message.sender_id),
        )
        .await?;
        let page = MessagePage {
            has_more: page.has_more,
            total_count: page.total_count,
            messages: page
                .items
                .into_iter()
                .map(|message| {
                    let sender = profile_or_placeholder(&profiles, message.sender_id);
                    GroupMessageView::new(message, sender)
                })
                .collect(),
        };

        if let Some(snapshot) = snapshot {
            self.deps
                .cache
                .fill_json(
                    &cache_key,
                    &page,
                    self.deps.cache.settings().group_page_ttl,
                    snapshot,
                )
                .await;
        }
        Ok(page)
    }

    /// 除自己以外的所有用户，只依赖 TTL 过期
    pub async fn list_contacts(&self, user_id: UserId) -> Result<Vec<UserProfile>, ApplicationError> {
        let cache_key = CacheKey::contacts(user_id);
        if let Some(contacts) = self.deps.cache.get_json(&cache_key).await {
            return Ok(contacts);
        }

        let contacts = self.deps.user_repository.list_contacts(user_id).await?;
        self.deps
            .cache
            .put_json(&cache_key, &contacts, self.deps.cache.settings().contacts_ttl)
            .await;
        Ok(contacts)
    }

    /// 有过私聊往来的用户
    pub async fn list_chat_partners(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserProfile>, ApplicationError> {
        let cache_key = CacheKey::chat_partners(user_id);
        if let Some(partners) = self.deps.cache.get_json(&cache_key).await {
            return Ok(partners);
        }

        let partner_ids = self
            .deps
            .message_repository
            .chat_partner_ids(user_id)
            .await?;
        let profiles = load_profiles(self.deps.user_repository.as_ref(), partner_ids).await?;
        let partners: Vec<UserProfile> = profiles.into_values().collect();
        self.deps
            .cache
            .put_json(&cache_key, &partners, self.deps.cache.settings().contacts_ttl)
            .await;
        Ok(partners)
    }

    /// 同步账号系统的展示身份；新用户要等联系人缓存过期后才会出现在他人列表里
    pub async fn sync_profile(
        &self,
        user_id: UserId,
        full_name: String,
        profile_pic: Option<String>,
    ) -> Result<UserProfile, ApplicationError> {
        let full_name = full_name.trim().to_string();
        if full_name.is_empty() || full_name.chars().count() > 100 {
            return Err(DomainError::invalid_argument("full_name", "must be 1-100 characters").into());
        }
        let profile_pic = profile_pic.filter(|url| !url.trim().is_empty());
        let profile = UserProfile::new(user_id, full_name, profile_pic);
        self.deps.user_repository.upsert(&profile).await?;
        tracing::info!(user_id = %user_id, "同步用户资料");
        Ok(profile)
    }

    async fn upload(
        &self,
        prepared: Option<PreparedAttachment>,
    ) -> Result<Option<ResolvedAttachment>, ApplicationError> {
        match prepared {
            None => Ok(None),
            Some(PreparedAttachment::Ready(value)) => Ok(Some(ResolvedAttachment {
                value,
                uploaded: false,
            })),
            Some(PreparedAttachment::NeedsUpload(request)) => {
                let kind = request.kind;
                let file_name = request.file_name.clone();
                let file_size = request.bytes.len() as u64;
                let url = self.deps.uploader.upload(request).await.map_err(|err| {
                    tracing::warn!(error = %err, "附件上传失败，消息未创建");
                    err
                })?;
                let value = Attachment::new(url, kind)?.with_file(file_name, Some(file_size));
                Ok(Some(ResolvedAttachment {
                    value,
                    uploaded: true,
                }))
            }
        }
    }

    async fn flag_orphan(&self, url: Option<&str>) {
        if let Some(url) = url {
            tracing::warn!(url, "消息未能持久化，标记已上传附件待清理");
            self.deps.uploader.flag_orphan(url).await;
        }
    }
}

struct ResolvedAttachment {
    value: Attachment,
    uploaded: bool,
}
