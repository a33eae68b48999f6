//! 集成测试共享装配：全部使用进程内实现

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use application::cache::memory::MemoryCacheStore;
use application::memory::{
    MemoryGroupRepository, MemoryMessageRepository, MemoryReactionRepository,
    MemoryUserRepository,
};
use application::presence::memory::InMemoryPresenceRegistry;
use application::{
    AttachmentUploader, CacheSettings, ConnectionHandle, DispatchEngine, GroupService,
    GroupServiceDependencies, MembershipResolver, MessageCache, MessageService,
    MessageServiceDependencies, ReactionService, ReactionServiceDependencies, RoomRegistry,
    ServerEvent, SessionService, SessionServiceDependencies, SystemClock, UploadError,
    UploadRequest,
};
use async_trait::async_trait;
use domain::{
    ConversationKey, Group, GroupId, GroupMessage, GroupRepository, MessageId, MessageRepository,
    Page, Pagination, PrivateMessage, RepositoryResult, UserId, UserProfile,
};
use tokio::sync::mpsc;

pub struct StaticUploader;

#[async_trait]
impl AttachmentUploader for StaticUploader {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        Ok(format!(
            "https://cdn.example.com/{}",
            request.file_name.unwrap_or_else(|| "blob".to_string())
        ))
    }

    async fn flag_orphan(&self, _url: &str) {}
}

pub struct Harness {
    pub messages: Arc<MemoryMessageRepository>,
    pub groups: Arc<MemoryGroupRepository>,
    pub users: Arc<MemoryUserRepository>,
    pub reactions: Arc<MemoryReactionRepository>,
    pub cache_store: Arc<MemoryCacheStore>,
    pub presence: Arc<InMemoryPresenceRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub message_service: MessageService,
    pub reaction_service: ReactionService,
    pub group_service: GroupService,
    pub session_service: SessionService,
}

/// 在分页读取和群组读取返回前暂停，拉开读与并发写之间的窗口
pub struct SlowReads<R> {
    inner: Arc<R>,
    delay: Duration,
}

impl<R> SlowReads<R> {
    pub fn new(inner: Arc<R>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<R: MessageRepository> MessageRepository for SlowReads<R> {
    async fn insert_private(&self, message: &PrivateMessage) -> RepositoryResult<()> {
        self.inner.insert_private(message).await
    }

    async fn insert_group(&self, message: &GroupMessage) -> RepositoryResult<()> {
        self.inner.insert_group(message).await
    }

    async fn find_private(&self, id: MessageId) -> RepositoryResult<Option<PrivateMessage>> {
        self.inner.find_private(id).await
    }

    async fn find_group(&self, id: MessageId) -> RepositoryResult<Option<GroupMessage>> {
        self.inner.find_group(id).await
    }

    async fn page_conversation(
        &self,
        key: &ConversationKey,
        pagination: Pagination,
    ) -> RepositoryResult<Page<PrivateMessage>> {
        let page = self.inner.page_conversation(key, pagination).await;
        tokio::time::sleep(self.delay).await;
        page
    }

    async fn page_group(
        &self,
        group_id: GroupId,
        pagination: Pagination,
    ) -> RepositoryResult<Page<GroupMessage>> {
        let page = self.inner.page_group(group_id, pagination).await;
        tokio::time::sleep(self.delay).await;
        page
    }

    async fn count_conversation(&self, key: &ConversationKey) -> RepositoryResult<u64> {
        self.inner.count_conversation(key).await
    }

    async fn count_group(&self, group_id: GroupId) -> RepositoryResult<u64> {
        self.inner.count_group(group_id).await
    }

    async fn chat_partner_ids(&self, user_id: UserId) -> RepositoryResult<Vec<UserId>> {
        self.inner.chat_partner_ids(user_id).await
    }
}

#[async_trait]
impl<R: GroupRepository> GroupRepository for SlowReads<R> {
    async fn create(&self, group: &Group) -> RepositoryResult<()> {
        self.inner.create(group).await
    }

    async fn find_by_id(&self, id: GroupId) -> RepositoryResult<Option<Group>> {
        let group = self.inner.find_by_id(id).await;
        tokio::time::sleep(self.delay).await;
        group
    }

    async fn save(&self, group: &Group) -> RepositoryResult<()> {
        self.inner.save(group).await
    }

    async fn list_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Group>> {
        self.inner.list_for_user(user_id).await
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// 消息分页与群组读取都会在返回前暂停 `delay`
    pub fn with_slow_reads(delay: Duration) -> Self {
        Self::build(Some(delay))
    }

    fn build(read_delay: Option<Duration>) -> Self {
        let messages = Arc::new(MemoryMessageRepository::new());
        let groups = Arc::new(MemoryGroupRepository::new());
        let message_repository: Arc<dyn MessageRepository> = match read_delay {
            Some(delay) => Arc::new(SlowReads::new(messages.clone(), delay)),
            None => messages.clone(),
        };
        let group_repository: Arc<dyn GroupRepository> = match read_delay {
            Some(delay) => Arc::new(SlowReads::new(groups.clone(), delay)),
            None => groups.clone(),
        };
        let users = Arc::new(MemoryUserRepository::new());
        let reactions = Arc::new(MemoryReactionRepository::new());
        let cache_store = Arc::new(MemoryCacheStore::new());
        let presence = Arc::new(InMemoryPresenceRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let clock = Arc::new(SystemClock);

        let cache = MessageCache::new(cache_store.clone(), CacheSettings::default());
        let membership = MembershipResolver::new(group_repository.clone());
        let dispatcher = DispatchEngine::new(presence.clone(), rooms.clone(), membership.clone());

        let message_service = MessageService::new(MessageServiceDependencies {
            message_repository: message_repository.clone(),
            user_repository: users.clone(),
            uploader: Arc::new(StaticUploader),
            membership: membership.clone(),
            cache: cache.clone(),
            dispatcher: dispatcher.clone(),
            clock: clock.clone(),
        });
        let reaction_service = ReactionService::new(ReactionServiceDependencies {
            reaction_repository: reactions.clone(),
            message_repository,
            user_repository: users.clone(),
            membership: membership.clone(),
            dispatcher: dispatcher.clone(),
            clock: clock.clone(),
        });
        let group_service = GroupService::new(GroupServiceDependencies {
            group_repository,
            user_repository: users.clone(),
            rooms: rooms.clone(),
            cache,
            clock,
        });
        let session_service = SessionService::new(SessionServiceDependencies {
            presence: presence.clone(),
            user_repository: users.clone(),
            rooms: rooms.clone(),
            membership,
            dispatcher,
        });

        Self {
            messages,
            groups,
            users,
            reactions,
            cache_store,
            presence,
            rooms,
            message_service,
            reaction_service,
            group_service,
            session_service,
        }
    }

    pub async fn user(&self, name: &str) -> UserId {
        let id = UserId::generate();
        self.users.insert(UserProfile::new(id, name, None)).await;
        id
    }

    /// 建立连接并注册在线状态
    pub async fn connect(&self, user_id: UserId) -> Client {
        let (handle, rx) = ConnectionHandle::channel(user_id, 64);
        self.session_service.connect(&handle).await;
        Client { handle, rx }
    }
}

pub struct Client {
    pub handle: ConnectionHandle,
    pub rx: mpsc::Receiver<ServerEvent>,
}

impl Client {
    /// 取出当前已排队的全部事件
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// 排除在线状态广播后的事件
    pub fn drain_messages(&mut self) -> Vec<ServerEvent> {
        self.drain()
            .into_iter()
            .filter(|event| !matches!(event, ServerEvent::PresenceChanged { .. }))
            .collect()
    }

    pub async fn next_within(&mut self, timeout: Duration) -> Option<ServerEvent> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }
}
