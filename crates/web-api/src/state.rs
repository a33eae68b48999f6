use std::sync::Arc;

use application::presence::memory::InMemoryPresenceRegistry;
use application::{
    AttachmentUploader, CacheSettings, CacheStore, Clock, DispatchEngine, GroupService,
    GroupServiceDependencies, MembershipResolver, MessageCache, MessageService,
    MessageServiceDependencies, PresenceRegistry, ReactionService, ReactionServiceDependencies,
    RoomRegistry, SessionService, SessionServiceDependencies,
};
use domain::{GroupRepository, MessageRepository, ReactionRepository, StoreHealth, UserRepository};

use crate::JwtService;

/// 存储与外部服务适配器，由启动代码按配置选择具体实现
pub struct Backends {
    pub message_repository: Arc<dyn MessageRepository>,
    pub group_repository: Arc<dyn GroupRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub reaction_repository: Arc<dyn ReactionRepository>,
    pub store_health: Arc<dyn StoreHealth>,
    pub cache_store: Arc<dyn CacheStore>,
    pub uploader: Arc<dyn AttachmentUploader>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AppState {
    pub message_service: Arc<MessageService>,
    pub reaction_service: Arc<ReactionService>,
    pub group_service: Arc<GroupService>,
    pub session_service: Arc<SessionService>,
    pub presence: Arc<dyn PresenceRegistry>,
    pub store_health: Arc<dyn StoreHealth>,
    pub jwt_service: Arc<JwtService>,
    /// 每个实时连接的出站队列长度
    pub outbox_capacity: usize,
}

impl AppState {
    /// 在线表与房间表是进程内状态，每个进程各有一份
    pub fn assemble(
        backends: Backends,
        cache_settings: CacheSettings,
        jwt_service: JwtService,
        outbox_capacity: usize,
    ) -> Self {
        let presence: Arc<dyn PresenceRegistry> = Arc::new(InMemoryPresenceRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let cache = MessageCache::new(backends.cache_store, cache_settings);
        let membership = MembershipResolver::new(backends.group_repository.clone());
        let dispatcher = DispatchEngine::new(presence.clone(), rooms.clone(), membership.clone());

        let message_service = MessageService::new(MessageServiceDependencies {
            message_repository: backends.message_repository.clone(),
            user_repository: backends.user_repository.clone(),
            uploader: backends.uploader,
            membership: membership.clone(),
            cache: cache.clone(),
            dispatcher: dispatcher.clone(),
            clock: backends.clock.clone(),
        });
        let reaction_service = ReactionService::new(ReactionServiceDependencies {
            reaction_repository: backends.reaction_repository,
            message_repository: backends.message_repository,
            user_repository: backends.user_repository.clone(),
            membership: membership.clone(),
            dispatcher: dispatcher.clone(),
            clock: backends.clock.clone(),
        });
        let group_service = GroupService::new(GroupServiceDependencies {
            group_repository: backends.group_repository,
            user_repository: backends.user_repository.clone(),
            rooms: rooms.clone(),
            cache,
            clock: backends.clock,
        });
        let session_service = SessionService::new(SessionServiceDependencies {
            presence: presence.clone(),
            user_repository: backends.user_repository,
            rooms,
            membership,
            dispatcher,
        });

        Self {
            message_service: Arc::new(message_service),
            reaction_service: Arc::new(reaction_service),
            group_service: Arc::new(group_service),
            session_service: Arc::new(session_service),
            presence,
            store_health: backends.store_health,
            jwt_service: Arc::new(jwt_service),
            outbox_capacity,
        }
    }
}
