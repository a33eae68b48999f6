use std::collections::BTreeSet;

use async_trait::async_trait;
use domain::{ConnectionId, UserId};

use crate::connection::ConnectionHandle;

/// 在线状态注册表
/// 每个用户至多一个连接，后连接者覆盖先连接者
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// 注册连接，返回被覆盖的旧句柄
    async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle>;

    async fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle>;

    /// 仅当该连接仍是当前注册的连接时才移除，过期的断开不会踢掉更新的连接
    async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool;

    async fn list_active(&self) -> BTreeSet<UserId>;

    /// 当前所有已注册的连接，用于在线状态广播
    async fn handles(&self) -> Vec<ConnectionHandle>;
}

pub mod memory {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use dashmap::DashMap;
    use domain::{ConnectionId, UserId};

    use super::PresenceRegistry;
    use crate::connection::ConnectionHandle;

    /// 进程内实现，基于分片哈希表，无全局锁
    #[derive(Default)]
    pub struct InMemoryPresenceRegistry {
        connections: DashMap<UserId, ConnectionHandle>,
    }

    impl InMemoryPresenceRegistry {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl PresenceRegistry for InMemoryPresenceRegistry {
        async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
            let user_id = handle.user_id();
            let displaced = self.connections.insert(user_id, handle);
            tracing::info!(
                user_id = %user_id,
                displaced = displaced.is_some(),
                "用户上线"
            );
            displaced
        }

        async fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
            self.connections
                .get(&user_id)
                .map(|entry| entry.value().clone())
        }

        async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
            let removed = self
                .connections
                .remove_if(&user_id, |_, handle| handle.id() == connection_id)
                .is_some();
            if removed {
                tracing::info!(user_id = %user_id, "用户下线");
            } else {
                tracing::debug!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    "忽略过期连接的断开"
                );
            }
            removed
        }

        async fn list_active(&self) -> BTreeSet<UserId> {
            self.connections.iter().map(|entry| *entry.key()).collect()
        }

        async fn handles(&self) -> Vec<ConnectionHandle> {
            self.connections
                .iter()
                .map(|entry| entry.value().clone())
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryPresenceRegistry;
    use super::*;

    #[tokio::test]
    async fn last_connect_wins() {
        let registry = InMemoryPresenceRegistry::new();
        let user = UserId::generate();
        let (first, _rx1) = ConnectionHandle::channel(user, 4);
        let (second, _rx2) = ConnectionHandle::channel(user, 4);

        assert!(registry.register(first.clone()).await.is_none());
        let displaced = registry.register(second.clone()).await;
        assert_eq!(displaced.map(|h| h.id()), Some(first.id()));
        assert_eq!(registry.lookup(user).await.map(|h| h.id()), Some(second.id()));
    }

    #[tokio::test]
    async fn stale_disconnect_keeps_newer_connection() {
        let registry = InMemoryPresenceRegistry::new();
        let user = UserId::generate();
        let (old, _rx1) = ConnectionHandle::channel(user, 4);
        let (new, _rx2) = ConnectionHandle::channel(user, 4);

        registry.register(old.clone()).await;
        registry.register(new.clone()).await;

        assert!(!registry.unregister(user, old.id()).await);
        assert_eq!(registry.lookup(user).await.map(|h| h.id()), Some(new.id()));

        assert!(registry.unregister(user, new.id()).await);
        assert!(registry.lookup(user).await.is_none());
        assert!(registry.list_active().await.is_empty());
    }
}
