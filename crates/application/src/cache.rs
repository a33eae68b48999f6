//! 读穿透缓存层
//!
//! 缓存只是加速手段：任何缓存错误或超时都降级为未命中或跳过写入，绝不让请求失败。
//! 按前缀删除依赖写入时同步维护的前缀索引，不做全键空间扫描。

use std::time::Duration;

use async_trait::async_trait;
use domain::{ConversationKey, GroupId, UserId};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache value could not be encoded: {0}")]
    Encoding(String),
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// 命名空间化的缓存键。带前缀的键在写入时会登记到该前缀的索引里。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    prefix: Option<String>,
}

impl CacheKey {
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            prefix: None,
        }
    }

    fn scoped(prefix: String, suffix: &str) -> Self {
        Self {
            key: format!("{prefix}{suffix}"),
            prefix: Some(prefix),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn conversation_prefix(key: &ConversationKey) -> String {
        format!("conv:{key}:")
    }

    /// 私聊会话第一页
    pub fn conversation_messages(key: &ConversationKey) -> Self {
        Self::scoped(Self::conversation_prefix(key), "msgs")
    }

    pub fn group_pages_prefix(group_id: GroupId) -> String {
        format!("group_messages:{group_id}:")
    }

    pub fn group_page(group_id: GroupId, page: u32) -> Self {
        Self::scoped(Self::group_pages_prefix(group_id), &format!("page_{page}"))
    }

    pub fn group_scope_prefix(group_id: GroupId) -> String {
        format!("group:{group_id}:")
    }

    /// 按用户区分的群聊第一页
    pub fn group_user_messages(group_id: GroupId, user_id: UserId) -> Self {
        Self::scoped(
            Self::group_scope_prefix(group_id),
            &format!("user:{user_id}:messages"),
        )
    }

    pub fn contacts(user_id: UserId) -> Self {
        Self::plain(format!("contacts:{user_id}"))
    }

    pub fn chat_partners(user_id: UserId) -> Self {
        Self::plain(format!("chat_partners:{user_id}"))
    }

    pub fn user_groups(user_id: UserId) -> Self {
        Self::plain(format!("user_groups:{user_id}"))
    }
}

/// 键值缓存后端
///
/// 每个前缀带一个失效代数，`delete_by_prefix` 会原子地递增它。
/// 读穿透回填先记下代数，回填时代数已变说明期间发生过失效，写入必须放弃。
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// 删除登记在该前缀索引下的所有键并递增该前缀的代数，返回删除数量
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
    /// 前缀当前的失效代数
    async fn generation(&self, prefix: &str) -> Result<u64, CacheError>;
    /// 仅当键所属前缀的代数仍等于 `generation` 时写入，返回是否写入
    async fn set_if_generation(
        &self,
        key: &CacheKey,
        value: String,
        ttl: Duration,
        generation: u64,
    ) -> Result<bool, CacheError>;
}

/// 读穿透开始时记下的前缀代数；读取失败时为空，回填随之跳过
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot(Option<u64>);

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub op_timeout: Duration,
    pub conversation_ttl: Duration,
    pub group_page_ttl: Duration,
    pub contacts_ttl: Duration,
    pub short_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_millis(200),
            conversation_ttl: Duration::from_secs(1800),
            group_page_ttl: Duration::from_secs(900),
            contacts_ttl: Duration::from_secs(1800),
            short_ttl: Duration::from_secs(300),
        }
    }
}

/// 带超时与降级语义的缓存门面，服务层只通过它访问缓存
#[derive(Clone)]
pub struct MessageCache {
    store: std::sync::Arc<dyn CacheStore>,
    settings: CacheSettings,
}

impl MessageCache {
    pub fn new(store: std::sync::Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = match tokio::time::timeout(self.settings.op_timeout, self.store.get(key.as_str()))
            .await
        {
            Ok(Ok(raw)) => raw?,
            Ok(Err(err)) => {
                tracing::warn!(key = key.as_str(), error = %err, "缓存读取失败，按未命中处理");
                return None;
            }
            Err(_) => {
                tracing::warn!(key = key.as_str(), "缓存读取超时，按未命中处理");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key = key.as_str(), error = %err, "缓存值无法解析，按未命中处理");
                None
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key = key.as_str(), error = %err, "缓存值序列化失败，跳过写入");
                return;
            }
        };

        match tokio::time::timeout(self.settings.op_timeout, self.store.set(key, raw, ttl)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(key = key.as_str(), error = %err, "缓存写入失败，已跳过");
            }
            Err(_) => {
                tracing::warn!(key = key.as_str(), "缓存写入超时，已跳过");
            }
        }
    }

    /// 在读取存储之前调用，记下键所属前缀的代数
    pub async fn snapshot(&self, key: &CacheKey) -> Snapshot {
        let Some(prefix) = key.prefix() else {
            return Snapshot(None);
        };
        match tokio::time::timeout(self.settings.op_timeout, self.store.generation(prefix)).await {
            Ok(Ok(generation)) => Snapshot(Some(generation)),
            Ok(Err(err)) => {
                tracing::warn!(prefix, error = %err, "读取缓存代数失败，本次不回填");
                Snapshot(None)
            }
            Err(_) => {
                tracing::warn!(prefix, "读取缓存代数超时，本次不回填");
                Snapshot(None)
            }
        }
    }

    /// 回填读穿透结果；快照之后发生过失效则放弃写入，避免旧页面覆盖失效
    pub async fn fill_json<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
        snapshot: Snapshot,
    ) {
        let Snapshot(Some(generation)) = snapshot else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key = key.as_str(), error = %err, "缓存值序列化失败，跳过写入");
                return;
            }
        };

        let write = self.store.set_if_generation(key, raw, ttl, generation);
        match tokio::time::timeout(self.settings.op_timeout, write).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                tracing::debug!(key = key.as_str(), "读取期间缓存已失效，放弃回填");
            }
            Ok(Err(err)) => {
                tracing::warn!(key = key.as_str(), error = %err, "缓存写入失败，已跳过");
            }
            Err(_) => {
                tracing::warn!(key = key.as_str(), "缓存写入超时，已跳过");
            }
        }
    }

    pub async fn delete(&self, key: &CacheKey) {
        match tokio::time::timeout(self.settings.op_timeout, self.store.delete(key.as_str())).await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(key = key.as_str(), error = %err, "缓存删除失败");
            }
            Err(_) => {
                tracing::warn!(key = key.as_str(), "缓存删除超时");
            }
        }
    }

    pub async fn invalidate_prefix(&self, prefix: &str) {
        match tokio::time::timeout(self.settings.op_timeout, self.store.delete_by_prefix(prefix))
            .await
        {
            Ok(Ok(removed)) => {
                tracing::debug!(prefix, removed, "缓存前缀失效完成");
            }
            Ok(Err(err)) => {
                tracing::warn!(prefix, error = %err, "缓存前缀失效失败");
            }
            Err(_) => {
                tracing::warn!(prefix, "缓存前缀失效超时");
            }
        }
    }

    /// 会话有新消息后删除其全部缓存页
    pub async fn invalidate_conversation(&self, key: &ConversationKey) {
        self.invalidate_prefix(&CacheKey::conversation_prefix(key))
            .await;
    }

    /// 群组有新消息或成员变化后删除其全部缓存页
    pub async fn invalidate_group(&self, group_id: GroupId) {
        self.invalidate_prefix(&CacheKey::group_pages_prefix(group_id))
            .await;
        self.invalidate_prefix(&CacheKey::group_scope_prefix(group_id))
            .await;
    }
}

pub mod memory {
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::RwLock;
    use tokio::time::Instant;

    use super::{CacheError, CacheKey, CacheStore};

    /// 每写入这么多次顺带清理一次过期项
    pub const SWEEP_EVERY: u32 = 256;

    struct Entry {
        value: String,
        expires_at: Instant,
        prefix: Option<String>,
    }

    #[derive(Default)]
    struct Inner {
        entries: HashMap<String, Entry>,
        prefix_index: HashMap<String, HashSet<String>>,
        /// 只保存发生过失效、且仍有存活键的前缀
        generations: HashMap<String, u64>,
        /// 全局递增的代数来源
        counter: u64,
        /// 未登记前缀读到的代数；清理代数表时抬高到 `counter`，旧快照因此全部失配
        floor: u64,
        writes_since_sweep: u32,
    }

    impl Inner {
        fn generation(&self, prefix: &str) -> u64 {
            self.generations.get(prefix).copied().unwrap_or(self.floor)
        }

        fn insert(&mut self, key: &CacheKey, value: String, ttl: Duration) {
            let prefix = key.prefix().map(str::to_owned);
            if let Some(prefix) = &prefix {
                self.prefix_index
                    .entry(prefix.clone())
                    .or_default()
                    .insert(key.as_str().to_owned());
            }
            self.entries.insert(
                key.as_str().to_owned(),
                Entry {
                    value,
                    expires_at: Instant::now() + ttl,
                    prefix,
                },
            );

            self.writes_since_sweep += 1;
            if self.writes_since_sweep >= SWEEP_EVERY {
                self.sweep(Instant::now());
            }
        }

        fn remove(&mut self, key: &str) -> bool {
            let Some(entry) = self.entries.remove(key) else {
                return false;
            };
            if let Some(prefix) = entry.prefix {
                if let Some(keys) = self.prefix_index.get_mut(&prefix) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.prefix_index.remove(&prefix);
                    }
                }
            }
            true
        }

        fn sweep(&mut self, now: Instant) {
            self.writes_since_sweep = 0;
            let expired: Vec<String> = self
                .entries
                .iter()
                .filter(|(_, entry)| entry.expires_at <= now)
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                self.remove(&key);
            }

            let before = self.generations.len();
            let index = &self.prefix_index;
            self.generations.retain(|prefix, _| index.contains_key(prefix));
            if self.generations.len() != before {
                self.floor = self.counter;
            }
        }
    }

    /// 进程内缓存；过期项在读取时或每隔若干次写入时清理
    #[derive(Default)]
    pub struct MemoryCacheStore {
        inner: RwLock<Inner>,
    }

    impl MemoryCacheStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn len(&self) -> usize {
            let now = Instant::now();
            self.inner
                .read()
                .await
                .entries
                .values()
                .filter(|entry| entry.expires_at > now)
                .count()
        }

        pub async fn is_empty(&self) -> bool {
            self.len().await == 0
        }

        /// 仍占用内存的条目数与索引登记数，含尚未清理的过期项
        pub async fn tracked(&self) -> (usize, usize) {
            let inner = self.inner.read().await;
            (
                inner.entries.len(),
                inner.prefix_index.values().map(HashSet::len).sum(),
            )
        }
    }

    #[async_trait]
    impl CacheStore for MemoryCacheStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            let now = Instant::now();
            {
                let inner = self.inner.read().await;
                match inner.entries.get(key) {
                    Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                    None => return Ok(None),
                    Some(_) => {}
                }
            }

            let mut inner = self.inner.write().await;
            if matches!(inner.entries.get(key), Some(entry) if entry.expires_at <= now) {
                inner.remove(key);
            }
            Ok(None)
        }

        async fn set(
            &self,
            key: &CacheKey,
            value: String,
            ttl: Duration,
        ) -> Result<(), CacheError> {
            self.inner.write().await.insert(key, value, ttl);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.inner.write().await.remove(key);
            Ok(())
        }

        async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
            let mut inner = self.inner.write().await;
            inner.counter += 1;
            let generation = inner.counter;
            inner.generations.insert(prefix.to_owned(), generation);

            let Some(keys) = inner.prefix_index.remove(prefix) else {
                return Ok(0);
            };
            let mut removed = 0;
            for key in keys {
                if inner.entries.remove(&key).is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        }

        async fn generation(&self, prefix: &str) -> Result<u64, CacheError> {
            Ok(self.inner.read().await.generation(prefix))
        }

        async fn set_if_generation(
            &self,
            key: &CacheKey,
            value: String,
            ttl: Duration,
            generation: u64,
        ) -> Result<bool, CacheError> {
            let mut inner = self.inner.write().await;
            if let Some(prefix) = key.prefix() {
                if inner.generation(prefix) != generation {
                    return Ok(false);
                }
            }
            inner.insert(key, value, ttl);
            Ok(true)
        }
    }
}
