//! Redis 缓存后端
//!
//! 带前缀的键写入时同步登记到 `cache_index:{prefix}` 集合，按前缀删除只访问该集合。
//! 前缀代数保存在 `cache_gen:{prefix}`，删除与递增在同一脚本内完成。

use std::time::Duration;

use application::{CacheError, CacheKey, CacheStore};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};

// KEYS: 索引, 代数  ARGV: 代数过期秒数
const DELETE_INDEXED: &str = r#"
local keys = redis.call('SMEMBERS', KEYS[1])
local removed = 0
for _, key in ipairs(keys) do
    removed = removed + redis.call('DEL', key)
end
redis.call('DEL', KEYS[1])
redis.call('INCR', KEYS[2])
redis.call('EXPIRE', KEYS[2], ARGV[1])
return removed
"#;

// KEYS: 缓存键, 索引, 代数  ARGV: 值, 缓存秒数, 索引秒数, 期望代数
const SET_IF_GENERATION: &str = r#"
local current = tonumber(redis.call('GET', KEYS[3]) or '0')
if current ~= tonumber(ARGV[4]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
redis.call('SADD', KEYS[2], KEYS[1])
redis.call('EXPIRE', KEYS[2], ARGV[3])
return 1
"#;

fn backend(err: redis::RedisError) -> CacheError {
    CacheError::backend(err.to_string())
}

fn index_key(prefix: &str) -> String {
    format!("cache_index:{prefix}")
}

fn generation_key(prefix: &str) -> String {
    format!("cache_gen:{prefix}")
}

fn secs(duration: Duration) -> u64 {
    duration.as_secs().max(1)
}

#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
    /// 索引集合与代数键的过期时间，需长于任何缓存项的 TTL
    index_ttl: Duration,
    delete_script: Script,
    fill_script: Script,
}

impl RedisCacheStore {
    pub async fn connect(url: &str, index_ttl: Duration) -> Result<Self, redis::RedisError> {
        let client = Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url = %url, "Redis 缓存连接已建立");
        Ok(Self {
            conn,
            index_ttl,
            delete_script: Script::new(DELETE_INDEXED),
            fill_script: Script::new(SET_IF_GENERATION),
        })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend)
    }

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(key.as_str(), value, secs(ttl))
            .ignore();
        if let Some(prefix) = key.prefix() {
            let index = index_key(prefix);
            pipe.sadd(&index, key.as_str())
                .ignore()
                .expire(&index, secs(self.index_ttl) as i64)
                .ignore();
        }
        let () = pipe.query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(backend)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .delete_script
            .key(index_key(prefix))
            .key(generation_key(prefix))
            .arg(secs(self.index_ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        tracing::debug!(prefix = %prefix, removed, "按前缀删除缓存");
        Ok(removed)
    }

    async fn generation(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let generation: Option<u64> = conn.get(generation_key(prefix)).await.map_err(backend)?;
        Ok(generation.unwrap_or(0))
    }

    async fn set_if_generation(
        &self,
        key: &CacheKey,
        value: String,
        ttl: Duration,
        generation: u64,
    ) -> Result<bool, CacheError> {
        let Some(prefix) = key.prefix() else {
            self.set(key, value, ttl).await?;
            return Ok(true);
        };
        let mut conn = self.conn.clone();
        let written: i64 = self
            .fill_script
            .key(key.as_str())
            .key(index_key(prefix))
            .key(generation_key(prefix))
            .arg(value)
            .arg(secs(ttl))
            .arg(secs(self.index_ttl))
            .arg(generation)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(written == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ConversationKey, UserId};
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::redis::Redis;

    #[tokio::test]
    #[ignore = "requires local docker daemon"]
    async fn prefix_delete_removes_only_indexed_keys() {
        let container = Redis::default().start().await.expect("start redis container");
        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("resolve redis port");
        let store = RedisCacheStore::connect(
            &format!("redis://127.0.0.1:{port}"),
            Duration::from_secs(3600),
        )
        .await
        .expect("connect redis");

        let conversation = ConversationKey::between(UserId::generate(), UserId::generate());
        let page = CacheKey::conversation_messages(&conversation);
        let contacts = CacheKey::contacts(UserId::generate());
        let ttl = Duration::from_secs(60);
        store.set(&page, "[1]".into(), ttl).await.unwrap();
        store.set(&contacts, "[2]".into(), ttl).await.unwrap();

        let removed = store
            .delete_by_prefix(&CacheKey::conversation_prefix(&conversation))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get(page.as_str()).await.unwrap(), None);
        assert_eq!(
            store.get(contacts.as_str()).await.unwrap().as_deref(),
            Some("[2]")
        );

        // 删除递增了代数，删除前的快照不能再回填
        let prefix = CacheKey::conversation_prefix(&conversation);
        assert_eq!(store.generation(&prefix).await.unwrap(), 1);
        assert!(!store
            .set_if_generation(&page, "[stale]".into(), ttl, 0)
            .await
            .unwrap());
        assert_eq!(store.get(page.as_str()).await.unwrap(), None);
        assert!(store
            .set_if_generation(&page, "[fresh]".into(), ttl, 1)
            .await
            .unwrap());
        assert_eq!(
            store.get(page.as_str()).await.unwrap().as_deref(),
            Some("[fresh]")
        );
    }
}
