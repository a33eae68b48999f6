//! 统一配置中心
//!
//! 加载顺序：内置默认值 -> 可选的 YAML 文件 -> `COURIER_` 前缀的环境变量（`__` 表示嵌套）。
//! 例如 `COURIER_DATABASE__URL` 覆盖 `database.url`。

use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const ENV_PREFIX: &str = "COURIER_";
pub const CONFIG_FILE_ENV: &str = "COURIER_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "courier.yaml";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[validate(nested)]
    pub cache: CacheConfig,
    #[validate(nested)]
    pub delivery: DeliveryConfig,
    #[validate(nested)]
    pub jwt: JwtConfig,
    #[serde(default)]
    #[validate(nested)]
    pub upload: UploadConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    pub url: String,
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

/// 未配置 url 时使用进程内缓存
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

/// 缓存时长，单位秒；操作超时单位毫秒
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    #[validate(range(min = 1))]
    pub op_timeout_ms: u64,
    #[validate(range(min = 1))]
    pub conversation_ttl_secs: u64,
    #[validate(range(min = 1))]
    pub group_page_ttl_secs: u64,
    #[validate(range(min = 1))]
    pub contacts_ttl_secs: u64,
    #[validate(range(min = 1))]
    pub short_ttl_secs: u64,
    /// 前缀索引的过期时间，必须长于所有缓存项
    #[validate(range(min = 1))]
    pub index_ttl_secs: u64,
}

impl CacheConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn conversation_ttl(&self) -> Duration {
        Duration::from_secs(self.conversation_ttl_secs)
    }

    pub fn group_page_ttl(&self) -> Duration {
        Duration::from_secs(self.group_page_ttl_secs)
    }

    pub fn contacts_ttl(&self) -> Duration {
        Duration::from_secs(self.contacts_ttl_secs)
    }

    pub fn short_ttl(&self) -> Duration {
        Duration::from_secs(self.short_ttl_secs)
    }

    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_secs)
    }

    fn longest_entry_ttl(&self) -> u64 {
        [
            self.conversation_ttl_secs,
            self.group_page_ttl_secs,
            self.contacts_ttl_secs,
            self.short_ttl_secs,
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeliveryConfig {
    /// 每个连接的出站队列长度
    #[validate(range(min = 1, max = 65536))]
    pub outbox_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JwtConfig {
    #[validate(length(min = 32))]
    pub secret: String,
    #[serde(default)]
    pub leeway_secs: u64,
}

/// 未配置 base_url 时只接受客户端预先上传的附件 URL
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UploadConfig {
    #[validate(url)]
    pub base_url: Option<String>,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 10,
        }
    }
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// 单进程开发模式，重启即丢失
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 10,
            },
            redis: RedisConfig::default(),
            cache: CacheConfig {
                op_timeout_ms: 200,
                conversation_ttl_secs: 1800,
                group_page_ttl_secs: 900,
                contacts_ttl_secs: 1800,
                short_ttl_secs: 300,
                index_ttl_secs: 3600,
            },
            delivery: DeliveryConfig {
                outbox_capacity: 64,
            },
            jwt: JwtConfig {
                secret: String::new(),
                leeway_secs: 0,
            },
            upload: UploadConfig::default(),
            storage: StorageConfig {
                backend: StorageBackend::Memory,
            },
        }
    }
}

impl AppConfig {
    /// 默认值 -> 配置文件（`COURIER_CONFIG_FILE`，缺省 `courier.yaml`，不存在则跳过）-> 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_figment(Self::figment(&path))
    }

    pub fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["CONFIG_FILE"]).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate_all()?;
        Ok(config)
    }

    /// 字段校验加上跨字段约束
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if self.storage.backend == StorageBackend::Postgres && self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "database.url is required for the postgres backend".into(),
            ));
        }
        if self.cache.index_ttl_secs <= self.cache.longest_entry_ttl() {
            return Err(ConfigError::Invalid(
                "cache.index_ttl_secs must exceed every entry ttl".into(),
            ));
        }
        if self.jwt.secret.contains("change-me") {
            return Err(ConfigError::Invalid(
                "jwt.secret still holds the placeholder value".into(),
            ));
        }
        Ok(())
    }

    /// 日志用的脱敏表示
    pub fn sanitize(&self) -> String {
        let mut redacted = self.clone();
        if !redacted.database.url.is_empty() {
            redacted.database.url = "[REDACTED]".into();
        }
        redacted.jwt.secret = "[REDACTED]".into();
        format!("{redacted:?}")
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const SECRET: &str = "an-adequately-long-signing-secret-value";

    #[test]
    fn defaults_need_a_jwt_secret() {
        Jail::expect_with(|_jail| {
            let result = AppConfig::from_figment(AppConfig::figment("missing.yaml"));
            assert!(matches!(result, Err(ConfigError::Validation(_))));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file_and_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "courier.yaml",
                r#"
server:
  port: 9000
cache:
  group_page_ttl_secs: 600
storage:
  backend: postgres
"#,
            )?;
            jail.set_env("COURIER_JWT__SECRET", SECRET);
            jail.set_env("COURIER_DATABASE__URL", "postgres://db/courier");
            jail.set_env("COURIER_SERVER__PORT", "9100");

            let config = AppConfig::from_figment(AppConfig::figment("courier.yaml"))
                .expect("valid config");
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.cache.group_page_ttl(), Duration::from_secs(600));
            assert_eq!(config.cache.conversation_ttl(), Duration::from_secs(1800));
            assert_eq!(config.cache.op_timeout(), Duration::from_millis(200));
            assert_eq!(config.storage.backend, StorageBackend::Postgres);
            assert_eq!(config.database.url, "postgres://db/courier");
            Ok(())
        });
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        Jail::expect_with(|jail| {
            jail.set_env("COURIER_JWT__SECRET", SECRET);
            jail.set_env("COURIER_STORAGE__BACKEND", "postgres");

            let result = AppConfig::from_figment(AppConfig::figment("courier.yaml"));
            assert!(matches!(result, Err(ConfigError::Invalid(_))));
            Ok(())
        });
    }

    #[test]
    fn index_ttl_must_outlive_entries() {
        let mut config = AppConfig::default();
        config.jwt.secret = SECRET.into();
        assert!(config.validate_all().is_ok());

        config.cache.index_ttl_secs = 900;
        assert!(matches!(
            config.validate_all(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn sanitize_hides_secrets() {
        let mut config = AppConfig::default();
        config.jwt.secret = SECRET.into();
        config.database.url = "postgres://user:pw@db/courier".into();

        let text = config.sanitize();
        assert!(!text.contains(SECRET));
        assert!(!text.contains("user:pw"));
    }
}
