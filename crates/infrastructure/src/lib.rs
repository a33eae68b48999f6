//! 基础设施层：Postgres 存储、Redis 缓存与附件上传客户端

pub mod builder;
pub mod migrations;
pub mod redis_cache;
pub mod repository;
pub mod uploader;

pub use migrations::MIGRATOR;
pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use redis_cache::RedisCacheStore;
pub use repository::{
    create_pg_pool, PgGroupRepository, PgMessageRepository, PgReactionRepository, PgStorage,
    PgStoreHealth, PgUserRepository,
};
pub use uploader::{HttpAttachmentUploader, UploaderConfig};
