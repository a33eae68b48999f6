//! 主应用程序入口
//!
//! 加载配置，装配存储、缓存与附件上传适配器，启动 Axum Web API 服务。

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use application::{
    cache::memory::MemoryCacheStore,
    memory::{
        MemoryGroupRepository, MemoryMessageRepository, MemoryReactionRepository,
        MemoryStoreHealth, MemoryUserRepository,
    },
    AttachmentUploader, CacheSettings, CacheStore, SystemClock, UploadsDisabled,
};
use config::{AppConfig, CacheConfig, StorageBackend};
use infrastructure::{
    HttpAttachmentUploader, Infrastructure, InfrastructureConfig, UploaderConfig,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, Backends, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let backends = build_backends(&config).await?;
    let jwt_service = JwtService::new(&config.jwt);
    let state = AppState::assemble(
        backends,
        cache_settings(&config.cache),
        jwt_service,
        config.delivery.outbox_capacity,
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("监听地址无效")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("消息服务启动在 http://{}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("消息服务已停止");
    Ok(())
}

async fn build_backends(config: &AppConfig) -> anyhow::Result<Backends> {
    let uploader = build_uploader(config)?;
    let clock = Arc::new(SystemClock);

    match config.storage.backend {
        StorageBackend::Postgres => {
            tracing::info!(
                "连接数据库: {}",
                config.database.url.split('@').next_back().unwrap_or("unknown")
            );
            let infra = Infrastructure::connect(InfrastructureConfig {
                database_url: config.database.url.clone(),
                max_connections: config.database.max_connections,
                redis_url: config.redis.url.clone(),
                cache_index_ttl: config.cache.index_ttl(),
            })
            .await?;

            let cache_store: Arc<dyn CacheStore> = match infra.cache_store {
                Some(store) => store,
                None => {
                    tracing::warn!("未配置 Redis，使用进程内缓存");
                    Arc::new(MemoryCacheStore::new())
                }
            };
            let storage = infra.storage;
            Ok(Backends {
                message_repository: storage.message_repository.clone(),
                group_repository: storage.group_repository.clone(),
                user_repository: storage.user_repository.clone(),
                reaction_repository: storage.reaction_repository.clone(),
                store_health: storage.health.clone(),
                cache_store,
                uploader,
                clock,
            })
        }
        StorageBackend::Memory => {
            tracing::warn!("使用内存存储，重启后数据丢失");
            Ok(Backends {
                message_repository: Arc::new(MemoryMessageRepository::new()),
                group_repository: Arc::new(MemoryGroupRepository::new()),
                user_repository: Arc::new(MemoryUserRepository::new()),
                reaction_repository: Arc::new(MemoryReactionRepository::new()),
                store_health: Arc::new(MemoryStoreHealth),
                cache_store: Arc::new(MemoryCacheStore::new()),
                uploader,
                clock,
            })
        }
    }
}

fn build_uploader(config: &AppConfig) -> anyhow::Result<Arc<dyn AttachmentUploader>> {
    match &config.upload.base_url {
        Some(base_url) => {
            let uploader = HttpAttachmentUploader::new(UploaderConfig {
                base_url: base_url.clone(),
                timeout: config.upload.timeout(),
            })
            .context("创建附件上传客户端失败")?;
            Ok(Arc::new(uploader))
        }
        None => {
            tracing::warn!("未配置附件上传服务，内联附件将被拒绝");
            Ok(Arc::new(UploadsDisabled))
        }
    }
}

fn cache_settings(config: &CacheConfig) -> CacheSettings {
    CacheSettings {
        op_timeout: config.op_timeout(),
        conversation_ttl: config.conversation_ttl(),
        group_page_ttl: config.group_page_ttl(),
        contacts_ttl: config.contacts_ttl(),
        short_ttl: config.short_ttl(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "监听退出信号失败");
    }
    tracing::info!("收到退出信号，开始关闭");
}
