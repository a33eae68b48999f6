//! 路由测试共享装配：内存存储 + 本地签发的令牌

#![allow(dead_code)]

use std::sync::Arc;

use application::cache::memory::MemoryCacheStore;
use application::memory::{
    MemoryGroupRepository, MemoryMessageRepository, MemoryReactionRepository,
    MemoryStoreHealth, MemoryUserRepository,
};
use application::{CacheSettings, SystemClock, UploadsDisabled};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use domain::{RepositoryError, RepositoryResult, StoreHealth};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;
use web_api::{router, AppState, Backends, Claims, JwtConfig, JwtService};

pub const SECRET: &str = "router-test-secret-with-enough-length";

pub struct TestApp {
    pub router: Router,
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

/// 模拟数据库不可达
pub struct DownStore;

#[async_trait]
impl StoreHealth for DownStore {
    async fn check(&self) -> RepositoryResult<()> {
        Err(RepositoryError::storage("connection refused"))
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store_health(Arc::new(MemoryStoreHealth))
    }

    pub fn with_store_health(store_health: Arc<dyn StoreHealth>) -> Self {
        let backends = Backends {
            message_repository: Arc::new(MemoryMessageRepository::new()),
            group_repository: Arc::new(MemoryGroupRepository::new()),
            user_repository: Arc::new(MemoryUserRepository::new()),
            reaction_repository: Arc::new(MemoryReactionRepository::new()),
            store_health,
            cache_store: Arc::new(MemoryCacheStore::new()),
            uploader: Arc::new(UploadsDisabled),
            clock: Arc::new(SystemClock),
        };
        let jwt = JwtService::new(&JwtConfig {
            secret: SECRET.to_string(),
            leeway_secs: 0,
        });
        let state = AppState::assemble(backends, CacheSettings::default(), jwt, 16);
        Self {
            router: router(state),
        }
    }

    /// 签发令牌并同步展示身份
    pub async fn user(&self, name: &str) -> TestUser {
        let id = Uuid::new_v4();
        let user = TestUser {
            id,
            token: token_for(id),
        };
        let (status, _) = self
            .send(
                Method::PUT,
                "/api/v1/users/me",
                Some(&user),
                Some(serde_json::json!({ "fullName": name })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        user
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        user: Option<&TestUser>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", user.token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

pub fn token_for(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token")
}
