use std::collections::BTreeMap;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use validator::Validate;

use application::{
    AddReactionRequest, AttachmentSource, BulkReactions, CreateGroupRequest, FetchMessagesRequest,
    GroupMessageView, GroupView, MemberChangeRequest, MessagePage, MessageScope, MessagesPage,
    PrivateMessageView, ReactionGroups, ReactionSelector, ReactionView, RemoveReactionRequest,
    SendGroupMessageRequest, SendPrivateMessageRequest,
};
use domain::{
    AttachmentKind, GroupId, MessageId, Pagination, ReactionId, TargetKind, UserId, UserProfile,
};

use crate::{auth::AuthUser, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

/// 附件：已上传的 URL，或 base64 内联数据
#[derive(Debug, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
enum AttachmentPayload {
    Uploaded {
        url: String,
        kind: Option<AttachmentKind>,
        file_name: Option<String>,
        file_size: Option<u64>,
    },
    Inline {
        data: String,
        file_name: Option<String>,
        content_type: Option<String>,
    },
}

impl From<AttachmentPayload> for AttachmentSource {
    fn from(payload: AttachmentPayload) -> Self {
        match payload {
            AttachmentPayload::Uploaded {
                url,
                kind,
                file_name,
                file_size,
            } => {
                let kind = kind.unwrap_or_else(|| {
                    AttachmentKind::detect(None, Some(file_name.as_deref().unwrap_or(&url)))
                });
                AttachmentSource::Uploaded {
                    url,
                    kind,
                    file_name,
                    file_size,
                }
            }
            AttachmentPayload::Inline {
                data,
                file_name,
                content_type,
            } => AttachmentSource::Inline {
                data,
                file_name,
                content_type,
            },
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ProfilePayload {
    #[validate(length(min = 1, max = 100))]
    full_name: String,
    #[validate(url)]
    profile_pic: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SendPrivatePayload {
    receiver_id: Uuid,
    #[validate(length(max = 2000))]
    text: Option<String>,
    attachment: Option<AttachmentPayload>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SendGroupPayload {
    text: Option<String>,
    attachment: Option<AttachmentPayload>,
    #[validate(length(min = 1, max = 128))]
    client_message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

impl PageQuery {
    fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateGroupPayload {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberPayload {
    user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct AddReactionPayload {
    target_message_id: Uuid,
    target_kind: TargetKind,
    #[validate(length(min = 1, max = 32))]
    emoji: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetKindQuery {
    target_kind: TargetKind,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct BulkReactionsPayload {
    #[validate(length(max = 500))]
    message_ids: Vec<String>,
    target_kind: TargetKind,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct BulkConversationsPayload {
    #[validate(length(min = 1, max = 20))]
    conversation_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BulkConversationsResponse {
    conversations: BTreeMap<String, MessagePage<PrivateMessageView>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresenceResponse {
    active_user_ids: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", put(sync_profile))
        .route("/contacts", get(list_contacts))
        .route("/chat-partners", get(list_chat_partners))
        .route("/presence", get(list_active))
        .route("/messages/private", post(send_private_message))
        .route("/messages/bulk", post(bulk_conversations))
        .route("/conversations/{peer_id}/messages", get(conversation_page))
        .route("/groups", post(create_group).get(list_user_groups))
        .route("/groups/{group_id}", get(get_group).delete(deactivate_group))
        .route("/groups/{group_id}/members", post(add_member))
        .route("/groups/{group_id}/members/{user_id}", delete(remove_member))
        .route("/groups/{group_id}/leave", post(leave_group))
        .route("/groups/{group_id}/admin", post(transfer_admin))
        .route(
            "/groups/{group_id}/messages",
            post(send_group_message).get(group_page),
        )
        .route("/reactions", post(add_reaction))
        .route("/reactions/bulk", post(bulk_reactions))
        .route("/reactions/{reaction_id}", delete(remove_reaction_by_id))
        .route("/messages/{message_id}/reactions", get(get_reactions))
        .route(
            "/messages/{message_id}/reactions/{emoji}",
            delete(remove_reaction_by_target),
        )
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.store_health.check().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ok" })),
        Err(err) => {
            tracing::error!(error = %err, "健康检查失败：存储不可用");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                }),
            )
        }
    }
}

async fn sync_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ProfilePayload>,
) -> Result<Json<UserProfile>, ApiError> {
    payload.validate()?;
    let profile = state
        .message_service
        .sync_profile(user_id, payload.full_name, payload.profile_pic)
        .await?;
    Ok(Json(profile))
}

async fn list_contacts(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    Ok(Json(state.message_service.list_contacts(user_id).await?))
}

async fn list_chat_partners(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    Ok(Json(state.message_service.list_chat_partners(user_id).await?))
}

async fn list_active(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Json<PresenceResponse> {
    let active_user_ids = state.presence.list_active().await.into_iter().collect();
    Json(PresenceResponse { active_user_ids })
}

async fn send_private_message(
    State(state): State<AppState>,
    AuthUser(sender_id): AuthUser,
    Json(payload): Json<SendPrivatePayload>,
) -> Result<(StatusCode, Json<PrivateMessageView>), ApiError> {
    payload.validate()?;
    let view = state
        .message_service
        .send_private_message(SendPrivateMessageRequest {
            sender_id,
            receiver_id: UserId::from(payload.receiver_id),
            text: payload.text,
            attachment: payload.attachment.map(AttachmentSource::from),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// 会话列表预加载：一次取回多个会话的第一页
async fn bulk_conversations(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Json(payload): Json<BulkConversationsPayload>,
) -> Result<Json<BulkConversationsResponse>, ApiError> {
    payload.validate()?;
    let conversations = state
        .message_service
        .fetch_first_pages(viewer, &payload.conversation_ids)
        .await?;
    Ok(Json(BulkConversationsResponse { conversations }))
}

async fn conversation_page(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Path(peer_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<MessagesPage>, ApiError> {
    let page = state
        .message_service
        .fetch_messages_page(FetchMessagesRequest {
            viewer,
            scope: MessageScope::Conversation {
                peer: UserId::from(peer_id),
            },
            pagination: query.pagination(),
        })
        .await?;
    Ok(Json(page))
}

async fn create_group(
    State(state): State<AppState>,
    AuthUser(creator_id): AuthUser,
    Json(payload): Json<CreateGroupPayload>,
) -> Result<(StatusCode, Json<GroupView>), ApiError> {
    payload.validate()?;
    let view = state
        .group_service
        .create_group(CreateGroupRequest {
            creator_id,
            name: payload.name,
            member_ids: payload.member_ids.into_iter().map(UserId::from).collect(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_user_groups(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<GroupView>>, ApiError> {
    Ok(Json(state.group_service.list_user_groups(user_id).await?))
}

async fn get_group(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupView>, ApiError> {
    let view = state
        .group_service
        .get_group(GroupId::from(group_id), viewer)
        .await?;
    Ok(Json(view))
}

async fn deactivate_group(
    State(state): State<AppState>,
    AuthUser(operator_id): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .group_service
        .deactivate_group(GroupId::from(group_id), operator_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_member(
    State(state): State<AppState>,
    AuthUser(operator_id): AuthUser,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<MemberPayload>,
) -> Result<Json<GroupView>, ApiError> {
    let view = state
        .group_service
        .add_member(MemberChangeRequest {
            group_id: GroupId::from(group_id),
            operator_id,
            target_user_id: UserId::from(payload.user_id),
        })
        .await?;
    Ok(Json(view))
}

async fn remove_member(
    State(state): State<AppState>,
    AuthUser(operator_id): AuthUser,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GroupView>, ApiError> {
    let view = state
        .group_service
        .remove_member(MemberChangeRequest {
            group_id: GroupId::from(group_id),
            operator_id,
            target_user_id: UserId::from(user_id),
        })
        .await?;
    Ok(Json(view))
}

async fn leave_group(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .group_service
        .leave_group(GroupId::from(group_id), user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn transfer_admin(
    State(state): State<AppState>,
    AuthUser(operator_id): AuthUser,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<MemberPayload>,
) -> Result<Json<GroupView>, ApiError> {
    let view = state
        .group_service
        .transfer_admin(MemberChangeRequest {
            group_id: GroupId::from(group_id),
            operator_id,
            target_user_id: UserId::from(payload.user_id),
        })
        .await?;
    Ok(Json(view))
}

async fn send_group_message(
    State(state): State<AppState>,
    AuthUser(sender_id): AuthUser,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<SendGroupPayload>,
) -> Result<(StatusCode, Json<GroupMessageView>), ApiError> {
    payload.validate()?;
    let view = state
        .message_service
        .send_group_message(SendGroupMessageRequest {
            sender_id,
            group_id: GroupId::from(group_id),
            text: payload.text,
            attachment: payload.attachment.map(AttachmentSource::from),
            client_message_id: payload.client_message_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn group_page(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Path(group_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<MessagesPage>, ApiError> {
    let page = state
        .message_service
        .fetch_messages_page(FetchMessagesRequest {
            viewer,
            scope: MessageScope::Group {
                group_id: GroupId::from(group_id),
            },
            pagination: query.pagination(),
        })
        .await?;
    Ok(Json(page))
}

async fn add_reaction(
    State(state): State<AppState>,
    AuthUser(actor_id): AuthUser,
    Json(payload): Json<AddReactionPayload>,
) -> Result<(StatusCode, Json<ReactionView>), ApiError> {
    payload.validate()?;
    let view = state
        .reaction_service
        .add_reaction(AddReactionRequest {
            actor_id,
            target_message_id: MessageId::from(payload.target_message_id),
            target_kind: payload.target_kind,
            emoji: payload.emoji,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn remove_reaction_by_id(
    State(state): State<AppState>,
    AuthUser(actor_id): AuthUser,
    Path(reaction_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .reaction_service
        .remove_reaction(RemoveReactionRequest {
            actor_id,
            selector: ReactionSelector::ById(ReactionId::from(reaction_id)),
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_reaction_by_target(
    State(state): State<AppState>,
    AuthUser(actor_id): AuthUser,
    Path((message_id, emoji)): Path<(Uuid, String)>,
    Query(query): Query<TargetKindQuery>,
) -> Result<StatusCode, ApiError> {
    state
        .reaction_service
        .remove_reaction(RemoveReactionRequest {
            actor_id,
            selector: ReactionSelector::ByTarget {
                target_message_id: MessageId::from(message_id),
                target_kind: query.target_kind,
                emoji,
            },
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_reactions(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(message_id): Path<Uuid>,
    Query(query): Query<TargetKindQuery>,
) -> Result<Json<ReactionGroups>, ApiError> {
    let groups = state
        .reaction_service
        .get_reactions(MessageId::from(message_id), query.target_kind)
        .await?;
    Ok(Json(groups))
}

/// 乐观回显使用的临时 ID（如 `temp-…`）不是合法的消息 ID，直接丢弃
async fn bulk_reactions(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(payload): Json<BulkReactionsPayload>,
) -> Result<Json<BulkReactions>, ApiError> {
    payload.validate()?;
    let mut ids: Vec<MessageId> = payload
        .message_ids
        .iter()
        .filter_map(|raw| raw.parse::<MessageId>().ok())
        .collect();
    ids.sort();
    ids.dedup();

    let bulk = state
        .reaction_service
        .get_reactions_for_many(&ids, payload.target_kind)
        .await?;
    Ok(Json(bulk))
}

/// 浏览器无法为 WebSocket 设置请求头，令牌也可以放在 `token` 查询参数里
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = match query.token.as_deref() {
        Some(token) => UserId::from(state.jwt_service.verify_token(token)?.sub),
        None => state.jwt_service.extract_user_from_headers(&headers)?,
    };

    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state, user_id).run()))
}
