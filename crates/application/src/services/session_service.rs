use std::sync::Arc;

use domain::{GroupId, UserId, UserRepository};

use crate::{
    connection::ConnectionHandle,
    dispatch::DispatchEngine,
    error::ApplicationError,
    events::{ClientEvent, ServerEvent},
    membership::MembershipResolver,
    presence::PresenceRegistry,
    rooms::{room_name, RoomRegistry},
};

pub struct SessionServiceDependencies {
    pub presence: Arc<dyn PresenceRegistry>,
    pub user_repository: Arc<dyn UserRepository>,
    pub rooms: Arc<RoomRegistry>,
    pub membership: MembershipResolver,
    pub dispatcher: DispatchEngine,
}

/// 单个连接的会话状态机：连接、加入/离开房间、断开
pub struct SessionService {
    deps: SessionServiceDependencies,
}

impl SessionService {
    pub fn new(deps: SessionServiceDependencies) -> Self {
        Self { deps }
    }

    /// 注册在线状态并广播在线用户集合
    pub async fn connect(&self, handle: &ConnectionHandle) {
        if let Some(displaced) = self.deps.presence.register(handle.clone()).await {
            tracing::info!(
                user_id = %handle.user_id(),
                displaced_connection = %displaced.id(),
                "新连接覆盖了旧连接"
            );
        }
        self.deps.dispatcher.broadcast_presence().await;
    }

    /// 非成员的加入请求被静默忽略
    pub async fn join_room(
        &self,
        handle: &ConnectionHandle,
        group_id: GroupId,
    ) -> Result<bool, ApplicationError> {
        if !self
            .deps
            .membership
            .is_member(group_id, handle.user_id())
            .await?
        {
            tracing::debug!(
                user_id = %handle.user_id(),
                room = %room_name(group_id),
                "非成员加入房间请求已忽略"
            );
            return Ok(false);
        }

        self.deps.rooms.join(group_id, handle.clone());
        tracing::debug!(
            user_id = %handle.user_id(),
            room = %room_name(group_id),
            "加入房间"
        );
        Ok(true)
    }

    pub fn leave_room(&self, handle: &ConnectionHandle, group_id: GroupId) {
        self.deps.rooms.leave(group_id, handle.id());
        tracing::debug!(
            user_id = %handle.user_id(),
            room = %room_name(group_id),
            "离开房间"
        );
    }

    /// 先离开所有房间，再注销与该连接对应的在线状态
    pub async fn disconnect(&self, handle: &ConnectionHandle) {
        let left = self.deps.rooms.leave_all(handle.id());
        let removed = self
            .deps
            .presence
            .unregister(handle.user_id(), handle.id())
            .await;
        tracing::info!(
            user_id = %handle.user_id(),
            connection_id = %handle.id(),
            rooms_left = left.len(),
            "连接断开"
        );
        if removed {
            self.deps.dispatcher.broadcast_presence().await;
        }
    }

    /// 把输入状态转发给私聊对方；对方离线时直接丢弃
    pub async fn relay_typing(
        &self,
        handle: &ConnectionHandle,
        receiver_id: UserId,
        is_typing: bool,
    ) -> Result<(), ApplicationError> {
        let user_id = handle.user_id();
        if receiver_id == user_id {
            return Ok(());
        }
        let full_name = self
            .deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .map(|profile| profile.full_name)
            .unwrap_or_default();
        let report = self
            .deps
            .dispatcher
            .deliver_to_users(
                [receiver_id],
                ServerEvent::UserTyping {
                    user_id,
                    is_typing,
                    full_name,
                },
            )
            .await;
        tracing::trace!(
            user_id = %user_id,
            receiver_id = %receiver_id,
            is_typing,
            delivered = report.delivered,
            "转发输入状态"
        );
        Ok(())
    }

    pub async fn handle_client_event(
        &self,
        handle: &ConnectionHandle,
        event: ClientEvent,
    ) -> Result<(), ApplicationError> {
        match event {
            ClientEvent::JoinRoom { group_id } => {
                self.join_room(handle, group_id).await?;
            }
            ClientEvent::LeaveRoom { group_id } => {
                self.leave_room(handle, group_id);
            }
            ClientEvent::SendReactionAdded {
                target_message_id,
                emoji,
                target_kind,
            } => {
                tracing::debug!(
                    user_id = %handle.user_id(),
                    target_message_id = %target_message_id,
                    emoji = %emoji,
                    target_kind = ?target_kind,
                    "客户端上报表情回应"
                );
            }
            ClientEvent::PrivateTyping {
                receiver_id,
                is_typing,
            } => {
                self.relay_typing(handle, receiver_id, is_typing).await?;
            }
            ClientEvent::Ping => {
                if let Err(err) = handle.deliver(ServerEvent::Pong) {
                    tracing::debug!(user_id = %handle.user_id(), error = %err, "pong 发送失败");
                }
            }
        }
        Ok(())
    }
}
