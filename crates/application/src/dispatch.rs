//! 分发引擎
//!
//! 为刚持久化的消息或回应事件计算精确的在线接收连接并投递。
//! 单个连接投递失败只记录日志并立即重试一次，不回滚持久化，也不阻塞其他接收者。

use std::collections::BTreeSet;
use std::sync::Arc;

use domain::{GroupId, UserId};

use crate::connection::{ConnectionHandle, DeliveryError};
use crate::dto::{GroupMessageView, PrivateMessageView};
use crate::error::ApplicationError;
use crate::events::ServerEvent;
use crate::membership::MembershipResolver;
use crate::presence::PresenceRegistry;
use crate::rooms::{room_name, RoomRegistry};

/// 一次分发的结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub retried: usize,
    pub dropped: usize,
    pub offline: usize,
}

impl DispatchReport {
    fn merge(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Delivered => self.delivered += 1,
            Outcome::DeliveredOnRetry => {
                self.delivered += 1;
                self.retried += 1;
            }
            Outcome::Dropped { retried } => {
                self.dropped += 1;
                if retried {
                    self.retried += 1;
                }
            }
        }
    }
}

enum Outcome {
    Delivered,
    DeliveredOnRetry,
    Dropped { retried: bool },
}

#[derive(Clone)]
pub struct DispatchEngine {
    presence: Arc<dyn PresenceRegistry>,
    rooms: Arc<RoomRegistry>,
    membership: MembershipResolver,
}

impl DispatchEngine {
    pub fn new(
        presence: Arc<dyn PresenceRegistry>,
        rooms: Arc<RoomRegistry>,
        membership: MembershipResolver,
    ) -> Self {
        Self {
            presence,
            rooms,
            membership,
        }
    }

    /// 私聊只投递给接收者；离线时什么都不做，由其后续拉取历史获得
    pub async fn dispatch_private(&self, message: &PrivateMessageView) -> DispatchReport {
        let receiver = message.receiver.id;
        let report = self
            .deliver_to_users(
                [receiver],
                ServerEvent::NewPrivateMessage {
                    message: message.clone(),
                },
            )
            .await;
        tracing::debug!(
            message_id = %message.id,
            receiver_id = %receiver,
            delivered = report.delivered,
            "私聊消息分发完成"
        );
        report
    }

    /// 群聊投递给除发送者外的所有当前授权成员，成员集合每次实时解析
    pub async fn dispatch_group(
        &self,
        message: &GroupMessageView,
    ) -> Result<DispatchReport, ApplicationError> {
        let recipients = self
            .membership
            .authorized_members_excluding(message.group_id, message.sender.id)
            .await?;
        let report = self
            .deliver_to_users(
                recipients,
                ServerEvent::NewGroupMessage {
                    message: message.clone(),
                },
            )
            .await;
        tracing::debug!(
            message_id = %message.id,
            group_id = %message.group_id,
            delivered = report.delivered,
            offline = report.offline,
            "群聊消息分发完成"
        );
        Ok(report)
    }

    /// 按用户投递，每个用户至多一次
    pub async fn deliver_to_users(
        &self,
        users: impl IntoIterator<Item = UserId>,
        event: ServerEvent,
    ) -> DispatchReport {
        let users: BTreeSet<UserId> = users.into_iter().collect();
        let mut report = DispatchReport::default();
        for user_id in users {
            match self.presence.lookup(user_id).await {
                Some(handle) => report.merge(deliver_with_retry(&handle, event.clone()).await),
                None => report.offline += 1,
            }
        }
        report
    }

    /// 向群组房间广播；房间内已不再是授权成员的连接会被跳过
    pub async fn broadcast_room(
        &self,
        group_id: GroupId,
        event: ServerEvent,
    ) -> Result<DispatchReport, ApplicationError> {
        let members = self.membership.authorized_members(group_id).await?;
        let mut report = DispatchReport::default();
        for handle in self.rooms.connections(group_id) {
            if !members.contains(&handle.user_id()) {
                tracing::debug!(
                    room = %room_name(group_id),
                    user_id = %handle.user_id(),
                    "跳过非成员连接"
                );
                continue;
            }
            report.merge(deliver_with_retry(&handle, event.clone()).await);
        }
        tracing::debug!(
            room = %room_name(group_id),
            event = event.name(),
            delivered = report.delivered,
            "房间广播完成"
        );
        Ok(report)
    }

    /// 向所有在线连接广播完整的在线用户集合
    pub async fn broadcast_presence(&self) -> DispatchReport {
        let active_user_ids: Vec<UserId> = self.presence.list_active().await.into_iter().collect();
        let event = ServerEvent::PresenceChanged { active_user_ids };
        let mut report = DispatchReport::default();
        for handle in self.presence.handles().await {
            report.merge(deliver_with_retry(&handle, event.clone()).await);
        }
        report
    }
}

async fn deliver_with_retry(handle: &ConnectionHandle, event: ServerEvent) -> Outcome {
    let name = event.name();
    match handle.deliver(event.clone()) {
        Ok(()) => Outcome::Delivered,
        Err(DeliveryError::Closed) => {
            tracing::warn!(
                user_id = %handle.user_id(),
                connection_id = %handle.id(),
                event = name,
                "连接已关闭，丢弃事件"
            );
            Outcome::Dropped { retried: false }
        }
        Err(DeliveryError::Backpressure) => {
            tokio::task::yield_now().await;
            match handle.deliver(event) {
                Ok(()) => Outcome::DeliveredOnRetry,
                Err(err) => {
                    tracing::warn!(
                        user_id = %handle.user_id(),
                        connection_id = %handle.id(),
                        event = name,
                        error = %err,
                        "重试投递失败，丢弃事件"
                    );
                    Outcome::Dropped { retried: true }
                }
            }
        }
    }
}
