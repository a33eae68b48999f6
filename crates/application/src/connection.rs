//! 单个实时连接的发送句柄

use domain::{ConnectionId, UserId};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::ServerEvent;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// 连接已关闭，接收端不存在
    #[error("connection closed")]
    Closed,
    /// 发送队列已满
    #[error("connection outbox is full")]
    Backpressure,
}

/// 连接句柄。同一用户的新旧连接通过 `id` 区分。
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    outbox: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(user_id: UserId, outbox: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId::generate(),
            user_id,
            outbox,
        }
    }

    /// 创建句柄及其接收端
    pub fn channel(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(user_id, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// 非阻塞投递，慢连接不会拖住其他接收者
    pub fn deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        self.outbox.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}
