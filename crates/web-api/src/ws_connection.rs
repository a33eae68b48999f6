use application::{ClientEvent, ConnectionHandle, SessionService};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::state::AppState;

/// 单个 WebSocket 连接
///
/// 连接建立时注册在线状态，断开时离开所有房间并注销在线状态。
/// 服务器事件经由连接的出站队列写出，客户端事件交给会话服务处理。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    user_id: UserId,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, user_id: UserId) -> Self {
        tracing::info!(user_id = %user_id, "WebSocket 连接已建立");
        Self {
            socket,
            state,
            user_id,
        }
    }

    /// 运行连接主循环，直到任一方向结束
    pub async fn run(self) {
        let (handle, mut outbox) =
            ConnectionHandle::channel(self.user_id, self.state.outbox_capacity);
        let session = self.state.session_service.clone();
        session.connect(&handle).await;

        let (mut sender, mut incoming) = self.socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        let message = match cmd {
                            WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                        };
                        if sender.send(message).await.is_err() {
                            tracing::warn!("pong 发送失败");
                            break;
                        }
                    }
                    event = outbox.recv() => {
                        let Some(event) = event else { break };
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, event = event.name(), "事件序列化失败");
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            tracing::warn!(event = event.name(), "事件写出失败");
                            break;
                        }
                    }
                }
            }
            tracing::info!("WebSocket发送任务结束");
        });

        // 接收任务：处理来自WebSocket客户端的消息
        let mut recv_task = tokio::spawn({
            let session = session.clone();
            let handle = handle.clone();
            async move {
                while let Some(Ok(message)) = incoming.next().await {
                    if Self::handle_incoming(message, &session, &handle, &cmd_tx)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                tracing::info!("WebSocket接收任务结束");
            }
        });

        // 任意一个任务完成即视为断开
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        session.disconnect(&handle).await;
        tracing::info!(
            user_id = %self.user_id,
            connection_id = %handle.id(),
            "WebSocket连接已断开，在线状态已清理"
        );
    }

    async fn handle_incoming(
        message: WsMessage,
        session: &Arc<SessionService>,
        handle: &ConnectionHandle,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => {
                tracing::info!("WebSocket收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                    return Err(());
                }
            }
            WsMessage::Pong(_) | WsMessage::Binary(_) => {}
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => {
                    if let Err(err) = session.handle_client_event(handle, event).await {
                        tracing::warn!(user_id = %handle.user_id(), error = %err, "客户端事件处理失败");
                    }
                }
                Err(err) => {
                    tracing::debug!(user_id = %handle.user_id(), error = %err, "无法解析的客户端事件");
                }
            },
        }
        Ok(())
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
