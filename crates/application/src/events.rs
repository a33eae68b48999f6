//! 实时通道上的事件协议

use domain::{GroupId, MessageId, TargetKind, UserId};
use serde::{Deserialize, Serialize};

use crate::dto::{GroupMessageView, PrivateMessageView, ReactionView};

/// 服务器推送给连接的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewPrivateMessage {
        message: PrivateMessageView,
    },
    NewGroupMessage {
        message: GroupMessageView,
    },
    #[serde(rename_all = "camelCase")]
    MessageReactionAdded {
        target_message_id: MessageId,
        reaction: ReactionView,
        target_kind: TargetKind,
    },
    #[serde(rename_all = "camelCase")]
    MessageReactionRemoved {
        target_message_id: MessageId,
        actor_id: UserId,
        emoji: String,
        target_kind: TargetKind,
    },
    #[serde(rename_all = "camelCase")]
    PresenceChanged {
        active_user_ids: Vec<UserId>,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: UserId,
        is_typing: bool,
        full_name: String,
    },
    Pong,
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewPrivateMessage { .. } => "newPrivateMessage",
            ServerEvent::NewGroupMessage { .. } => "newGroupMessage",
            ServerEvent::MessageReactionAdded { .. } => "messageReactionAdded",
            ServerEvent::MessageReactionRemoved { .. } => "messageReactionRemoved",
            ServerEvent::PresenceChanged { .. } => "presenceChanged",
            ServerEvent::UserTyping { .. } => "userTyping",
            ServerEvent::Pong => "pong",
        }
    }
}

/// 客户端发往服务器的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { group_id: GroupId },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { group_id: GroupId },
    /// 仅用于日志，回应的持久化与广播走同步接口
    #[serde(rename_all = "camelCase")]
    SendReactionAdded {
        target_message_id: String,
        emoji: String,
        #[serde(default)]
        target_kind: Option<TargetKind>,
    },
    /// 私聊输入状态，只转发给对方的当前连接
    #[serde(rename_all = "camelCase")]
    PrivateTyping { receiver_id: UserId, is_typing: bool },
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_camel_case_tags() {
        let group_id = GroupId::generate();
        let raw = format!(r#"{{"type":"joinRoom","data":{{"groupId":"{group_id}"}}}}"#);
        let event: ClientEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(event, ClientEvent::JoinRoom { group_id });

        let ping: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientEvent::Ping);

        let receiver_id = UserId::generate();
        let raw = format!(
            r#"{{"type":"privateTyping","data":{{"receiverId":"{receiver_id}","isTyping":true}}}}"#
        );
        let typing: ClientEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            typing,
            ClientEvent::PrivateTyping {
                receiver_id,
                is_typing: true
            }
        );
    }

    #[test]
    fn typing_event_carries_sender_name() {
        let user_id = UserId::generate();
        let event = ServerEvent::UserTyping {
            user_id,
            is_typing: false,
            full_name: "Alice".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "userTyping");
        assert_eq!(value["data"]["userId"], user_id.to_string());
        assert_eq!(value["data"]["isTyping"], false);
        assert_eq!(value["data"]["fullName"], "Alice");
    }

    #[test]
    fn presence_event_serializes_with_name_tag() {
        let user = UserId::generate();
        let event = ServerEvent::PresenceChanged {
            active_user_ids: vec![user],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.name());
        assert_eq!(value["data"]["activeUserIds"][0], user.to_string());
    }
}
