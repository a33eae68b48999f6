//! 消息实体定义
//!
//! 私聊消息与群聊消息分开建模：私聊消息以会话键定位，群聊消息以群组定位。
//! 两者创建后都不可变，分发引擎只读取它们。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ConversationKey, GroupId, MessageId, MessageText, Timestamp, UserId};

/// 附件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
    Video,
}

impl AttachmentKind {
    const VIDEO_EXTENSIONS: [&'static str; 5] = [".mp4", ".mov", ".avi", ".mkv", ".webm"];

    /// 根据内容类型或文件名推断附件类型
    pub fn detect(content_type: Option<&str>, file_name: Option<&str>) -> Self {
        let hint = content_type
            .or(file_name)
            .unwrap_or_default()
            .to_ascii_lowercase();

        if hint.contains("video")
            || Self::VIDEO_EXTENSIONS
                .iter()
                .any(|extension| hint.ends_with(extension))
        {
            Self::Video
        } else if hint.contains("image") {
            Self::Image
        } else {
            Self::File
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::File => "file",
            Self::Video => "video",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "video" => Ok(Self::Video),
            other => Err(DomainError::invalid_argument(
                "attachment_kind",
                format!("unknown kind {other}"),
            )),
        }
    }
}

/// 群聊消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Video,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Video => "video",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "video" => Ok(Self::Video),
            "system" => Ok(Self::System),
            other => Err(DomainError::invalid_argument(
                "message_kind",
                format!("unknown kind {other}"),
            )),
        }
    }
}

impl From<AttachmentKind> for MessageKind {
    fn from(kind: AttachmentKind) -> Self {
        match kind {
            AttachmentKind::Image => Self::Image,
            AttachmentKind::File => Self::File,
            AttachmentKind::Video => Self::Video,
        }
    }
}

/// 已上传到外部对象存储的附件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub kind: AttachmentKind,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

impl Attachment {
    pub fn new(url: impl Into<String>, kind: AttachmentKind) -> DomainResult<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(DomainError::invalid_argument("attachment_url", "cannot be empty"));
        }
        Ok(Self {
            url,
            kind,
            file_name: None,
            file_size: None,
        })
    }

    pub fn with_file(mut self, file_name: Option<String>, file_size: Option<u64>) -> Self {
        self.file_name = file_name;
        self.file_size = file_size;
        self
    }
}

/// 私聊消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: Option<MessageText>,
    pub attachment_url: Option<String>,
    pub conversation_key: ConversationKey,
    pub created_at: Timestamp,
}

impl PrivateMessage {
    pub fn new(
        id: MessageId,
        sender_id: UserId,
        receiver_id: UserId,
        text: Option<MessageText>,
        attachment_url: Option<String>,
        created_at: Timestamp,
    ) -> DomainResult<Self> {
        if sender_id == receiver_id {
            return Err(DomainError::invalid_argument(
                "receiver_id",
                "cannot send messages to yourself",
            ));
        }
        if text.is_none() && attachment_url.is_none() {
            return Err(DomainError::invalid_argument(
                "body",
                "text or attachment is required",
            ));
        }

        Ok(Self {
            id,
            sender_id,
            receiver_id,
            text,
            attachment_url,
            conversation_key: ConversationKey::between(sender_id, receiver_id),
            created_at,
        })
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// 会话中的另一方
    pub fn counterpart_of(&self, user_id: UserId) -> UserId {
        if self.sender_id == user_id {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

/// 群聊消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub id: MessageId,
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub text: Option<MessageText>,
    pub attachment: Option<Attachment>,
    pub message_kind: MessageKind,
    pub created_at: Timestamp,
}

impl GroupMessage {
    pub fn new(
        id: MessageId,
        group_id: GroupId,
        sender_id: UserId,
        text: Option<MessageText>,
        attachment: Option<Attachment>,
        created_at: Timestamp,
    ) -> DomainResult<Self> {
        if text.is_none() && attachment.is_none() {
            return Err(DomainError::invalid_argument(
                "body",
                "text, image, or file is required",
            ));
        }

        let message_kind = attachment
            .as_ref()
            .map(|attachment| MessageKind::from(attachment.kind))
            .unwrap_or(MessageKind::Text);

        Ok(Self {
            id,
            group_id,
            sender_id,
            text,
            attachment,
            message_kind,
            created_at,
        })
    }

    /// 从存储中恢复，不重新推导消息类型
    pub fn restore(
        id: MessageId,
        group_id: GroupId,
        sender_id: UserId,
        text: Option<MessageText>,
        attachment: Option<Attachment>,
        message_kind: MessageKind,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            group_id,
            sender_id,
            text,
            attachment,
            message_kind,
            created_at,
        }
    }
}
