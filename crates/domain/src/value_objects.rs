use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型（服务器时间域）。
pub type Timestamp = DateTime<Utc>;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value.trim())
                    .map(Self)
                    .map_err(|_| DomainError::invalid_argument(stringify!($name), "malformed identifier"))
            }
        }
    };
}

uuid_id!(
    /// 用户唯一标识。
    UserId
);
uuid_id!(
    /// 群组唯一标识。
    GroupId
);
uuid_id!(
    /// 消息唯一标识（私聊与群聊共用同一种标识类型）。
    MessageId
);
uuid_id!(
    /// 表情回应唯一标识。
    ReactionId
);
uuid_id!(
    /// 单个实时连接的标识。
    ConnectionId
);

/// 私聊会话键：两个参与者标识排序后以 `_` 连接，与发送方向无关。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn between(a: UserId, b: UserId) -> Self {
        let (first, second) = if a.0.to_string() <= b.0.to_string() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!("{first}_{second}"))
    }

    /// 解析外部传入的会话标识，参与者顺序不影响结果
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let (left, right) = raw
            .split_once('_')
            .ok_or_else(|| DomainError::invalid_argument("conversation_key", "missing separator"))?;
        Ok(Self::between(left.parse()?, right.parse()?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 解析出会话的两个参与者
    pub fn participants(&self) -> Result<(UserId, UserId), DomainError> {
        let (left, right) = self
            .0
            .split_once('_')
            .ok_or_else(|| DomainError::invalid_argument("conversation_key", "missing separator"))?;
        Ok((left.parse()?, right.parse()?))
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 消息正文，去除首尾空白后最长 2000 个字符。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageText(String);

impl MessageText {
    pub const MAX_CHARS: usize = 2000;

    /// 空白正文返回 `None`，超长正文返回错误。
    pub fn parse(value: impl Into<String>) -> Result<Option<Self>, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Ok(None);
        }
        if value.chars().count() > Self::MAX_CHARS {
            return Err(DomainError::invalid_argument("text", "exceeds 2000 characters"));
        }
        Ok(Some(Self(value)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 表情回应使用的表情符号。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Emoji(String);

impl Emoji {
    /// 按 UTF-16 码元计的最大长度，复合表情（肤色、ZWJ 序列）也能放下。
    pub const MAX_UNITS: usize = 10;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("emoji", "cannot be empty"));
        }
        if value.encode_utf16().count() > Self::MAX_UNITS {
            return Err(DomainError::invalid_argument("emoji", "invalid emoji"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Emoji {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 客户端生成的关联令牌，只用于把乐观回显与服务器确认的消息对上，从不持久化。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientMessageId(String);

impl ClientMessageId {
    pub const MAX_LEN: usize = 128;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid_argument("client_message_id", "cannot be empty"));
        }
        if value.len() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("client_message_id", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_is_order_independent() {
        let a = UserId::generate();
        let b = UserId::generate();

        let forward = ConversationKey::between(a, b);
        let backward = ConversationKey::between(b, a);

        assert_eq!(forward, backward);
        let (first, second) = forward.participants().unwrap();
        assert!(first.to_string() <= second.to_string());
        assert!([first, second].contains(&a));
        assert!([first, second].contains(&b));

        let parsed = ConversationKey::parse(&format!("{b}_{a}")).unwrap();
        assert_eq!(parsed, forward);
        assert!(ConversationKey::parse("not-a-key").is_err());
        assert!(ConversationKey::parse(&format!("{a}_garbage")).is_err());
    }

    #[test]
    fn message_text_trims_and_bounds() {
        assert_eq!(MessageText::parse("   ").unwrap(), None);
        assert_eq!(
            MessageText::parse("  hi ").unwrap().unwrap().as_str(),
            "hi"
        );
        assert!(MessageText::parse("a".repeat(2000)).unwrap().is_some());
        assert!(MessageText::parse("a".repeat(2001)).is_err());
    }

    #[test]
    fn emoji_length_is_measured_in_utf16_units() {
        assert!(Emoji::parse("👍").is_ok());
        assert!(Emoji::parse("👍🏽").is_ok());
        assert!(Emoji::parse("").is_err());
        assert!(Emoji::parse("👍👍👍👍👍👍").is_err());
    }

    #[test]
    fn malformed_identifier_is_rejected() {
        assert!("temp-1234".parse::<MessageId>().is_err());
        let id = MessageId::generate();
        assert_eq!(id.to_string().parse::<MessageId>().unwrap(), id);
    }
}
