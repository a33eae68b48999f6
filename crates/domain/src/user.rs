use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 用户的展示身份，投递给客户端的消息里用它替代裸 ID。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub full_name: String,
    pub profile_pic: Option<String>,
}

impl UserProfile {
    pub fn new(id: UserId, full_name: impl Into<String>, profile_pic: Option<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            profile_pic,
        }
    }
}
