//! 领域模型错误定义
//!
//! 领域错误描述业务规则被违反的情况；仓储错误描述存储适配器的失败。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("user not found")]
    UserNotFound,

    #[error("group not found")]
    GroupNotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("reaction not found")]
    ReactionNotFound,

    /// 群组已停用，不再接受新消息
    #[error("group is inactive")]
    GroupInactive,

    /// 操作者不是群组的当前成员
    #[error("user is not a member of the group")]
    NotGroupMember,

    #[error("user is already a member of the group")]
    AlreadyGroupMember,

    #[error("operation not allowed")]
    OperationNotAllowed,

    /// 同一用户对同一消息重复使用同一表情
    #[error("reaction already exists")]
    DuplicateReaction,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 存储适配器错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// 唯一约束冲突
    #[error("unique constraint violated")]
    Conflict,

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
