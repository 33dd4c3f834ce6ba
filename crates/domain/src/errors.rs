//! 领域模型错误定义
//!
//! `DomainError` 描述业务规则层面的失败（校验、不变量、资源缺失），
//! `RepositoryError` 描述存储层的失败，两者由应用层统一包装后上报。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败（空消息、空房间名等）
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 试图修改或删除 Global 聊天室
    #[error("global chat membership cannot be changed and the chat cannot be deleted")]
    GlobalChatImmutable,

    /// 不能添加自己为好友
    #[error("a user cannot befriend themselves")]
    SelfFriendship,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("user not found")]
    UserNotFound,

    #[error("chat not found")]
    ChatNotFound,

    #[error("message not found")]
    MessageNotFound,
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 是否属于不变量冲突（Global 聊天室、自我好友）
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::GlobalChatImmutable | Self::SelfFriendship)
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("record conflicts with an existing one")]
    Conflict,

    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
