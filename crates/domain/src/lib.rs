//! 聊天系统核心领域模型
//!
//! 包含用户、聊天室、消息三个实体，好友关系与成员关系的不变量，
//! 以及实时推送使用的事件定义。

pub mod chat;
pub mod errors;
pub mod events;
pub mod message;
pub mod user;
pub mod value_objects;

pub use chat::{Chat, ChatSummary};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use events::{ChatEvent, EventScope};
pub use message::Message;
pub use user::{User, UserSummary};
pub use value_objects::{
    Bio, ChatId, ChatName, MessageBody, MessageId, PasswordHash, Timestamp, UserId, Username,
};
