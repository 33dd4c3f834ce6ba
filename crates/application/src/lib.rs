//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：房间成员管理、消息管线、好友亲密度排序，
//! 以及实时会话层；对存储、密码哈希、令牌校验等外部协作者只依赖抽象。

pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod memory;
pub mod password;
pub mod repository;
pub mod services;
pub mod session;
pub mod token;

pub use broadcaster::{BroadcastError, EventBroadcaster};
pub use clock::{Clock, SystemClock};
pub use dto::{AuthenticatedUser, ChatDetails, FriendAffinity, MessageView, UserProfile};
pub use error::ApplicationError;
pub use memory::InMemoryStore;
pub use password::{PasswordHasher, PasswordHasherError};
pub use repository::{
    ChatRemoval, ChatRepository, MemberRemoval, MessageRepository, UserRemoval, UserRepository,
};
pub use services::{
    AffinityRanker, AffinityRankerDependencies, AuthenticateUserRequest, CreateChatRequest,
    MembershipService, MembershipServiceDependencies, MessageService, MessageServiceDependencies,
    PostMessageRequest, RegisterUserRequest, UserService, UserServiceDependencies,
};
pub use session::{
    ConnectionId, ResumeToken, SessionConfig, SessionError, SessionHandle, SessionHub,
};
pub use token::{TokenIssuer, TokenVerifier};
