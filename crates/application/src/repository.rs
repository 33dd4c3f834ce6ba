//! 存储协作者接口
//!
//! 每个会同时修改多个文档的方法（好友关系、成员关系、级联删除）都必须在实现里
//! 作为一次原子操作完成：要么全部生效，要么返回错误且不留下半成品。

use async_trait::async_trait;
use domain::{
    Bio, Chat, ChatId, Message, MessageId, RepositoryError, Timestamp, User, UserId, Username,
};

/// 删除用户时的级联结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRemoval {
    pub user: User,
    /// 被一起删除的消息 (所属房间, 消息)
    pub removed_messages: Vec<(ChatId, MessageId)>,
    /// 因该用户离开而变成零成员的非 Global 房间，尚未删除
    pub orphaned_chats: Vec<ChatId>,
}

/// 删除聊天室时的级联结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRemoval {
    pub chat: Chat,
    pub removed_messages: Vec<MessageId>,
}

/// 移除成员的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRemoval {
    pub chat: Chat,
    /// 房间因此变空，已在同一次操作里删除
    pub chat_removal: Option<ChatRemoval>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 插入用户，并把用户加入 Global 的成员集合。用户名冲突返回 `Conflict`。
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(&self, username: &Username)
        -> Result<Option<User>, RepositoryError>;
    /// 按传入顺序返回存在的用户，缺失的跳过
    async fn find_many(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;
    /// 按用户名排序
    async fn list_all(&self) -> Result<Vec<User>, RepositoryError>;
    async fn update_profile(
        &self,
        id: UserId,
        bio: Option<Bio>,
        now: Timestamp,
    ) -> Result<User, RepositoryError>;
    /// 双向建立好友关系，已存在时不变
    async fn befriend(&self, user_id: UserId, friend_id: UserId) -> Result<(), RepositoryError>;
    /// 双向解除好友关系，不存在时不变
    async fn unfriend(&self, user_id: UserId, friend_id: UserId) -> Result<(), RepositoryError>;
    /// 删除用户、其全部消息、所有成员关系与好友关系
    async fn delete_cascade(&self, id: UserId) -> Result<UserRemoval, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// 插入聊天室，并把它加入创始人的房间列表
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError>;
    async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError>;
    /// 按传入顺序返回存在的聊天室，缺失的跳过
    async fn find_many(&self, ids: &[ChatId]) -> Result<Vec<Chat>, RepositoryError>;
    /// 集合语义地把用户加入房间，同时更新用户的房间列表；返回修改后的房间
    async fn add_member(&self, chat_id: ChatId, user_id: UserId)
        -> Result<Chat, RepositoryError>;
    /// 从房间与用户两侧移除成员关系。非 Global 房间因此变空时在同一次操作里一并删除。
    async fn remove_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MemberRemoval, RepositoryError>;
    /// 删除房间、房间的全部消息，并从所有成员的房间列表中移除
    async fn delete(&self, chat_id: ChatId) -> Result<ChatRemoval, RepositoryError>;
    /// 条件删除：只有在删除时刻成员集合仍为空才执行，否则返回 `None`
    async fn delete_if_empty(&self, chat_id: ChatId)
        -> Result<Option<ChatRemoval>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化消息并追加到房间消息序列与作者的消息列表
    async fn append(&self, message: Message) -> Result<Message, RepositoryError>;
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;
    /// 删除消息，同时从房间序列和作者列表中移除
    async fn delete(&self, id: MessageId) -> Result<Message, RepositoryError>;
    /// 房间内全部消息，按写入顺序
    async fn list_by_chat(&self, chat_id: ChatId) -> Result<Vec<Message>, RepositoryError>;
    async fn list_by_chats(&self, chat_ids: &[ChatId]) -> Result<Vec<Message>, RepositoryError>;
}
