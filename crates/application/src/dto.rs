use domain::{
    Chat, ChatId, Message, MessageId, Timestamp, User, UserId, UserSummary,
};
use serde::{Deserialize, Serialize};

/// 已解析作者的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub body: String,
    pub sent_at: Timestamp,
    pub author: UserSummary,
}

impl MessageView {
    pub fn new(message: &Message, author: UserSummary) -> Self {
        Self {
            id: message.id,
            chat_id: message.chat_id,
            body: message.body.as_str().to_owned(),
            sent_at: message.sent_at,
            author,
        }
    }
}

/// 聊天室详情：成员与消息都已解析
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDetails {
    pub id: ChatId,
    pub name: String,
    pub members: Vec<UserSummary>,
    pub messages: Vec<MessageView>,
    pub created_at: Timestamp,
}

impl ChatDetails {
    pub fn new(chat: &Chat, members: Vec<UserSummary>, messages: Vec<MessageView>) -> Self {
        Self {
            id: chat.id,
            name: chat.name.as_str().to_owned(),
            members,
            messages,
            created_at: chat.created_at,
        }
    }
}

/// 对外的用户资料，不含凭证
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub bio: Option<String>,
    pub chats: Vec<ChatId>,
    pub friends: Vec<UserId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.as_str().to_owned(),
            bio: user.bio.as_ref().map(|bio| bio.as_str().to_owned()),
            chats: user.chats.clone(),
            friends: user.friends.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendAffinity {
    pub friend: UserSummary,
    pub score: u64,
}
