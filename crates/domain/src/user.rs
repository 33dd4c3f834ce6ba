use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{Bio, ChatId, MessageId, PasswordHash, Timestamp, UserId, Username};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    pub bio: Option<Bio>,
    pub chats: Vec<ChatId>,
    pub friends: Vec<UserId>,
    pub messages: Vec<MessageId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// 对外公开的用户身份：只有 id 和用户名。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}

impl User {
    /// 注册新用户，自动加入 Global 聊天室。
    pub fn register(id: UserId, username: Username, password: PasswordHash, now: Timestamp) -> Self {
        Self {
            id,
            username,
            password,
            bio: None,
            chats: vec![ChatId::GLOBAL],
            friends: Vec::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.as_str().to_owned(),
        }
    }

    pub fn in_chat(&self, chat_id: ChatId) -> bool {
        self.chats.contains(&chat_id)
    }

    /// 集合语义：已在列表中返回 false。
    pub fn join_chat(&mut self, chat_id: ChatId) -> bool {
        if self.in_chat(chat_id) {
            return false;
        }
        self.chats.push(chat_id);
        true
    }

    pub fn leave_chat(&mut self, chat_id: ChatId) -> bool {
        let before = self.chats.len();
        self.chats.retain(|id| *id != chat_id);
        before != self.chats.len()
    }

    pub fn is_friend(&self, other: UserId) -> bool {
        self.friends.contains(&other)
    }

    pub fn add_friend(&mut self, friend: UserId) -> Result<bool, DomainError> {
        if friend == self.id {
            return Err(DomainError::SelfFriendship);
        }
        if self.is_friend(friend) {
            return Ok(false);
        }
        self.friends.push(friend);
        Ok(true)
    }

    pub fn remove_friend(&mut self, friend: UserId) -> bool {
        let before = self.friends.len();
        self.friends.retain(|id| *id != friend);
        before != self.friends.len()
    }

    pub fn record_message(&mut self, message_id: MessageId) {
        if !self.messages.contains(&message_id) {
            self.messages.push(message_id);
        }
    }

    pub fn forget_message(&mut self, message_id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|id| *id != message_id);
        before != self.messages.len()
    }

    pub fn update_bio(&mut self, bio: Option<Bio>, now: Timestamp) {
        self.bio = bio;
        self.updated_at = now;
    }
}
