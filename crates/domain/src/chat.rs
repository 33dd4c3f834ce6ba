use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ChatId, ChatName, MessageId, Timestamp, UserId};

/// 聊天室。
///
/// 不变量：
/// - 非 Global 聊天室的成员集合一旦为空，该聊天室必须被删除；
/// - Global 聊天室不允许通过 `add_member` / `remove_member` 修改成员，也不允许删除。
///
/// 注册与注销用户时对 Global 成员的维护走 `enroll` / `withdraw`，不受上述限制。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub name: ChatName,
    pub members: Vec<UserId>,
    /// 按发送顺序追加
    pub messages: Vec<MessageId>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: ChatId,
    pub name: String,
}

impl Chat {
    pub const GLOBAL_NAME: &'static str = "Global";

    /// 创建聊天室，创建者为唯一成员。
    pub fn found(id: ChatId, name: ChatName, founder: UserId, created_at: Timestamp) -> Self {
        Self {
            id,
            name,
            members: vec![founder],
            messages: Vec::new(),
            created_at,
        }
    }

    pub fn global(created_at: Timestamp) -> Self {
        Self {
            id: ChatId::GLOBAL,
            name: ChatName(Self::GLOBAL_NAME.to_owned()),
            members: Vec::new(),
            messages: Vec::new(),
            created_at,
        }
    }

    pub fn is_global(&self) -> bool {
        self.id.is_global()
    }

    pub fn summary(&self) -> ChatSummary {
        ChatSummary {
            id: self.id,
            name: self.name.as_str().to_owned(),
        }
    }

    pub fn has_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }

    /// 非 Global 且没有成员，需要立即清理。
    pub fn is_orphaned(&self) -> bool {
        !self.is_global() && self.members.is_empty()
    }

    pub fn add_member(&mut self, user_id: UserId) -> Result<bool, DomainError> {
        if self.is_global() {
            return Err(DomainError::GlobalChatImmutable);
        }
        Ok(self.enroll(user_id))
    }

    pub fn remove_member(&mut self, user_id: UserId) -> Result<bool, DomainError> {
        if self.is_global() {
            return Err(DomainError::GlobalChatImmutable);
        }
        Ok(self.withdraw(user_id))
    }

    pub fn enroll(&mut self, user_id: UserId) -> bool {
        if self.has_member(user_id) {
            return false;
        }
        self.members.push(user_id);
        true
    }

    pub fn withdraw(&mut self, user_id: UserId) -> bool {
        let before = self.members.len();
        self.members.retain(|id| *id != user_id);
        before != self.members.len()
    }

    pub fn append_message(&mut self, message_id: MessageId) {
        self.messages.push(message_id);
    }

    pub fn remove_message(&mut self, message_id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|id| *id != message_id);
        before != self.messages.len()
    }

    /// 确保删除操作不会落在 Global 上。
    pub fn ensure_deletable(&self) -> Result<(), DomainError> {
        if self.is_global() {
            return Err(DomainError::GlobalChatImmutable);
        }
        Ok(())
    }
}
