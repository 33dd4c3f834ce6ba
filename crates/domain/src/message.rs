use serde::{Deserialize, Serialize};

use crate::value_objects::{ChatId, MessageBody, MessageId, Timestamp, UserId};

/// 聊天消息，创建后内容不可变，只能整条删除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub author_id: UserId,
    pub body: MessageBody,
    pub sent_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        chat_id: ChatId,
        author_id: UserId,
        body: MessageBody,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            id,
            chat_id,
            author_id,
            body,
            sent_at,
        }
    }

    pub fn is_authored_by(&self, user_id: UserId) -> bool {
        self.author_id == user_id
    }
}
