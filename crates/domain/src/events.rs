//! 实时推送事件
//!
//! 每个事件名对应固定的负载结构，序列化为 `{"event": "...", "data": {...}}`。

use serde::{Deserialize, Serialize};

use crate::chat::ChatSummary;
use crate::message::Message;
use crate::user::UserSummary;
use crate::value_objects::{ChatId, MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ChatEvent {
    NewMessage {
        chat_id: ChatId,
        message: Message,
        author: UserSummary,
    },
    DeletedMessage {
        chat_id: ChatId,
        message_id: MessageId,
    },
    CreateChat {
        chat: ChatSummary,
        founder: UserId,
    },
    AddToChat {
        chat_id: ChatId,
        user_id: UserId,
    },
    RemoveFromChat {
        chat_id: ChatId,
        user_id: UserId,
    },
    DeleteChat {
        chat_id: ChatId,
    },
    AddFriend {
        user_id: UserId,
        friend_id: UserId,
    },
    RemoveFriend {
        user_id: UserId,
        friend_id: UserId,
    },
}

/// 事件投递范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    /// 只投递给订阅了该房间的连接
    Room(ChatId),
    /// 投递给所有在线连接
    Broadcast,
}

impl ChatEvent {
    pub fn scope(&self) -> EventScope {
        match self {
            Self::NewMessage { chat_id, .. } | Self::DeletedMessage { chat_id, .. } => {
                EventScope::Room(*chat_id)
            }
            _ => EventScope::Broadcast,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "newMessage",
            Self::DeletedMessage { .. } => "deletedMessage",
            Self::CreateChat { .. } => "createChat",
            Self::AddToChat { .. } => "addToChat",
            Self::RemoveFromChat { .. } => "removeFromChat",
            Self::DeleteChat { .. } => "deleteChat",
            Self::AddFriend { .. } => "addFriend",
            Self::RemoveFriend { .. } => "removeFriend",
        }
    }
}
