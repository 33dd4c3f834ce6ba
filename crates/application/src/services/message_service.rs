use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    ChatEvent, ChatId, DomainError, Message, MessageBody, MessageId, Timestamp, UserId,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    broadcaster::EventBroadcaster,
    clock::Clock,
    dto::MessageView,
    error::ApplicationError,
    repository::{ChatRepository, MessageRepository, UserRepository},
};

use super::publish;

#[derive(Debug, Clone)]
pub struct PostMessageRequest {
    pub chat_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    /// 客户端给出的发送时间，缺省取服务端时钟
    pub sent_at: Option<Timestamp>,
}

pub struct MessageServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub chat_repository: Arc<dyn ChatRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
}

/// 消息管线：校验、持久化，提交成功后再推送给房间订阅者
pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn post_message(
        &self,
        request: PostMessageRequest,
    ) -> Result<MessageView, ApplicationError> {
        let body = MessageBody::new(request.body)?;
        let chat_id = ChatId::from(request.chat_id);
        let author_id = UserId::from(request.author_id);

        self.deps
            .chat_repository
            .find_by_id(chat_id)
            .await?
            .ok_or(DomainError::ChatNotFound)?;
        let author = self
            .deps
            .user_repository
            .find_by_id(author_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        let message = Message::new(
            MessageId::from(Uuid::new_v4()),
            chat_id,
            author_id,
            body,
            request.sent_at.unwrap_or_else(|| self.deps.clock.now()),
        );
        let stored = self
            .deps
            .message_repository
            .append(message)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::ChatNotFound))?;

        let author = author.summary();
        let view = MessageView::new(&stored, author.clone());
        publish(
            self.deps.broadcaster.as_ref(),
            ChatEvent::NewMessage {
                chat_id,
                message: stored,
                author,
            },
        )
        .await;
        Ok(view)
    }

    pub async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        requester_id: UserId,
    ) -> Result<(), ApplicationError> {
        let message = self
            .deps
            .message_repository
            .find_by_id(message_id)
            .await?
            .ok_or(DomainError::MessageNotFound)?;
        if message.chat_id != chat_id {
            return Err(DomainError::MessageNotFound.into());
        }

        self.deps
            .message_repository
            .delete(message_id)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::MessageNotFound))?;

        info!(
            chat_id = %chat_id,
            message_id = %message_id,
            author_id = %message.author_id,
            requester_id = %requester_id,
            "message deleted"
        );
        publish(
            self.deps.broadcaster.as_ref(),
            ChatEvent::DeletedMessage {
                chat_id,
                message_id,
            },
        )
        .await;
        Ok(())
    }

    /// 房间全部历史，按写入顺序
    pub async fn get_history(&self, chat_id: ChatId) -> Result<Vec<MessageView>, ApplicationError> {
        let messages = self
            .deps
            .message_repository
            .list_by_chat(chat_id)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::ChatNotFound))?;
        resolve_messages(self.deps.user_repository.as_ref(), &messages).await
    }
}

/// 批量解析作者身份，保持消息顺序；作者已不存在的消息跳过
pub(crate) async fn resolve_messages(
    users: &dyn UserRepository,
    messages: &[Message],
) -> Result<Vec<MessageView>, ApplicationError> {
    let mut author_ids: Vec<UserId> = messages.iter().map(|message| message.author_id).collect();
    author_ids.sort();
    author_ids.dedup();

    let authors: HashMap<UserId, _> = users
        .find_many(&author_ids)
        .await?
        .into_iter()
        .map(|user| (user.id, user.summary()))
        .collect();

    Ok(messages
        .iter()
        .filter_map(|message| match authors.get(&message.author_id) {
            Some(author) => Some(MessageView::new(message, author.clone())),
            None => {
                warn!(
                    message_id = %message.id,
                    author_id = %message.author_id,
                    "message author missing, skipped"
                );
                None
            }
        })
        .collect())
}
