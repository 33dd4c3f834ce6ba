use std::sync::Arc;

use domain::{Chat, ChatEvent, ChatId, ChatName, DomainError, UserId};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    broadcaster::EventBroadcaster,
    clock::Clock,
    dto::ChatDetails,
    error::ApplicationError,
    repository::{ChatRepository, MessageRepository, UserRepository},
};

use super::message_service::resolve_messages;
use super::publish;

#[derive(Debug, Clone)]
pub struct CreateChatRequest {
    pub name: String,
    pub founder_id: Uuid,
}

pub struct MembershipServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub chat_repository: Arc<dyn ChatRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
}

/// 房间成员管理
///
/// 成员关系只保存在存储里，服务本身不持有房间状态。
/// 任何让非 Global 房间成员变空的操作都会在返回前删除该房间。
pub struct MembershipService {
    deps: MembershipServiceDependencies,
}

impl MembershipService {
    pub fn new(deps: MembershipServiceDependencies) -> Self {
        Self { deps }
    }

    async fn load_chat(&self, chat_id: ChatId) -> Result<Chat, ApplicationError> {
        self.deps
            .chat_repository
            .find_by_id(chat_id)
            .await?
            .ok_or_else(|| DomainError::ChatNotFound.into())
    }

    pub async fn create_chat(&self, request: CreateChatRequest) -> Result<Chat, ApplicationError> {
        let name = ChatName::parse(request.name)?;
        let founder_id = UserId::from(request.founder_id);

        self.deps
            .user_repository
            .find_by_id(founder_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        let chat = Chat::found(
            ChatId::from(Uuid::new_v4()),
            name,
            founder_id,
            self.deps.clock.now(),
        );
        let stored = self
            .deps
            .chat_repository
            .create(chat)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::UserNotFound))?;

        info!(chat_id = %stored.id, founder_id = %founder_id, "chat created");
        publish(
            self.deps.broadcaster.as_ref(),
            ChatEvent::CreateChat {
                chat: stored.summary(),
                founder: founder_id,
            },
        )
        .await;
        Ok(stored)
    }

    /// 集合语义，重复加入返回相同的成员集合
    pub async fn add_member(&self, chat_id: ChatId, user_id: UserId) -> Result<Chat, ApplicationError> {
        let mut chat = self.load_chat(chat_id).await?;
        let joined = chat.add_member(user_id)?;

        self.deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        if !joined {
            return Ok(chat);
        }

        let updated = self
            .deps
            .chat_repository
            .add_member(chat_id, user_id)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::ChatNotFound))?;

        info!(chat_id = %chat_id, user_id = %user_id, "member added");
        publish(
            self.deps.broadcaster.as_ref(),
            ChatEvent::AddToChat { chat_id, user_id },
        )
        .await;
        Ok(updated)
    }

    /// 移除成员；房间因此变空时由存储在同一次操作里删除，返回的房间成员为空。
    /// 用户本来就不在房间里时不写存储也不广播。
    pub async fn remove_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Chat, ApplicationError> {
        let mut chat = self.load_chat(chat_id).await?;
        let left = chat.remove_member(user_id)?;

        self.deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        if !left {
            return Ok(chat);
        }

        let removal = self
            .deps
            .chat_repository
            .remove_member(chat_id, user_id)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::ChatNotFound))?;

        info!(chat_id = %chat_id, user_id = %user_id, "member removed");
        publish(
            self.deps.broadcaster.as_ref(),
            ChatEvent::RemoveFromChat { chat_id, user_id },
        )
        .await;

        if let Some(chat_removal) = removal.chat_removal {
            info!(
                chat_id = %chat_id,
                messages = chat_removal.removed_messages.len(),
                "empty chat deleted"
            );
            publish(
                self.deps.broadcaster.as_ref(),
                ChatEvent::DeleteChat { chat_id },
            )
            .await;
        }
        Ok(removal.chat)
    }

    pub async fn leave_chat(&self, chat_id: ChatId, user_id: UserId) -> Result<Chat, ApplicationError> {
        self.remove_member(chat_id, user_id).await
    }

    pub async fn delete_chat(&self, chat_id: ChatId) -> Result<(), ApplicationError> {
        let chat = self.load_chat(chat_id).await?;
        chat.ensure_deletable()?;

        let removal = self
            .deps
            .chat_repository
            .delete(chat_id)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::ChatNotFound))?;

        info!(
            chat_id = %chat_id,
            messages = removal.removed_messages.len(),
            "chat deleted"
        );
        publish(
            self.deps.broadcaster.as_ref(),
            ChatEvent::DeleteChat { chat_id },
        )
        .await;
        Ok(())
    }

    /// 条件删除：并发加入的成员会让这一步放弃。返回是否真的删除了。
    async fn delete_if_empty(&self, chat_id: ChatId) -> Result<bool, ApplicationError> {
        let Some(removal) = self.deps.chat_repository.delete_if_empty(chat_id).await? else {
            return Ok(false);
        };

        info!(
            chat_id = %chat_id,
            messages = removal.removed_messages.len(),
            "empty chat deleted"
        );
        publish(
            self.deps.broadcaster.as_ref(),
            ChatEvent::DeleteChat { chat_id },
        )
        .await;
        Ok(true)
    }

    /// 级联删除用户之后的善后，逐个清理，失败只记日志
    pub async fn remove_orphans(&self, chat_ids: &[ChatId]) -> usize {
        let mut removed = 0;
        for chat_id in chat_ids {
            match self.delete_if_empty(*chat_id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => {
                    error!(chat_id = %chat_id, error = %err, "failed to clean up empty chat")
                }
            }
        }
        removed
    }

    pub async fn get_chat(&self, chat_id: ChatId) -> Result<ChatDetails, ApplicationError> {
        let chat = self.load_chat(chat_id).await?;

        let members = self
            .deps
            .user_repository
            .find_many(&chat.members)
            .await?
            .iter()
            .map(|user| user.summary())
            .collect();

        let messages = self
            .deps
            .message_repository
            .list_by_chat(chat_id)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::ChatNotFound))?;
        let messages = resolve_messages(self.deps.user_repository.as_ref(), &messages).await?;

        Ok(ChatDetails::new(&chat, members, messages))
    }

    pub async fn global_chat(&self) -> Result<ChatDetails, ApplicationError> {
        self.get_chat(ChatId::GLOBAL).await
    }
}
