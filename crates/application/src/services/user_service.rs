use std::sync::Arc;

use domain::{
    Bio, ChatEvent, ChatSummary, DomainError, RepositoryError, User, UserId, UserSummary,
    Username,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    broadcaster::EventBroadcaster,
    clock::Clock,
    dto::{AuthenticatedUser, UserProfile},
    error::ApplicationError,
    password::PasswordHasher,
    repository::{ChatRepository, UserRepository},
    token::TokenIssuer,
};

use super::membership_service::MembershipService;
use super::publish;

const MIN_PASSWORD_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticateUserRequest {
    pub username: String,
    pub password: String,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub chat_repository: Arc<dyn ChatRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub token_issuer: Arc<dyn TokenIssuer>,
    pub clock: Arc<dyn Clock>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
    pub membership: Arc<MembershipService>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    async fn load_user(&self, id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::UserNotFound.into())
    }

    /// 注册新用户，并在同一次存储操作里加入 Global
    pub async fn register(
        &self,
        request: RegisterUserRequest,
    ) -> Result<UserProfile, ApplicationError> {
        let username = Username::parse(request.username)?;
        // 口令两端空白不计入，存储的也是去掉空白后的哈希
        let password = request.password.trim();
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::invalid_argument(
                "password",
                "must be a minimum of 3 characters",
            )
            .into());
        }
        if password != request.confirm_password.trim() {
            return Err(
                DomainError::invalid_argument("confirm_password", "passwords do not match").into(),
            );
        }

        if self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .is_some()
        {
            return Err(DomainError::UserAlreadyExists.into());
        }

        let password = self.deps.password_hasher.hash(password).await?;
        let user = User::register(
            UserId::from(Uuid::new_v4()),
            username,
            password,
            self.deps.clock.now(),
        );

        // 并发注册同名用户时由存储的唯一约束兜底
        let stored = self
            .deps
            .user_repository
            .create(user)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict => DomainError::UserAlreadyExists.into(),
                other => ApplicationError::from(other),
            })?;

        info!(user_id = %stored.id, username = %stored.username, "user registered");
        Ok(UserProfile::from(&stored))
    }

    pub async fn authenticate(
        &self,
        request: AuthenticateUserRequest,
    ) -> Result<AuthenticatedUser, ApplicationError> {
        let username =
            Username::parse(request.username).map_err(|_| ApplicationError::Authentication)?;
        let user = self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        let valid = self
            .deps
            .password_hasher
            .verify(request.password.trim(), &user.password)
            .await?;
        if !valid {
            return Err(ApplicationError::Authentication);
        }

        let token = self.deps.token_issuer.issue(user.id)?;
        info!(user_id = %user.id, "user authenticated");
        Ok(AuthenticatedUser {
            user: UserProfile::from(&user),
            token,
        })
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, ApplicationError> {
        let users = self.deps.user_repository.list_all().await?;
        Ok(users.iter().map(User::summary).collect())
    }

    pub async fn get_user(&self, id: UserId) -> Result<UserProfile, ApplicationError> {
        let user = self.load_user(id).await?;
        Ok(UserProfile::from(&user))
    }

    /// 空字符串清空简介
    pub async fn update_profile(
        &self,
        id: UserId,
        bio: String,
    ) -> Result<UserProfile, ApplicationError> {
        let bio = Bio::parse(bio)?;
        let user = self
            .deps
            .user_repository
            .update_profile(id, bio, self.deps.clock.now())
            .await
            .map_err(ApplicationError::not_found_as(DomainError::UserNotFound))?;
        Ok(UserProfile::from(&user))
    }

    /// 级联删除用户。成员清零的房间随后逐个清理，清理失败不影响本次删除。
    pub async fn delete_user(&self, id: UserId) -> Result<(), ApplicationError> {
        let removal = self
            .deps
            .user_repository
            .delete_cascade(id)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::UserNotFound))?;

        info!(
            user_id = %id,
            messages = removal.removed_messages.len(),
            orphaned_chats = removal.orphaned_chats.len(),
            "user deleted"
        );

        let broadcaster = self.deps.broadcaster.as_ref();
        for friend_id in &removal.user.friends {
            publish(
                broadcaster,
                ChatEvent::RemoveFriend {
                    user_id: id,
                    friend_id: *friend_id,
                },
            )
            .await;
        }
        for (chat_id, message_id) in &removal.removed_messages {
            publish(
                broadcaster,
                ChatEvent::DeletedMessage {
                    chat_id: *chat_id,
                    message_id: *message_id,
                },
            )
            .await;
        }

        self.deps
            .membership
            .remove_orphans(&removal.orphaned_chats)
            .await;
        Ok(())
    }

    pub async fn get_chats(&self, id: UserId) -> Result<Vec<ChatSummary>, ApplicationError> {
        let user = self.load_user(id).await?;
        let chats = self.deps.chat_repository.find_many(&user.chats).await?;
        Ok(chats.iter().map(|chat| chat.summary()).collect())
    }

    pub async fn get_friends(&self, id: UserId) -> Result<Vec<UserSummary>, ApplicationError> {
        let user = self.load_user(id).await?;
        let friends = self.deps.user_repository.find_many(&user.friends).await?;
        Ok(friends.iter().map(User::summary).collect())
    }

    /// 双向建立好友关系，两侧在同一次存储操作中写入
    pub async fn add_friend(&self, id: UserId, friend_id: UserId) -> Result<(), ApplicationError> {
        if id == friend_id {
            return Err(DomainError::SelfFriendship.into());
        }
        self.deps
            .user_repository
            .befriend(id, friend_id)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::UserNotFound))?;

        info!(user_id = %id, friend_id = %friend_id, "friendship added");
        publish(
            self.deps.broadcaster.as_ref(),
            ChatEvent::AddFriend {
                user_id: id,
                friend_id,
            },
        )
        .await;
        Ok(())
    }

    pub async fn remove_friend(&self, id: UserId, friend_id: UserId) -> Result<(), ApplicationError> {
        if id == friend_id {
            return Err(DomainError::SelfFriendship.into());
        }
        self.deps
            .user_repository
            .unfriend(id, friend_id)
            .await
            .map_err(ApplicationError::not_found_as(DomainError::UserNotFound))?;

        info!(user_id = %id, friend_id = %friend_id, "friendship removed");
        publish(
            self.deps.broadcaster.as_ref(),
            ChatEvent::RemoveFriend {
                user_id: id,
                friend_id,
            },
        )
        .await;
        Ok(())
    }
}
