//! 内存实现的存储（开发模式与测试使用）
//!
//! 所有文档放在同一把读写锁后面，因此每个 trait 方法天然就是一次多文档原子操作。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    Bio, Chat, ChatId, Message, MessageId, RepositoryError, Timestamp, User, UserId, Username,
};
use tokio::sync::RwLock;

use crate::repository::{
    ChatRemoval, ChatRepository, MemberRemoval, MessageRepository, UserRemoval, UserRepository,
};

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, User>,
    usernames: HashMap<String, UserId>,
    chats: HashMap<ChatId, Chat>,
    messages: HashMap<MessageId, Message>,
}

impl StoreState {
    /// 删除房间及其消息，并清理成员与作者两侧的引用
    fn remove_chat(&mut self, chat_id: ChatId) -> Option<ChatRemoval> {
        let chat = self.chats.remove(&chat_id)?;

        for message_id in &chat.messages {
            if let Some(message) = self.messages.remove(message_id) {
                if let Some(author) = self.users.get_mut(&message.author_id) {
                    author.forget_message(message.id);
                }
            }
        }
        for member in &chat.members {
            if let Some(user) = self.users.get_mut(member) {
                user.leave_chat(chat_id);
            }
        }

        Some(ChatRemoval {
            removed_messages: chat.messages.clone(),
            chat,
        })
    }
}

#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    /// 创建空存储，并写入 Global 聊天室
    pub fn new(now: Timestamp) -> Self {
        let mut state = StoreState::default();
        state.chats.insert(ChatId::GLOBAL, Chat::global(now));
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(chrono::Utc::now())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let key = user.username.as_str().to_owned();
        if state.usernames.contains_key(&key) || state.users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict);
        }

        let mut user = user;
        if let Some(global) = state.chats.get_mut(&ChatId::GLOBAL) {
            global.enroll(user.id);
            user.join_chat(ChatId::GLOBAL);
        }

        state.usernames.insert(key, user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .usernames
            .get(username.as_str())
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn find_many(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.as_str().cmp(b.username.as_str()));
        Ok(users)
    }

    async fn update_profile(
        &self,
        id: UserId,
        bio: Option<Bio>,
        now: Timestamp,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.update_bio(bio, now);
        Ok(user.clone())
    }

    async fn befriend(&self, user_id: UserId, friend_id: UserId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) || !state.users.contains_key(&friend_id) {
            return Err(RepositoryError::NotFound);
        }
        // 两侧都存在后再写，保证不会只改一边
        for (owner, other) in [(user_id, friend_id), (friend_id, user_id)] {
            if let Some(user) = state.users.get_mut(&owner) {
                user.add_friend(other)
                    .map_err(|err| RepositoryError::storage(err.to_string()))?;
            }
        }
        Ok(())
    }

    async fn unfriend(&self, user_id: UserId, friend_id: UserId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) || !state.users.contains_key(&friend_id) {
            return Err(RepositoryError::NotFound);
        }
        for (owner, other) in [(user_id, friend_id), (friend_id, user_id)] {
            if let Some(user) = state.users.get_mut(&owner) {
                user.remove_friend(other);
            }
        }
        Ok(())
    }

    async fn delete_cascade(&self, id: UserId) -> Result<UserRemoval, RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.users.remove(&id).ok_or(RepositoryError::NotFound)?;
        state.usernames.remove(user.username.as_str());

        let mut removed_messages = Vec::with_capacity(user.messages.len());
        for message_id in &user.messages {
            if let Some(message) = state.messages.remove(message_id) {
                if let Some(chat) = state.chats.get_mut(&message.chat_id) {
                    chat.remove_message(message.id);
                }
                removed_messages.push((message.chat_id, message.id));
            }
        }

        let mut orphaned_chats = Vec::new();
        for chat_id in &user.chats {
            if let Some(chat) = state.chats.get_mut(chat_id) {
                chat.withdraw(id);
                if chat.is_orphaned() {
                    orphaned_chats.push(*chat_id);
                }
            }
        }

        for friend_id in &user.friends {
            if let Some(friend) = state.users.get_mut(friend_id) {
                friend.remove_friend(id);
            }
        }

        Ok(UserRemoval {
            user,
            removed_messages,
            orphaned_chats,
        })
    }
}

#[async_trait]
impl ChatRepository for InMemoryStore {
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError> {
        let mut state = self.state.write().await;
        if state.chats.contains_key(&chat.id) {
            return Err(RepositoryError::Conflict);
        }
        for member in &chat.members {
            if !state.users.contains_key(member) {
                return Err(RepositoryError::NotFound);
            }
        }
        for member in &chat.members {
            if let Some(user) = state.users.get_mut(member) {
                user.join_chat(chat.id);
            }
        }
        state.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.chats.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[ChatId]) -> Result<Vec<Chat>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.chats.get(id).cloned())
            .collect())
    }

    async fn add_member(&self, chat_id: ChatId, user_id: UserId) -> Result<Chat, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(RepositoryError::NotFound);
        }
        let chat = state.chats.get_mut(&chat_id).ok_or(RepositoryError::NotFound)?;
        chat.enroll(user_id);
        let chat = chat.clone();
        if let Some(user) = state.users.get_mut(&user_id) {
            user.join_chat(chat_id);
        }
        Ok(chat)
    }

    async fn remove_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MemberRemoval, RepositoryError> {
        let mut state = self.state.write().await;
        let chat = state.chats.get_mut(&chat_id).ok_or(RepositoryError::NotFound)?;
        chat.withdraw(user_id);
        let chat = chat.clone();
        if let Some(user) = state.users.get_mut(&user_id) {
            user.leave_chat(chat_id);
        }
        let chat_removal = if chat.is_orphaned() {
            state.remove_chat(chat_id)
        } else {
            None
        };
        Ok(MemberRemoval { chat, chat_removal })
    }

    async fn delete(&self, chat_id: ChatId) -> Result<ChatRemoval, RepositoryError> {
        let mut state = self.state.write().await;
        state.remove_chat(chat_id).ok_or(RepositoryError::NotFound)
    }

    async fn delete_if_empty(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<ChatRemoval>, RepositoryError> {
        let mut state = self.state.write().await;
        match state.chats.get(&chat_id) {
            Some(chat) if chat.is_orphaned() => Ok(state.remove_chat(chat_id)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn append(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&message.author_id) {
            return Err(RepositoryError::NotFound);
        }
        let chat = state
            .chats
            .get_mut(&message.chat_id)
            .ok_or(RepositoryError::NotFound)?;
        chat.append_message(message.id);
        if let Some(author) = state.users.get_mut(&message.author_id) {
            author.record_message(message.id);
        }
        state.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.messages.get(&id).cloned())
    }

    async fn delete(&self, id: MessageId) -> Result<Message, RepositoryError> {
        let mut state = self.state.write().await;
        let message = state.messages.remove(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(chat) = state.chats.get_mut(&message.chat_id) {
            chat.remove_message(id);
        }
        if let Some(author) = state.users.get_mut(&message.author_id) {
            author.forget_message(id);
        }
        Ok(message)
    }

    async fn list_by_chat(&self, chat_id: ChatId) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let chat = state.chats.get(&chat_id).ok_or(RepositoryError::NotFound)?;
        Ok(chat
            .messages
            .iter()
            .filter_map(|id| state.messages.get(id).cloned())
            .collect())
    }

    async fn list_by_chats(&self, chat_ids: &[ChatId]) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let wanted: HashSet<&ChatId> = chat_ids.iter().collect();
        let mut messages = Vec::new();
        for chat in state.chats.values().filter(|chat| wanted.contains(&chat.id)) {
            messages.extend(chat.messages.iter().filter_map(|id| state.messages.get(id).cloned()));
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{ChatName, MessageBody, PasswordHash};
    use uuid::Uuid;

    fn new_user(name: &str) -> User {
        User::register(
            UserId::from(Uuid::new_v4()),
            Username::parse(name).unwrap(),
            PasswordHash::new("hash").unwrap(),
            Utc::now(),
        )
    }

    fn new_chat(founder: UserId) -> Chat {
        Chat::found(
            ChatId::from(Uuid::new_v4()),
            ChatName::parse("room").unwrap(),
            founder,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn create_user_enrolls_in_global() {
        let store = InMemoryStore::default();
        let alice = UserRepository::create(&store, new_user("alice")).await.unwrap();

        let global = ChatRepository::find_by_id(&store, ChatId::GLOBAL).await.unwrap().unwrap();
        assert_eq!(global.members, vec![alice.id]);
        assert_eq!(alice.chats, vec![ChatId::GLOBAL]);
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = InMemoryStore::default();
        UserRepository::create(&store, new_user("alice")).await.unwrap();
        let err = UserRepository::create(&store, new_user("alice")).await.unwrap_err();
        assert_eq!(err, RepositoryError::Conflict);
    }

    #[tokio::test]
    async fn befriend_requires_both_users() {
        let store = InMemoryStore::default();
        let alice = UserRepository::create(&store, new_user("alice")).await.unwrap();
        let ghost = UserId::from(Uuid::new_v4());

        let err = store.befriend(alice.id, ghost).await.unwrap_err();
        assert_eq!(err, RepositoryError::NotFound);

        let alice = UserRepository::find_by_id(&store, alice.id).await.unwrap().unwrap();
        assert!(alice.friends.is_empty());
    }

    #[tokio::test]
    async fn delete_if_empty_skips_populated_chat() {
        let store = InMemoryStore::default();
        let alice = UserRepository::create(&store, new_user("alice")).await.unwrap();
        let bob = UserRepository::create(&store, new_user("bob")).await.unwrap();
        let chat = ChatRepository::create(&store, new_chat(alice.id)).await.unwrap();
        store.add_member(chat.id, bob.id).await.unwrap();

        let removed = store.remove_member(chat.id, alice.id).await.unwrap();
        assert_eq!(removed.chat.members, vec![bob.id]);
        assert!(removed.chat_removal.is_none());

        assert!(store.delete_if_empty(chat.id).await.unwrap().is_none());
        assert!(ChatRepository::find_by_id(&store, chat.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn removing_last_member_deletes_chat_in_same_step() {
        let store = InMemoryStore::default();
        let alice = UserRepository::create(&store, new_user("alice")).await.unwrap();
        let chat = ChatRepository::create(&store, new_chat(alice.id)).await.unwrap();

        let removed = store.remove_member(chat.id, alice.id).await.unwrap();
        assert!(removed.chat.is_orphaned());
        let chat_removal = removed.chat_removal.expect("emptied chat removed");
        assert_eq!(chat_removal.chat.id, chat.id);

        assert!(ChatRepository::find_by_id(&store, chat.id).await.unwrap().is_none());
        let alice = UserRepository::find_by_id(&store, alice.id).await.unwrap().unwrap();
        assert!(!alice.chats.contains(&chat.id));
    }

    #[tokio::test]
    async fn deleting_chat_removes_messages_from_authors() {
        let store = InMemoryStore::default();
        let alice = UserRepository::create(&store, new_user("alice")).await.unwrap();
        let chat = ChatRepository::create(&store, new_chat(alice.id)).await.unwrap();
        let message = Message::new(
            MessageId::from(Uuid::new_v4()),
            chat.id,
            alice.id,
            MessageBody::new("hi").unwrap(),
            Utc::now(),
        );
        store.append(message.clone()).await.unwrap();

        let removal = ChatRepository::delete(&store, chat.id).await.unwrap();
        assert_eq!(removal.removed_messages, vec![message.id]);

        let alice = UserRepository::find_by_id(&store, alice.id).await.unwrap().unwrap();
        assert!(alice.messages.is_empty());
        assert!(!alice.in_chat(chat.id));
        assert!(MessageRepository::find_by_id(&store, message.id).await.unwrap().is_none());
    }
}
