use std::collections::HashMap;
use std::hash::Hash;

use application::{
    ChatRemoval, ChatRepository, MemberRemoval, MessageRepository, UserRemoval, UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Bio, Chat, ChatId, ChatName, Message, MessageBody, MessageId, PasswordHash, RepositoryError,
    Timestamp, User, UserId, Username,
};
use sqlx::{error::ErrorKind, postgres::PgPoolOptions, FromRow, PgExecutor, PgPool};
use tracing::debug;
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        match db.kind() {
            ErrorKind::UniqueViolation => return RepositoryError::Conflict,
            // 引用的用户或房间不存在
            ErrorKind::ForeignKeyViolation => return RepositoryError::NotFound,
            _ => {}
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn ids<T: Copy + Into<Uuid>>(values: &[T]) -> Vec<Uuid> {
    values.iter().map(|value| (*value).into()).collect()
}

/// `= ANY($1)` 不保证顺序，按调用方给出的顺序重排
fn in_request_order<K, T>(requested: &[K], items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T>
where
    K: Eq + Hash + Copy,
{
    let mut by_id: HashMap<K, T> = items.into_iter().map(|item| (key(&item), item)).collect();
    requested.iter().filter_map(|id| by_id.remove(id)).collect()
}

const USER_SELECT: &str = r#"
    SELECT u.id, u.username, u.password_hash, u.bio, u.created_at, u.updated_at,
           COALESCE((SELECT array_agg(m.chat_id ORDER BY m.joined_seq)
                     FROM chat_members m WHERE m.user_id = u.id), '{}'::uuid[]) AS chats,
           COALESCE((SELECT array_agg(f.friend_id ORDER BY f.formed_seq)
                     FROM friendships f WHERE f.user_id = u.id), '{}'::uuid[]) AS friends,
           COALESCE((SELECT array_agg(msg.id ORDER BY msg.seq)
                     FROM messages msg WHERE msg.author_id = u.id), '{}'::uuid[]) AS messages
    FROM users u
"#;

const CHAT_SELECT: &str = r#"
    SELECT c.id, c.name, c.created_at,
           COALESCE((SELECT array_agg(m.user_id ORDER BY m.joined_seq)
                     FROM chat_members m WHERE m.chat_id = c.id), '{}'::uuid[]) AS members,
           COALESCE((SELECT array_agg(msg.id ORDER BY msg.seq)
                     FROM messages msg WHERE msg.chat_id = c.id), '{}'::uuid[]) AS messages
    FROM chats c
"#;

const MESSAGE_SELECT: &str = "SELECT id, chat_id, author_id, body, sent_at FROM messages";

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    password_hash: String,
    bio: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    chats: Vec<Uuid>,
    friends: Vec<Uuid>,
    messages: Vec<Uuid>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let username = Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let password =
            PasswordHash::new(value.password_hash).map_err(|err| invalid_data(err.to_string()))?;
        let bio = match value.bio {
            Some(bio) => Bio::parse(bio).map_err(|err| invalid_data(err.to_string()))?,
            None => None,
        };

        Ok(User {
            id: UserId::from(value.id),
            username,
            password,
            bio,
            chats: value.chats.into_iter().map(ChatId::from).collect(),
            friends: value.friends.into_iter().map(UserId::from).collect(),
            messages: value.messages.into_iter().map(MessageId::from).collect(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChatRecord {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    members: Vec<Uuid>,
    messages: Vec<Uuid>,
}

impl TryFrom<ChatRecord> for Chat {
    type Error = RepositoryError;

    fn try_from(value: ChatRecord) -> Result<Self, Self::Error> {
        let name = ChatName::parse(value.name).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Chat {
            id: ChatId::from(value.id),
            name,
            members: value.members.into_iter().map(UserId::from).collect(),
            messages: value.messages.into_iter().map(MessageId::from).collect(),
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    chat_id: Uuid,
    author_id: Uuid,
    body: String,
    sent_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let body = MessageBody::new(value.body).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message::new(
            MessageId::from(value.id),
            ChatId::from(value.chat_id),
            UserId::from(value.author_id),
            body,
            value.sent_at,
        ))
    }
}

async fn fetch_user<'e, E>(executor: E, id: UserId) -> Result<Option<User>, RepositoryError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("{USER_SELECT} WHERE u.id = $1");
    sqlx::query_as::<_, UserRecord>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_err)?
        .map(User::try_from)
        .transpose()
}

async fn fetch_chat<'e, E>(executor: E, id: ChatId) -> Result<Option<Chat>, RepositoryError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("{CHAT_SELECT} WHERE c.id = $1");
    sqlx::query_as::<_, ChatRecord>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_err)?
        .map(Chat::try_from)
        .transpose()
}

/// 锁住房间行，成员变更与条件删除在同一房间上串行执行
async fn lock_chat<'e, E>(executor: E, id: ChatId) -> Result<(), RepositoryError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM chats WHERE id = $1 FOR UPDATE")
        .bind(Uuid::from(id))
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_err)?
        .map(|_| ())
        .ok_or(RepositoryError::NotFound)
}

/// PostgreSQL 存储。每个会同时写多张表的方法都在一个事务里完成。
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, bio, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(user.id))
        .bind(user.username.as_str())
        .bind(user.password.as_str())
        .bind(user.bio.as_ref().map(Bio::as_str))
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            "INSERT INTO chat_members (chat_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(Uuid::from(ChatId::GLOBAL))
        .bind(Uuid::from(user.id))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let stored = fetch_user(&mut *tx, user.id)
            .await?
            .ok_or_else(|| invalid_data("inserted user not visible"))?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(stored)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        fetch_user(&self.pool, id).await
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!("{USER_SELECT} WHERE u.username = $1");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(username.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(User::try_from)
            .transpose()
    }

    async fn find_many(&self, requested: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        if requested.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{USER_SELECT} WHERE u.id = ANY($1)");
        let users = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(ids(requested))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(in_request_order(requested, users, |user| user.id))
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let sql = format!("{USER_SELECT} ORDER BY u.username");
        sqlx::query_as::<_, UserRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn update_profile(
        &self,
        id: UserId,
        bio: Option<Bio>,
        now: Timestamp,
    ) -> Result<User, RepositoryError> {
        let result = sqlx::query("UPDATE users SET bio = $2, updated_at = $3 WHERE id = $1")
            .bind(Uuid::from(id))
            .bind(bio.as_ref().map(Bio::as_str))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        fetch_user(&self.pool, id).await?.ok_or(RepositoryError::NotFound)
    }

    async fn befriend(&self, user_id: UserId, friend_id: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        for (owner, other) in [(user_id, friend_id), (friend_id, user_id)] {
            sqlx::query(
                "INSERT INTO friendships (user_id, friend_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(Uuid::from(owner))
            .bind(Uuid::from(other))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }
        tx.commit().await.map_err(map_sqlx_err)?;
        debug!(user_id = %user_id, friend_id = %friend_id, "friendship stored");
        Ok(())
    }

    async fn unfriend(&self, user_id: UserId, friend_id: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ANY($1)")
            .bind(vec![Uuid::from(user_id), Uuid::from(friend_id)])
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        if found != 2 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query(
            r#"
            DELETE FROM friendships
            WHERE (user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1)
            "#,
        )
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(friend_id))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn delete_cascade(&self, id: UserId) -> Result<UserRemoval, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let user = fetch_user(&mut *tx, id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let removed_messages = sqlx::query_as::<_, (Uuid, Uuid)>(
            "DELETE FROM messages WHERE author_id = $1 RETURNING chat_id, id",
        )
        .bind(Uuid::from(id))
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_err)?
        .into_iter()
        .map(|(chat_id, message_id)| (ChatId::from(chat_id), MessageId::from(message_id)))
        .collect();

        let left: Vec<Uuid> = sqlx::query_scalar(
            "DELETE FROM chat_members WHERE user_id = $1 RETURNING chat_id",
        )
        .bind(Uuid::from(id))
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let orphaned: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT c.id FROM chats c
            WHERE c.id = ANY($1) AND c.id <> $2
              AND NOT EXISTS (SELECT 1 FROM chat_members m WHERE m.chat_id = c.id)
            "#,
        )
        .bind(&left)
        .bind(Uuid::from(ChatId::GLOBAL))
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query("DELETE FROM friendships WHERE user_id = $1 OR friend_id = $1")
            .bind(Uuid::from(id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        let orphaned_chats = in_request_order(
            &user.chats,
            orphaned.into_iter().map(ChatId::from).collect(),
            |chat_id| *chat_id,
        );
        Ok(UserRemoval {
            user,
            removed_messages,
            orphaned_chats,
        })
    }
}

#[async_trait]
impl ChatRepository for PgStore {
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query("INSERT INTO chats (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(Uuid::from(chat.id))
            .bind(chat.name.as_str())
            .bind(chat.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        for member in &chat.members {
            sqlx::query("INSERT INTO chat_members (chat_id, user_id) VALUES ($1, $2)")
                .bind(Uuid::from(chat.id))
                .bind(Uuid::from(*member))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        }

        let stored = fetch_chat(&mut *tx, chat.id)
            .await?
            .ok_or_else(|| invalid_data("inserted chat not visible"))?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(stored)
    }

    async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError> {
        fetch_chat(&self.pool, id).await
    }

    async fn find_many(&self, requested: &[ChatId]) -> Result<Vec<Chat>, RepositoryError> {
        if requested.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{CHAT_SELECT} WHERE c.id = ANY($1)");
        let chats = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(ids(requested))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Chat::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(in_request_order(requested, chats, |chat| chat.id))
    }

    async fn add_member(&self, chat_id: ChatId, user_id: UserId) -> Result<Chat, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        lock_chat(&mut *tx, chat_id).await?;

        sqlx::query(
            "INSERT INTO chat_members (chat_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(Uuid::from(chat_id))
        .bind(Uuid::from(user_id))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let chat = fetch_chat(&mut *tx, chat_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(chat)
    }

    async fn remove_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MemberRemoval, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        lock_chat(&mut *tx, chat_id).await?;

        sqlx::query("DELETE FROM chat_members WHERE chat_id = $1 AND user_id = $2")
            .bind(Uuid::from(chat_id))
            .bind(Uuid::from(user_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        let chat = fetch_chat(&mut *tx, chat_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        // 变空的房间在同一事务里删除，提交之后不会留下零成员的房间
        let chat_removal = if chat.is_orphaned() {
            sqlx::query("DELETE FROM chats WHERE id = $1")
                .bind(Uuid::from(chat_id))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
            Some(ChatRemoval {
                removed_messages: chat.messages.clone(),
                chat: chat.clone(),
            })
        } else {
            None
        };
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(MemberRemoval { chat, chat_removal })
    }

    async fn delete(&self, chat_id: ChatId) -> Result<ChatRemoval, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        lock_chat(&mut *tx, chat_id).await?;
        let chat = fetch_chat(&mut *tx, chat_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        // 成员与消息随外键级联删除
        sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(Uuid::from(chat_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        tx.commit().await.map_err(map_sqlx_err)?;

        Ok(ChatRemoval {
            removed_messages: chat.messages.clone(),
            chat,
        })
    }

    async fn delete_if_empty(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<ChatRemoval>, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        match lock_chat(&mut *tx, chat_id).await {
            Ok(()) => {}
            Err(RepositoryError::NotFound) => return Ok(None),
            Err(err) => return Err(err),
        }

        let Some(chat) = fetch_chat(&mut *tx, chat_id).await? else {
            return Ok(None);
        };
        if !chat.is_orphaned() {
            return Ok(None);
        }

        sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(Uuid::from(chat_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        tx.commit().await.map_err(map_sqlx_err)?;

        Ok(Some(ChatRemoval {
            removed_messages: chat.messages.clone(),
            chat,
        }))
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    async fn append(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, chat_id, author_id, body, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, chat_id, author_id, body, sent_at
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.chat_id))
        .bind(Uuid::from(message.author_id))
        .bind(message.body.as_str())
        .bind(message.sent_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let sql = format!("{MESSAGE_SELECT} WHERE id = $1");
        sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(Message::try_from)
            .transpose()
    }

    async fn delete(&self, id: MessageId) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            "DELETE FROM messages WHERE id = $1 RETURNING id, chat_id, author_id, body, sent_at",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Message::try_from(record)
    }

    async fn list_by_chat(&self, chat_id: ChatId) -> Result<Vec<Message>, RepositoryError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM chats WHERE id = $1)")
            .bind(Uuid::from(chat_id))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if !exists {
            return Err(RepositoryError::NotFound);
        }

        let sql = format!("{MESSAGE_SELECT} WHERE chat_id = $1 ORDER BY seq");
        sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(Uuid::from(chat_id))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }

    async fn list_by_chats(&self, chat_ids: &[ChatId]) -> Result<Vec<Message>, RepositoryError> {
        if chat_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{MESSAGE_SELECT} WHERE chat_id = ANY($1) ORDER BY seq");
        sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(ids(chat_ids))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
