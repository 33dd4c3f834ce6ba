use std::sync::Arc;

use application::{
    ChatRepository, InMemoryStore, MessageRepository, PasswordHasher, UserRepository,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStore},
};

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    /// 为空时使用内存存储
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bcrypt_cost: Option<u32>,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            bcrypt_cost: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 装配好的外部协作者：三个存储接口指向同一个后端
#[derive(Clone)]
pub struct Infrastructure {
    pub user_repository: Arc<dyn UserRepository>,
    pub chat_repository: Arc<dyn ChatRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
}

impl Infrastructure {
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let password_hasher = Arc::new(BcryptPasswordHasher::new(config.bcrypt_cost));

        let Some(database_url) = config.database_url.as_deref() else {
            warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            return Ok(Self::with_store(
                Arc::new(InMemoryStore::default()),
                password_hasher,
            ));
        };

        let pool = create_pg_pool(database_url, config.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        info!(max_connections = config.max_connections, "postgres store ready");

        Ok(Self::with_store(Arc::new(PgStore::new(pool)), password_hasher))
    }

    /// 用任意同时实现三个存储接口的后端装配
    pub fn with_store<S>(store: Arc<S>, password_hasher: Arc<dyn PasswordHasher>) -> Self
    where
        S: UserRepository + ChatRepository + MessageRepository + 'static,
    {
        Self {
            user_repository: store.clone(),
            chat_repository: store.clone(),
            message_repository: store,
            password_hasher,
        }
    }
}
