//! 基础设施层实现。
//!
//! 提供 PostgreSQL 存储、bcrypt 密码哈希，以及根据配置在内存存储与数据库之间选择后端的装配入口。

pub mod builder;
pub mod migrations;
pub mod password;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{create_pg_pool, PgStore};
