//! 统一配置中心
//!
//! 全部配置来自环境变量：
//! - 服务监听地址
//! - 数据库连接（未设置时使用内存存储）
//! - JWT 认证
//! - 实时会话（断线宽限期、出站队列容量）
//! - 安全参数（bcrypt cost）

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// 开发环境使用的 JWT 密钥，`validate` 会拒绝它
const DEV_JWT_SECRET: &str = "dev-secret-key-not-for-production-use-minimum-32-chars";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub session: SessionSettings,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 数据库配置，`url` 为空表示使用内存存储
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

/// 实时会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// 断线后保留订阅的秒数
    pub grace_period_secs: u64,
    /// 每个连接的出站队列容量
    pub outbound_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub bcrypt_cost: Option<u32>,
}

impl AppConfig {
    /// 从环境变量加载配置，`JWT_SECRET` 必须显式设置
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), true)
    }

    /// 开发环境版本：缺失的密钥使用不安全的默认值
    pub fn from_env_with_defaults() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), false)
    }

    /// 从任意键值来源加载，测试中用来避开进程环境变量
    pub fn from_lookup<F>(lookup: F, strict: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = match lookup("JWT_SECRET") {
            Some(secret) => secret,
            None if strict => return Err(ConfigError::MissingVar("JWT_SECRET")),
            None => DEV_JWT_SECRET.to_string(),
        };

        Ok(Self {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                port: parse_or(&lookup, "SERVER_PORT", 8080)?,
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            },
            jwt: JwtConfig {
                secret,
                expiration_hours: parse_or(&lookup, "JWT_EXPIRATION_HOURS", 24)?,
            },
            session: SessionSettings {
                grace_period_secs: parse_or(&lookup, "SESSION_GRACE_SECS", 120)?,
                outbound_buffer: parse_or(&lookup, "SESSION_OUTBOUND_BUFFER", 1024)?,
            },
            security: SecurityConfig {
                bcrypt_cost: parse_optional(&lookup, "BCRYPT_COST")?,
            },
        })
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 至少 256 位
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }
        if self.jwt.expiration_hours <= 0 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT expiration must be positive".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerPort(
                "port 0 is not allowed".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidDatabaseConfig(
                "Max connections must be greater than 0".to_string(),
            ));
        }

        if self.session.outbound_buffer == 0 {
            return Err(ConfigError::InvalidSessionConfig(
                "outbound buffer must hold at least one event".to_string(),
            ));
        }

        if let Some(cost) = self.security.bcrypt_cost {
            if !(4..=31).contains(&cost) {
                return Err(ConfigError::InvalidSecurityConfig(format!(
                    "bcrypt cost {cost} is outside 4..=31"
                )));
            }
        }

        Ok(())
    }

    /// 是否仍在使用开发密钥
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt.secret == DEV_JWT_SECRET
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_optional(lookup, key)?.unwrap_or(default))
}

fn parse_optional<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(None),
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid server port: {0}")]
    InvalidServerPort(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid session configuration: {0}")]
    InvalidSessionConfig(String),
    #[error("Invalid security configuration: {0}")]
    InvalidSecurityConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const SECRET: &str = "production-grade-secret-key-with-sufficient-length";

    #[test]
    fn test_defaults_without_any_vars() {
        let config = AppConfig::from_lookup(lookup(&[]), false).unwrap();
        assert_eq!(config.server.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.database.url, None);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.jwt.expiration_hours, 24);
        assert_eq!(config.session.grace_period_secs, 120);
        assert_eq!(config.session.outbound_buffer, 1024);
        assert!(config.uses_dev_secret());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strict_mode_requires_jwt_secret() {
        let result = AppConfig::from_lookup(lookup(&[]), true);
        assert!(matches!(result, Err(ConfigError::MissingVar("JWT_SECRET"))));
    }

    #[test]
    fn test_values_are_read_from_lookup() {
        let config = AppConfig::from_lookup(
            lookup(&[
                ("JWT_SECRET", SECRET),
                ("SERVER_HOST", "0.0.0.0"),
                ("SERVER_PORT", "9000"),
                ("DATABASE_URL", "postgres://user:pass@db:5432/chat"),
                ("SESSION_GRACE_SECS", "300"),
                ("BCRYPT_COST", "10"),
            ]),
            true,
        )
        .unwrap();

        assert_eq!(config.server.bind_address(), "0.0.0.0:9000");
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://user:pass@db:5432/chat")
        );
        assert_eq!(config.session.grace_period_secs, 300);
        assert_eq!(config.security.bcrypt_cost, Some(10));
        assert!(!config.uses_dev_secret());
    }

    #[test]
    fn test_blank_database_url_means_memory_store() {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")]), false).unwrap();
        assert_eq!(config.database.url, None);
    }

    #[test]
    fn test_unparsable_number_is_rejected() {
        let result = AppConfig::from_lookup(lookup(&[("SERVER_PORT", "eighty")]), false);
        match result {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "SERVER_PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", SECRET)]), true).unwrap();
        assert!(config.validate().is_ok());

        config.jwt.secret = "short".to_string();
        assert!(config.validate().is_err());
        config.jwt.secret = SECRET.to_string();

        config.server.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidServerPort(_))
        ));
        config.server.port = 8080;

        config.database.max_connections = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDatabaseConfig(_))
        ));
    }

    #[test]
    fn test_bcrypt_cost_validation() {
        let mut config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", SECRET)]), true).unwrap();

        config.security.bcrypt_cost = Some(12);
        assert!(config.validate().is_ok());

        config.security.bcrypt_cost = Some(3);
        assert!(config.validate().is_err());

        config.security.bcrypt_cost = Some(32);
        assert!(config.validate().is_err());
    }
}
