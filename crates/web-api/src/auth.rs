//! JWT 认证
//!
//! `JwtService` 同时充当应用层的令牌签发者和校验者；
//! `AuthUser` 从 `Authorization: Bearer <token>` 中取出调用者身份。

use application::{ApplicationError, TokenIssuer, TokenVerifier};
use axum::{extract::FromRequestParts, http::request::Parts};
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token
    pub fn generate_token(&self, user_id: UserId) -> Result<String, ApplicationError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            sub: user_id.into(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            ApplicationError::infrastructure(format!("token generation failed: {}", err))
        })
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApplicationError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "rejected token");
                ApplicationError::Authentication
            })
    }
}

impl TokenIssuer for JwtService {
    fn issue(&self, user_id: UserId) -> Result<String, ApplicationError> {
        self.generate_token(user_id)
    }
}

impl TokenVerifier for JwtService {
    fn verify(&self, token: &str) -> Result<UserId, ApplicationError> {
        self.verify_token(token).map(|claims| UserId::from(claims.sub))
    }
}

/// 已认证的调用者
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl AuthUser {
    /// 只允许调用者修改自己的资源
    pub fn ensure_is(&self, target: UserId) -> Result<(), ApiError> {
        if self.0 == target {
            Ok(())
        } else {
            Err(ApplicationError::Authorization.into())
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid authorization header format"))?;

        let user_id = state.token_verifier.verify(token)?;
        Ok(AuthUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> JwtService {
        JwtService::new(JwtConfig {
            secret: secret.to_string(),
            expiration_hours: 1,
        })
    }

    #[test]
    fn issued_token_verifies_to_same_user() {
        let jwt = service("unit-test-secret-key-with-enough-length");
        let user_id = UserId::from(Uuid::new_v4());

        let token = jwt.issue(user_id).unwrap();
        assert_eq!(jwt.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let issuer = service("unit-test-secret-key-with-enough-length");
        let verifier = service("another-secret-key-with-enough-length!!");
        let token = issuer.issue(UserId::from(Uuid::new_v4())).unwrap();

        assert!(matches!(
            verifier.verify(&token),
            Err(ApplicationError::Authentication)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = JwtService::new(JwtConfig {
            secret: "unit-test-secret-key-with-enough-length".to_string(),
            expiration_hours: -2,
        });
        let token = jwt.issue(UserId::from(Uuid::new_v4())).unwrap();

        assert!(matches!(jwt.verify(&token), Err(ApplicationError::Authentication)));
    }

    #[test]
    fn garbage_is_rejected() {
        let jwt = service("unit-test-secret-key-with-enough-length");
        assert!(jwt.verify("not.a.jwt").is_err());
    }

    #[test]
    fn ensure_is_only_accepts_the_caller() {
        let caller = UserId::from(Uuid::new_v4());
        let auth = AuthUser(caller);
        assert!(auth.ensure_is(caller).is_ok());
        assert_eq!(
            auth.ensure_is(UserId::from(Uuid::new_v4()))
                .unwrap_err()
                .status(),
            axum::http::StatusCode::FORBIDDEN
        );
    }
}
