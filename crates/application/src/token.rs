//! 身份令牌协作者
//!
//! 核心逻辑不签发也不解析令牌，只通过这两个接口拿到调用者身份。

use domain::UserId;

use crate::error::ApplicationError;

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: UserId) -> Result<String, ApplicationError>;
}

pub trait TokenVerifier: Send + Sync {
    /// 校验失败统一返回 `ApplicationError::Authentication`
    fn verify(&self, token: &str) -> Result<UserId, ApplicationError>;
}
