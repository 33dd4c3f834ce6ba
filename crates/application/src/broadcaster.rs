use async_trait::async_trait;
use domain::ChatEvent;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 实时事件出口。房间事件只投递给该房间的订阅者，其余事件投递给所有在线连接。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    /// 返回事件实际入队的连接数
    async fn broadcast(&self, event: ChatEvent) -> Result<usize, BroadcastError>;
}
