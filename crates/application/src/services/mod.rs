mod affinity;
mod membership_service;
mod message_service;
mod user_service;

#[cfg(test)]
mod test_support;


use domain::ChatEvent;
use tracing::{debug, warn};

use crate::broadcaster::EventBroadcaster;

pub use affinity::{AffinityRanker, AffinityRankerDependencies};
pub use membership_service::{
    CreateChatRequest, MembershipService, MembershipServiceDependencies,
};
pub use message_service::{MessageService, MessageServiceDependencies, PostMessageRequest};
pub use user_service::{
    AuthenticateUserRequest, RegisterUserRequest, UserService, UserServiceDependencies,
};

/// 存储已经提交后再推送；推送失败只记日志，不影响调用结果
pub(crate) async fn publish(broadcaster: &dyn EventBroadcaster, event: ChatEvent) {
    let name = event.name();
    match broadcaster.broadcast(event).await {
        Ok(delivered) => debug!(event = name, delivered, "event dispatched"),
        Err(err) => warn!(event = name, error = %err, "event dispatch failed after commit"),
    }
}
