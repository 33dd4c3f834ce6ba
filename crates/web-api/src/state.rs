use std::sync::Arc;

use application::{
    AffinityRanker, AffinityRankerDependencies, ChatRepository, Clock, EventBroadcaster,
    MembershipService, MembershipServiceDependencies, MessageRepository, MessageService,
    MessageServiceDependencies, PasswordHasher, SessionHub, TokenVerifier, UserRepository,
    UserService, UserServiceDependencies,
};

use crate::auth::JwtService;

/// 组装服务所需的外部协作者
pub struct Collaborators {
    pub user_repository: Arc<dyn UserRepository>,
    pub chat_repository: Arc<dyn ChatRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AppState {
    pub membership_service: Arc<MembershipService>,
    pub message_service: Arc<MessageService>,
    pub user_service: Arc<UserService>,
    pub affinity_ranker: Arc<AffinityRanker>,
    pub session_hub: Arc<SessionHub>,
    pub token_verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// 所有服务共用同一个会话层作为事件出口
    pub fn new(
        collaborators: Collaborators,
        session_hub: Arc<SessionHub>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        let Collaborators {
            user_repository,
            chat_repository,
            message_repository,
            password_hasher,
            clock,
        } = collaborators;
        let broadcaster: Arc<dyn EventBroadcaster> = session_hub.clone();

        let membership_service = Arc::new(MembershipService::new(MembershipServiceDependencies {
            user_repository: user_repository.clone(),
            chat_repository: chat_repository.clone(),
            message_repository: message_repository.clone(),
            clock: clock.clone(),
            broadcaster: broadcaster.clone(),
        }));

        let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
            user_repository: user_repository.clone(),
            chat_repository: chat_repository.clone(),
            message_repository: message_repository.clone(),
            clock: clock.clone(),
            broadcaster: broadcaster.clone(),
        }));

        let user_service = Arc::new(UserService::new(UserServiceDependencies {
            user_repository: user_repository.clone(),
            chat_repository,
            password_hasher,
            token_issuer: jwt_service.clone(),
            clock,
            broadcaster,
            membership: membership_service.clone(),
        }));

        let affinity_ranker = Arc::new(AffinityRanker::new(AffinityRankerDependencies {
            user_repository,
            message_repository,
        }));

        Self {
            membership_service,
            message_service,
            user_service,
            affinity_ranker,
            session_hub,
            token_verifier: jwt_service,
        }
    }
}
