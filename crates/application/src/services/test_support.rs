//! 服务测试共用的替身与装配

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use domain::{ChatEvent, ChatId, PasswordHash, UserId};

use crate::{
    broadcaster::{BroadcastError, EventBroadcaster},
    clock::FixedClock,
    dto::MessageView,
    error::ApplicationError,
    memory::InMemoryStore,
    password::{PasswordHasher, PasswordHasherError},
    token::TokenIssuer,
};

use super::{
    AffinityRanker, AffinityRankerDependencies, CreateChatRequest, MembershipService,
    MembershipServiceDependencies, MessageService, MessageServiceDependencies,
    PostMessageRequest, RegisterUserRequest, UserService, UserServiceDependencies,
};

/// 记录所有推送过的事件
#[derive(Default)]
pub(crate) struct RecordingBroadcaster {
    events: Mutex<Vec<ChatEvent>>,
}

impl RecordingBroadcaster {
    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(ChatEvent::name).collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventBroadcaster for RecordingBroadcaster {
    async fn broadcast(&self, event: ChatEvent) -> Result<usize, BroadcastError> {
        self.events.lock().unwrap().push(event);
        Ok(1)
    }
}

/// 明文前缀代替 bcrypt，测试不需要真实哈希
pub(crate) struct PlainHasher;

#[async_trait]
impl PasswordHasher for PlainHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        PasswordHash::new(format!("plain:{plaintext}"))
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        Ok(hashed.as_str() == format!("plain:{plaintext}"))
    }
}

pub(crate) struct StaticTokens;

impl TokenIssuer for StaticTokens {
    fn issue(&self, user_id: UserId) -> Result<String, ApplicationError> {
        Ok(format!("token-{user_id}"))
    }
}

pub(crate) struct Fixture {
    pub store: InMemoryStore,
    pub events: Arc<RecordingBroadcaster>,
    pub membership: Arc<MembershipService>,
    pub messages: MessageService,
    pub users: UserService,
    pub ranker: AffinityRanker,
}

impl Fixture {
    pub fn new() -> Self {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let store = InMemoryStore::new(now);
        let shared = Arc::new(store.clone());
        let events = Arc::new(RecordingBroadcaster::default());
        let clock = Arc::new(FixedClock(now));

        let membership = Arc::new(MembershipService::new(MembershipServiceDependencies {
            user_repository: shared.clone(),
            chat_repository: shared.clone(),
            message_repository: shared.clone(),
            clock: clock.clone(),
            broadcaster: events.clone(),
        }));
        let messages = MessageService::new(MessageServiceDependencies {
            user_repository: shared.clone(),
            chat_repository: shared.clone(),
            message_repository: shared.clone(),
            clock: clock.clone(),
            broadcaster: events.clone(),
        });
        let users = UserService::new(UserServiceDependencies {
            user_repository: shared.clone(),
            chat_repository: shared.clone(),
            password_hasher: Arc::new(PlainHasher),
            token_issuer: Arc::new(StaticTokens),
            clock,
            broadcaster: events.clone(),
            membership: membership.clone(),
        });
        let ranker = AffinityRanker::new(AffinityRankerDependencies {
            user_repository: shared.clone(),
            message_repository: shared,
        });

        Self {
            store,
            events,
            membership,
            messages,
            users,
            ranker,
        }
    }

    pub async fn register(&self, name: &str) -> UserId {
        self.users
            .register(RegisterUserRequest {
                username: name.to_owned(),
                password: "secret".to_owned(),
                confirm_password: "secret".to_owned(),
            })
            .await
            .unwrap()
            .id
    }

    pub async fn chat(&self, name: &str, founder: UserId) -> ChatId {
        self.membership
            .create_chat(CreateChatRequest {
                name: name.to_owned(),
                founder_id: founder.into(),
            })
            .await
            .unwrap()
            .id
    }

    pub async fn post(&self, chat_id: ChatId, author: UserId, body: &str) -> MessageView {
        self.messages
            .post_message(PostMessageRequest {
                chat_id: chat_id.into(),
                author_id: author.into(),
                body: body.to_owned(),
                sent_at: None,
            })
            .await
            .unwrap()
    }
}
