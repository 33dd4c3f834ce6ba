#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use application::{InMemoryStore, SessionConfig, SessionHub, SystemClock};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use infrastructure::{BcryptPasswordHasher, Infrastructure};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use web_api::{router, AppState, Collaborators, JwtConfig, JwtService};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub fn build_app() -> TestApp {
    let infra = Infrastructure::with_store(
        Arc::new(InMemoryStore::default()),
        Arc::new(BcryptPasswordHasher::new(Some(4))),
    );
    let session_hub = Arc::new(SessionHub::new(SessionConfig {
        grace_period: Duration::from_secs(30),
        outbound_buffer: 64,
    }));
    let jwt_service = Arc::new(JwtService::new(JwtConfig {
        secret: "integration-test-secret-key-0123456789".to_string(),
        expiration_hours: 1,
    }));

    let state = AppState::new(
        Collaborators {
            user_repository: infra.user_repository,
            chat_repository: infra.chat_repository,
            message_repository: infra.message_repository,
            password_hasher: infra.password_hasher,
            clock: Arc::new(SystemClock),
        },
        session_hub,
        jwt_service,
    );

    TestApp {
        router: router(state.clone()),
        state,
    }
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// 注册并登录，返回 (用户 ID, token)
pub async fn sign_up_and_in(router: &Router, username: &str) -> (Uuid, String) {
    let (status, profile) = send(
        router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({
            "username": username,
            "password": "secret",
            "confirm_password": "secret"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {profile}");

    let (status, session) = send(
        router,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({ "username": username, "password": "secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "signin failed: {session}");

    let id = profile["id"].as_str().unwrap().parse().unwrap();
    let token = session["token"].as_str().unwrap().to_string();
    (id, token)
}
