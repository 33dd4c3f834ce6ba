mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use support::{build_app, send, sign_up_and_in};

const GLOBAL: &str = "00000000-0000-0000-0000-000000000001";

#[tokio::test]
async fn status_reports_ok() {
    let app = build_app();
    let (status, body) = send(&app.router, Method::GET, "/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn signup_validation_and_signin_failures() {
    let app = build_app();
    let router = &app.router;

    let (status, body) = send(
        router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({"username": "alice", "password": "ab", "confirm_password": "ab"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");

    let (status, _) = send(
        router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({"username": "alice", "password": "secret", "confirm_password": "secreT"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    sign_up_and_in(router, "alice").await;

    let (status, body) = send(
        router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({"username": "alice", "password": "secret", "confirm_password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "USER_EXISTS");

    let (status, _) = send(
        router,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({"username": "alice", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        router,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({"username": "nobody", "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn new_users_land_in_global_and_profile_hides_credentials() {
    let app = build_app();
    let (alice, _) = sign_up_and_in(&app.router, "alice").await;

    let (status, profile) =
        send(&app.router, Method::GET, &format!("/users/{alice}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["chats"], json!([GLOBAL]));
    assert!(profile.get("password").is_none());

    let (_, global) = send(&app.router, Method::GET, "/chats/global", None, None).await;
    assert_eq!(global["members"][0]["username"], "alice");

    let (status, _) = send(
        &app.router,
        Method::GET,
        &format!("/users/{}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mutations_require_the_callers_own_token() {
    let app = build_app();
    let router = &app.router;
    let (_, alice_token) = sign_up_and_in(router, "alice").await;
    let (bob, _) = sign_up_and_in(router, "bob").await;

    let (status, _) = send(
        router,
        Method::POST,
        "/chats",
        None,
        Some(json!({"name": "no-token"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        router,
        Method::POST,
        "/chats",
        Some("garbage"),
        Some(json!({"name": "bad-token"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        router,
        Method::PUT,
        &format!("/users/{bob}"),
        Some(&alice_token),
        Some(json!({"bio": "hijacked"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        router,
        Method::DELETE,
        &format!("/users/{bob}"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn profile_update_and_clear() {
    let app = build_app();
    let (alice, token) = sign_up_and_in(&app.router, "alice").await;
    let uri = format!("/users/{alice}");

    let (status, profile) = send(
        &app.router,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({"bio": "  hello there  "})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["bio"], "hello there");

    let (_, profile) = send(
        &app.router,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({"bio": ""})),
    )
    .await;
    assert!(profile["bio"].is_null());
}

#[tokio::test]
async fn chat_lifecycle_ends_when_last_member_leaves() {
    let app = build_app();
    let router = &app.router;
    let (alice, alice_token) = sign_up_and_in(router, "alice").await;
    let (bob, bob_token) = sign_up_and_in(router, "bob").await;

    let (status, chat) = send(
        router,
        Method::POST,
        "/chats",
        Some(&alice_token),
        Some(json!({"name": "  Rustaceans "})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(chat["name"], "Rustaceans");
    assert_eq!(chat["members"], json!([alice.to_string()]));
    let chat_id = chat["id"].as_str().unwrap().to_string();

    let (status, chat) = send(
        router,
        Method::PUT,
        &format!("/chats/{chat_id}/members"),
        Some(&alice_token),
        Some(json!({"user_id": bob})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["members"], json!([alice.to_string(), bob.to_string()]));

    let (status, message) = send(
        router,
        Method::POST,
        &format!("/chats/{chat_id}/messages"),
        Some(&bob_token),
        Some(json!({"body": "hi all"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["author"]["username"], "bob");

    let (status, _) = send(
        router,
        Method::POST,
        &format!("/chats/{chat_id}/messages"),
        Some(&bob_token),
        Some(json!({"body": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, details) = send(router, Method::GET, &format!("/chats/{chat_id}"), None, None).await;
    assert_eq!(details["messages"].as_array().unwrap().len(), 1);
    assert_eq!(details["messages"][0]["body"], "hi all");
    assert_eq!(details["members"].as_array().unwrap().len(), 2);

    let (status, _) = send(
        router,
        Method::PUT,
        &format!("/chats/{chat_id}"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, chat) = send(
        router,
        Method::PUT,
        &format!("/chats/{chat_id}"),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["members"], json!([]));

    let (status, body) = send(router, Method::GET, &format!("/chats/{chat_id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CHAT_NOT_FOUND");

    let (_, chats) = send(router, Method::GET, &format!("/users/{bob}/chats"), None, None).await;
    assert_eq!(chats.as_array().unwrap().len(), 1);
    assert_eq!(chats[0]["id"], GLOBAL);
}

#[tokio::test]
async fn global_chat_cannot_be_left_or_deleted() {
    let app = build_app();
    let (_, token) = sign_up_and_in(&app.router, "alice").await;

    let (status, body) = send(
        &app.router,
        Method::PUT,
        &format!("/chats/{GLOBAL}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "GLOBAL_CHAT_IMMUTABLE");

    let (status, _) = send(
        &app.router,
        Method::DELETE,
        &format!("/chats/{GLOBAL}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn message_can_only_be_deleted_through_its_own_chat() {
    let app = build_app();
    let router = &app.router;
    let (_, token) = sign_up_and_in(router, "alice").await;

    let (_, chat) = send(
        router,
        Method::POST,
        "/chats",
        Some(&token),
        Some(json!({"name": "notes"})),
    )
    .await;
    let chat_id = chat["id"].as_str().unwrap().to_string();
    let (_, message) = send(
        router,
        Method::POST,
        &format!("/chats/{chat_id}/messages"),
        Some(&token),
        Some(json!({"body": "remember the milk"})),
    )
    .await;
    let message_id = message["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        router,
        Method::DELETE,
        &format!("/chats/{GLOBAL}/messages/{message_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        router,
        Method::DELETE,
        &format!("/chats/{chat_id}/messages/{message_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, details) = send(router, Method::GET, &format!("/chats/{chat_id}"), None, None).await;
    assert_eq!(details["messages"], json!([]));
    let (status, history) =
        send(router, Method::GET, &format!("/chats/{chat_id}/messages"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn friends_and_best_friends_ranking() {
    let app = build_app();
    let router = &app.router;
    let (alice, alice_token) = sign_up_and_in(router, "alice").await;
    let (bob, _) = sign_up_and_in(router, "bob").await;
    let (carol, carol_token) = sign_up_and_in(router, "carol").await;
    let friends_uri = format!("/users/{alice}/friends");

    for friend in [bob, carol] {
        let (status, _) = send(
            router,
            Method::PUT,
            &friends_uri,
            Some(&alice_token),
            Some(json!({"friend_id": friend})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, body) = send(
        router,
        Method::PUT,
        &friends_uri,
        Some(&alice_token),
        Some(json!({"friend_id": alice})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SELF_FRIENDSHIP");

    let (status, _) = send(
        router,
        Method::PUT,
        &friends_uri,
        Some(&alice_token),
        Some(json!({"friend_id": Uuid::new_v4()})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, bob_friends) =
        send(router, Method::GET, &format!("/users/{bob}/friends"), None, None).await;
    assert_eq!(bob_friends[0]["username"], "alice");

    // 没有共同房间时分数为 0，保持结识顺序
    let (_, best) = send(router, Method::GET, &format!("{friends_uri}/best"), None, None).await;
    assert_eq!(best[0]["friend"]["username"], "bob");
    assert_eq!(best[0]["score"], 0);
    assert_eq!(best[1]["friend"]["username"], "carol");

    let (_, chat) = send(
        router,
        Method::POST,
        "/chats",
        Some(&alice_token),
        Some(json!({"name": "alice-carol"})),
    )
    .await;
    let chat_id = chat["id"].as_str().unwrap().to_string();
    send(
        router,
        Method::PUT,
        &format!("/chats/{chat_id}/members"),
        Some(&alice_token),
        Some(json!({"user_id": carol})),
    )
    .await;
    for (token, body) in [(&carol_token, "hey"), (&alice_token, "hello"), (&carol_token, "sup")] {
        let (status, _) = send(
            router,
            Method::POST,
            &format!("/chats/{chat_id}/messages"),
            Some(token.as_str()),
            Some(json!({"body": body})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    // Global 里的消息不计入
    send(
        router,
        Method::POST,
        &format!("/chats/{GLOBAL}/messages"),
        Some(&alice_token),
        Some(json!({"body": "hi everyone"})),
    )
    .await;

    let (_, best) = send(router, Method::GET, &format!("{friends_uri}/best"), None, None).await;
    assert_eq!(best[0]["friend"]["username"], "carol");
    assert_eq!(best[0]["score"], 3);
    assert_eq!(best[1]["friend"]["username"], "bob");
    assert_eq!(best[1]["score"], 0);

    let (status, _) = send(
        router,
        Method::DELETE,
        &friends_uri,
        Some(&alice_token),
        Some(json!({"friend_id": carol})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, carol_friends) =
        send(router, Method::GET, &format!("/users/{carol}/friends"), None, None).await;
    assert_eq!(carol_friends, json!([]));
}

#[tokio::test]
async fn deleting_a_user_cascades() {
    let app = build_app();
    let router = &app.router;
    let (alice, alice_token) = sign_up_and_in(router, "alice").await;
    let (bob, _) = sign_up_and_in(router, "bob").await;

    send(
        router,
        Method::PUT,
        &format!("/users/{alice}/friends"),
        Some(&alice_token),
        Some(json!({"friend_id": bob})),
    )
    .await;
    let (_, solo) = send(
        router,
        Method::POST,
        "/chats",
        Some(&alice_token),
        Some(json!({"name": "solo"})),
    )
    .await;
    let solo_id = solo["id"].as_str().unwrap().to_string();
    send(
        router,
        Method::POST,
        &format!("/chats/{GLOBAL}/messages"),
        Some(&alice_token),
        Some(json!({"body": "bye"})),
    )
    .await;

    let (status, _) = send(
        router,
        Method::DELETE,
        &format!("/users/{alice}"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(router, Method::GET, &format!("/users/{alice}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(router, Method::GET, &format!("/chats/{solo_id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, bob_profile) = send(router, Method::GET, &format!("/users/{bob}"), None, None).await;
    assert_eq!(bob_profile["friends"], json!([]));

    let (_, global) = send(router, Method::GET, "/chats/global", None, None).await;
    assert_eq!(global["messages"], json!([]));
    assert_eq!(global["members"].as_array().unwrap().len(), 1);

    let (_, users) = send(router, Method::GET, "/users", None, None).await;
    assert_eq!(users, json!([{"id": bob.to_string(), "username": "bob"}]));
}
