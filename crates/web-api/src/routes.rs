use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::{
    AuthenticateUserRequest, AuthenticatedUser, ChatDetails, CreateChatRequest, FriendAffinity,
    MessageView, PostMessageRequest, RegisterUserRequest, UserProfile,
};
use domain::{Chat, ChatId, ChatSummary, MessageId, UserId, UserSummary};

use crate::{auth::AuthUser, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct SignupPayload {
    username: String,
    password: String,
    confirm_password: String,
}

#[derive(Debug, Deserialize)]
struct SigninPayload {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ProfilePayload {
    #[serde(default)]
    bio: String,
}

#[derive(Debug, Deserialize)]
struct FriendPayload {
    friend_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct CreateChatPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AddMemberPayload {
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct PostMessagePayload {
    body: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    connections: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/auth/signup", post(signup))
        .route("/auth/signin", post(signin))
        .route("/users", get(list_users))
        .route(
            "/users/{user_id}",
            get(get_user).put(update_profile).delete(delete_user),
        )
        .route("/users/{user_id}/chats", get(get_user_chats))
        .route(
            "/users/{user_id}/friends",
            get(get_friends).put(add_friend).delete(remove_friend),
        )
        .route("/users/{user_id}/friends/best", get(best_friends))
        .route("/chats", post(create_chat))
        .route("/chats/global", get(global_chat))
        .route(
            "/chats/{chat_id}",
            get(get_chat).put(leave_chat).delete(delete_chat),
        )
        .route("/chats/{chat_id}/members", put(add_member))
        .route(
            "/chats/{chat_id}/messages",
            get(get_history).post(post_message),
        )
        .route(
            "/chats/{chat_id}/messages/{message_id}",
            axum::routing::delete(delete_message),
        )
        .route("/ws", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        connections: state.session_hub.connection_count().await,
    })
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupPayload>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let profile = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            password: payload.password,
            confirm_password: payload.confirm_password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(profile)))
}

async fn signin(
    State(state): State<AppState>,
    Json(payload): Json<SigninPayload>,
) -> Result<Json<AuthenticatedUser>, ApiError> {
    let authenticated = state
        .user_service
        .authenticate(AuthenticateUserRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    Ok(Json(authenticated))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.user_service.list_users().await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.user_service.get_user(UserId::from(user_id)).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ProfilePayload>,
) -> Result<Json<UserProfile>, ApiError> {
    let user_id = UserId::from(user_id);
    auth.ensure_is(user_id)?;

    let profile = state
        .user_service
        .update_profile(user_id, payload.bio)
        .await?;
    Ok(Json(profile))
}

async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = UserId::from(user_id);
    auth.ensure_is(user_id)?;

    state.user_service.delete_user(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_user_chats(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    Ok(Json(state.user_service.get_chats(UserId::from(user_id)).await?))
}

async fn get_friends(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.user_service.get_friends(UserId::from(user_id)).await?))
}

async fn add_friend(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<FriendPayload>,
) -> Result<StatusCode, ApiError> {
    let user_id = UserId::from(user_id);
    auth.ensure_is(user_id)?;

    state
        .user_service
        .add_friend(user_id, UserId::from(payload.friend_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_friend(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<FriendPayload>,
) -> Result<StatusCode, ApiError> {
    let user_id = UserId::from(user_id);
    auth.ensure_is(user_id)?;

    state
        .user_service
        .remove_friend(user_id, UserId::from(payload.friend_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn best_friends(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<FriendAffinity>>, ApiError> {
    Ok(Json(state.affinity_ranker.rank(UserId::from(user_id)).await?))
}

async fn create_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateChatPayload>,
) -> Result<(StatusCode, Json<Chat>), ApiError> {
    let chat = state
        .membership_service
        .create_chat(CreateChatRequest {
            name: payload.name,
            founder_id: auth.0.into(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(chat)))
}

async fn global_chat(State(state): State<AppState>) -> Result<Json<ChatDetails>, ApiError> {
    Ok(Json(state.membership_service.global_chat().await?))
}

async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<ChatDetails>, ApiError> {
    Ok(Json(
        state.membership_service.get_chat(ChatId::from(chat_id)).await?,
    ))
}

/// 调用者退出房间
async fn leave_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<Chat>, ApiError> {
    let chat = state
        .membership_service
        .leave_chat(ChatId::from(chat_id), auth.0)
        .await?;
    Ok(Json(chat))
}

async fn add_member(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(chat_id): Path<Uuid>,
    Json(payload): Json<AddMemberPayload>,
) -> Result<Json<Chat>, ApiError> {
    let chat = state
        .membership_service
        .add_member(ChatId::from(chat_id), UserId::from(payload.user_id))
        .await?;
    Ok(Json(chat))
}

async fn delete_chat(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(chat_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .membership_service
        .delete_chat(ChatId::from(chat_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<Uuid>,
    Json(payload): Json<PostMessagePayload>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let view = state
        .message_service
        .post_message(PostMessageRequest {
            chat_id,
            author_id: auth.0.into(),
            body: payload.body,
            sent_at: None,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// 房间历史，按写入顺序
async fn get_history(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    Ok(Json(
        state.message_service.get_history(ChatId::from(chat_id)).await?,
    ))
}

async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .message_service
        .delete_message(
            ChatId::from(chat_id),
            MessageId::from(message_id),
            auth.0,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state).run())
}
