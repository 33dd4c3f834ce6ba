use application::{ConnectionId, ResumeToken, SessionHandle};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::ChatId;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// 客户端发来的控制帧
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    JoinChat { chat_id: ChatId },
    LeaveChat { chat_id: ChatId },
    Resume { token: ResumeToken },
}

/// 会话层自身的下行帧，与领域事件共用 `{"event", "data"}` 外形
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerFrame {
    Session {
        connection_id: ConnectionId,
        resume_token: ResumeToken,
        resumed: bool,
        rooms: Vec<ChatId>,
    },
    Error {
        message: String,
    },
}

type Sink = SplitSink<WebSocket, WsMessage>;

/// WebSocket 连接
///
/// 一个连接对应会话层里的一个注册项：
/// - 连接建立后先下发 `session` 帧，带上 resume token
/// - 会话层推来的事件原样转发
/// - 处理 joinChat / leaveChat / resume 控制帧
/// - 连接结束时通知会话层，订阅进入宽限期
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState) -> Self {
        Self { socket, state }
    }

    pub async fn run(self) {
        let Self { socket, state } = self;
        let hub = state.session_hub.clone();

        let (mut sender, mut incoming) = socket.split();

        let SessionHandle {
            connection_id,
            resume_token,
            mut events,
        } = match hub.connect().await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(error = %err, "rejecting websocket connection");
                let frame = ServerFrame::Error {
                    message: err.to_string(),
                };
                let _ = send_frame(&mut sender, &frame).await;
                let _ = sender.send(WsMessage::Close(None)).await;
                return;
            }
        };
        tracing::info!(connection_id = %connection_id, "websocket connected");

        let hello = ServerFrame::Session {
            connection_id,
            resume_token,
            resumed: false,
            rooms: Vec::new(),
        };
        if send_frame(&mut sender, &hello).await.is_err() {
            hub.disconnect(connection_id).await;
            return;
        }

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        // 会话层关闭了队列：停机或者本连接跟不上被摘除
                        tracing::debug!(connection_id = %connection_id, "outbound channel closed");
                        let _ = sender.send(WsMessage::Close(None)).await;
                        break;
                    };
                    let payload = match serde_json::to_string(event.as_ref()) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize websocket payload");
                            continue;
                        }
                    };
                    if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                        tracing::debug!(connection_id = %connection_id, "websocket send failed");
                        break;
                    }
                }
                message = incoming.next() => {
                    match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            let reply = handle_frame(&state, connection_id, text.as_str()).await;
                            if let Some(reply) = reply {
                                if send_frame(&mut sender, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            tracing::debug!(connection_id = %connection_id, "websocket closed by client");
                            break;
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            let frame = ServerFrame::Error {
                                message: "binary frames are not supported".to_string(),
                            };
                            if send_frame(&mut sender, &frame).await.is_err() {
                                break;
                            }
                        }
                        // ping/pong 由底层自动应答
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::debug!(connection_id = %connection_id, error = %err, "websocket read failed");
                            break;
                        }
                    }
                }
            }
        }

        hub.disconnect(connection_id).await;
        tracing::info!(connection_id = %connection_id, "websocket disconnected");
    }
}

/// 处理一条控制帧，返回需要回给客户端的帧
async fn handle_frame(
    state: &AppState,
    connection_id: ConnectionId,
    text: &str,
) -> Option<ServerFrame> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::debug!(connection_id = %connection_id, error = %err, "malformed client frame");
            return Some(ServerFrame::Error {
                message: format!("malformed frame: {}", err),
            });
        }
    };

    let hub = &state.session_hub;
    let result = match frame {
        ClientFrame::JoinChat { chat_id } => hub.join(connection_id, chat_id).await.map(|_| None),
        ClientFrame::LeaveChat { chat_id } => hub.leave(connection_id, chat_id).await.map(|_| None),
        ClientFrame::Resume { token } => hub.resume(connection_id, token).await.map(|rooms| {
            Some(ServerFrame::Session {
                connection_id,
                resume_token: token,
                resumed: true,
                rooms,
            })
        }),
    };

    result.unwrap_or_else(|err| {
        Some(ServerFrame::Error {
            message: err.to_string(),
        })
    })
}

async fn send_frame(sender: &mut Sink, frame: &ServerFrame) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(WsMessage::Text(payload.into())).await
}
