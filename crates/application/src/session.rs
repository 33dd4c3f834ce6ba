//! 实时会话层
//!
//! 维护连接到房间的订阅关系，把事件扇出到每个连接各自的有界队列。
//! 所有发布都在注册表写锁内完成，因此同一房间内的事件对所有订阅者保持发布顺序。
//!
//! 断线后订阅会以 resume token 为键暂存一个宽限期，期间新的连接可以凭 token
//! 一次性恢复全部订阅；超时后暂存被丢弃，客户端需要重新 `join`。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use domain::{ChatEvent, ChatId, EventScope};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcaster::{BroadcastError, EventBroadcaster};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 断线恢复凭据，同一逻辑会话在多次重连之间保持不变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumeToken(pub Uuid);

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session layer is shutting down")]
    ShuttingDown,
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
    #[error("resume token is unknown or expired")]
    InvalidResumeToken,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 断线后保留订阅的时长；为零时立即丢弃
    pub grace_period: Duration,
    /// 每个连接的出站队列容量
    pub outbound_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(120),
            outbound_buffer: 1024,
        }
    }
}

/// `connect` 返回给传输层的句柄。`events` 关闭意味着连接已被会话层移除。
#[derive(Debug)]
pub struct SessionHandle {
    pub connection_id: ConnectionId,
    pub resume_token: ResumeToken,
    pub events: mpsc::Receiver<Arc<ChatEvent>>,
}

struct Connection {
    sender: mpsc::Sender<Arc<ChatEvent>>,
    rooms: HashSet<ChatId>,
    resume_token: ResumeToken,
}

struct Parked {
    rooms: HashSet<ChatId>,
    epoch: u64,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<ChatId, HashSet<ConnectionId>>,
    parked: HashMap<ResumeToken, Parked>,
    epoch: u64,
    closed: bool,
}

impl Registry {
    fn subscribe(&mut self, connection_id: ConnectionId, chat_id: ChatId) -> Result<bool, SessionError> {
        let connection = self
            .connections
            .get_mut(&connection_id)
            .ok_or(SessionError::UnknownConnection(connection_id))?;
        let added = connection.rooms.insert(chat_id);
        self.rooms.entry(chat_id).or_default().insert(connection_id);
        Ok(added)
    }

    fn unsubscribe_all(&mut self, connection_id: ConnectionId, rooms: &HashSet<ChatId>) {
        for chat_id in rooms {
            if let Some(subscribers) = self.rooms.get_mut(chat_id) {
                subscribers.remove(&connection_id);
                if subscribers.is_empty() {
                    self.rooms.remove(chat_id);
                }
            }
        }
    }

    fn remove_connection(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&connection_id)?;
        self.unsubscribe_all(connection_id, &connection.rooms);
        Some(connection)
    }
}

/// 进程内的会话注册表。克隆共享同一份状态。
#[derive(Clone)]
pub struct SessionHub {
    registry: Arc<RwLock<Registry>>,
    config: SessionConfig,
}

impl SessionHub {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            config,
        }
    }

    /// 注册一个新连接，尚未订阅任何房间
    pub async fn connect(&self) -> Result<SessionHandle, SessionError> {
        let mut registry = self.registry.write().await;
        if registry.closed {
            return Err(SessionError::ShuttingDown);
        }

        let (sender, events) = mpsc::channel(self.config.outbound_buffer.max(1));
        let connection_id = ConnectionId(Uuid::new_v4());
        let resume_token = ResumeToken(Uuid::new_v4());
        registry.connections.insert(
            connection_id,
            Connection {
                sender,
                rooms: HashSet::new(),
                resume_token,
            },
        );

        info!(connection_id = %connection_id, "realtime connection registered");
        Ok(SessionHandle {
            connection_id,
            resume_token,
            events,
        })
    }

    /// 订阅房间，重复订阅无副作用
    pub async fn join(&self, connection_id: ConnectionId, chat_id: ChatId) -> Result<(), SessionError> {
        let mut registry = self.registry.write().await;
        if registry.closed {
            return Err(SessionError::ShuttingDown);
        }
        if registry.subscribe(connection_id, chat_id)? {
            debug!(connection_id = %connection_id, chat_id = %chat_id, "joined room");
        }
        Ok(())
    }

    pub async fn leave(&self, connection_id: ConnectionId, chat_id: ChatId) -> Result<(), SessionError> {
        let mut registry = self.registry.write().await;
        let connection = registry
            .connections
            .get_mut(&connection_id)
            .ok_or(SessionError::UnknownConnection(connection_id))?;
        if connection.rooms.remove(&chat_id) {
            let rooms = HashSet::from([chat_id]);
            registry.unsubscribe_all(connection_id, &rooms);
            debug!(connection_id = %connection_id, chat_id = %chat_id, "left room");
        }
        Ok(())
    }

    /// 用先前会话的 token 恢复订阅，恢复后当前连接接管该 token。
    /// 返回当前连接订阅的全部房间。
    pub async fn resume(
        &self,
        connection_id: ConnectionId,
        token: ResumeToken,
    ) -> Result<Vec<ChatId>, SessionError> {
        let mut registry = self.registry.write().await;
        if registry.closed {
            return Err(SessionError::ShuttingDown);
        }
        if !registry.connections.contains_key(&connection_id) {
            return Err(SessionError::UnknownConnection(connection_id));
        }
        let parked = registry
            .parked
            .remove(&token)
            .ok_or(SessionError::InvalidResumeToken)?;

        for chat_id in parked.rooms {
            registry.subscribe(connection_id, chat_id)?;
        }

        let connection = registry
            .connections
            .get_mut(&connection_id)
            .ok_or(SessionError::UnknownConnection(connection_id))?;
        connection.resume_token = token;
        let mut rooms: Vec<ChatId> = connection.rooms.iter().copied().collect();
        rooms.sort();

        info!(connection_id = %connection_id, rooms = rooms.len(), "session resumed");
        Ok(rooms)
    }

    /// 连接断开：移出所有房间，并在宽限期内暂存订阅
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let mut registry = self.registry.write().await;
        let Some(connection) = registry.remove_connection(connection_id) else {
            return;
        };

        if registry.closed || self.config.grace_period.is_zero() || connection.rooms.is_empty() {
            info!(connection_id = %connection_id, "realtime connection closed");
            return;
        }

        registry.epoch += 1;
        let epoch = registry.epoch;
        let token = connection.resume_token;
        registry.parked.insert(
            token,
            Parked {
                rooms: connection.rooms,
                epoch,
            },
        );
        drop(registry);

        info!(
            connection_id = %connection_id,
            grace_secs = self.config.grace_period.as_secs(),
            "realtime connection parked for resume"
        );
        self.schedule_expiry(token, epoch);
    }

    fn schedule_expiry(&self, token: ResumeToken, epoch: u64) {
        let registry: Weak<RwLock<Registry>> = Arc::downgrade(&self.registry);
        let grace_period = self.config.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let mut registry = registry.write().await;
            // 期间被恢复后又再次断开的会话会换成新的 epoch
            if registry.parked.get(&token).map(|parked| parked.epoch) == Some(epoch) {
                registry.parked.remove(&token);
                debug!(resume_token = %token, "parked session expired");
            }
        });
    }

    /// 把事件投递给目标连接，返回成功入队的连接数。
    /// 队列已满或已关闭的连接会被直接移除。
    pub async fn publish(&self, event: ChatEvent) -> Result<usize, SessionError> {
        let mut registry = self.registry.write().await;
        if registry.closed {
            return Err(SessionError::ShuttingDown);
        }

        let targets: Vec<ConnectionId> = match event.scope() {
            EventScope::Room(chat_id) => registry
                .rooms
                .get(&chat_id)
                .map(|subscribers| subscribers.iter().copied().collect())
                .unwrap_or_default(),
            EventScope::Broadcast => registry.connections.keys().copied().collect(),
        };

        let event = Arc::new(event);
        let mut delivered = 0;
        let mut dropped = Vec::new();
        for connection_id in targets {
            let Some(connection) = registry.connections.get(&connection_id) else {
                continue;
            };
            match connection.sender.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(_) => dropped.push(connection_id),
            }
        }

        for connection_id in dropped {
            registry.remove_connection(connection_id);
            warn!(
                connection_id = %connection_id,
                event = event.name(),
                "outbound queue full or closed, dropping connection"
            );
        }

        debug!(event = event.name(), delivered, "event published");
        Ok(delivered)
    }

    /// 关闭所有出站队列并拒绝后续注册
    pub async fn shutdown(&self) {
        let mut registry = self.registry.write().await;
        registry.closed = true;
        let connections = registry.connections.len();
        registry.connections.clear();
        registry.rooms.clear();
        registry.parked.clear();
        info!(connections, "session layer shut down");
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.connections.len()
    }

    pub async fn subscriber_count(&self, chat_id: ChatId) -> usize {
        self.registry
            .read()
            .await
            .rooms
            .get(&chat_id)
            .map_or(0, HashSet::len)
    }
}

#[async_trait]
impl EventBroadcaster for SessionHub {
    async fn broadcast(&self, event: ChatEvent) -> Result<usize, BroadcastError> {
        self.publish(event)
            .await
            .map_err(|err| BroadcastError::failed(err.to_string()))
    }
}
