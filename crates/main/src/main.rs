//! 主应用程序入口
//!
//! 加载配置，装配存储与服务，启动 Axum Web API 服务。

use std::{sync::Arc, time::Duration};

use application::{SessionConfig, SessionHub, SystemClock};
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, Collaborators, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env_with_defaults()?;
    config.validate()?;
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET not set, using the development secret");
    }

    let infra = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        bcrypt_cost: config.security.bcrypt_cost,
    })
    .await?;

    let session_hub = Arc::new(SessionHub::new(SessionConfig {
        grace_period: Duration::from_secs(config.session.grace_period_secs),
        outbound_buffer: config.session.outbound_buffer,
    }));
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        Collaborators {
            user_repository: infra.user_repository,
            chat_repository: infra.chat_repository,
            message_repository: infra.message_repository,
            password_hasher: infra.password_hasher,
            clock: Arc::new(SystemClock),
        },
        session_hub.clone(),
        jwt_service,
    );

    let app = router(state);
    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(address = %address, "聊天服务器启动");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(session_hub.clone()))
        .await?;

    tracing::info!("服务器已停止");
    Ok(())
}

/// 等待 SIGINT / SIGTERM，然后关闭会话层，让 WebSocket 连接结束
async fn shutdown_signal(session_hub: Arc<SessionHub>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    session_hub.shutdown().await;
}
