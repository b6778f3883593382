//! HTTP surface of the gateway
//!
//! Every API route is served both at the root and under `/spark`, the
//! prefix older mobile clients use.

pub mod error;
pub mod handlers;

use crate::chat::ChatService;
use crate::config::Config;
use crate::draw::DrawGenerator;
use crate::error::Result;
use crate::providers::{create_connector, Connector};
use crate::reassembler::Reassembler;
use crate::signer::Signer;
use crate::storage::{SqliteStore, Store};
use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub draws: DrawGenerator,
    pub signer: Signer,
}

impl AppState {
    /// Wire the services around a connector and a store
    pub fn new(config: &Config, connector: Arc<dyn Connector>, store: Arc<dyn Store>) -> Self {
        let signer = Signer::from_config(&config.spark);
        let reassembler = Reassembler::new(&config.spark, signer.clone(), connector);
        let chat = ChatService::new(reassembler, &config.chat, Arc::clone(&store));
        let draws = DrawGenerator::new(chat.clone(), store);
        Self {
            chat,
            draws,
            signer,
        }
    }

    /// Production wiring: WebSocket connector and SQLite store
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = SqliteStore::from_config(&config.storage)?;
        tracing::info!(db = %store.db_path().display(), "Storage ready");
        Ok(Self::new(
            config,
            create_connector(&config.spark),
            Arc::new(store),
        ))
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/stream", post(handlers::chat_stream))
        .route("/title", post(handlers::title))
        .route("/handshake", get(handlers::handshake))
        .route("/draws/today", get(handlers::draw_today))
        .route("/draws/daily", post(handlers::draw_daily))
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes())
        .nest("/spark", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM
pub async fn serve(config: &Config, state: AppState) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(%addr, "HTTP server listening");
    if !state.signer.is_configured() {
        tracing::warn!("Spark credentials are not configured; chat returns a notice");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
