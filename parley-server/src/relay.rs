use crate::catalog::{OpenCatalog, RoomCatalog, StaticCatalog};
use crate::config::ServerConfig;
use crate::room::RoomRegistry;
use crate::signaling::{SignalingService, ws_handler};
use anyhow::Context;
use axum::Router;
use axum::routing::get;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// State shared by every WebSocket handler of one relay.
#[derive(Clone)]
pub struct RelayState {
    pub signaling: SignalingService,
    pub registry: RoomRegistry,
    auth_token: Option<Arc<str>>,
}

impl RelayState {
    pub fn new(config: &ServerConfig, catalog: Arc<dyn RoomCatalog>) -> Self {
        let signaling = SignalingService::new();
        let registry = RoomRegistry::new(Arc::new(signaling.clone()), catalog)
            .with_queue_capacity(config.room_queue_capacity);

        Self {
            signaling,
            registry,
            auth_token: config.auth_token.as_deref().map(Arc::from),
        }
    }

    /// Without a configured token every connection is accepted.
    pub fn authorize(&self, token: Option<&str>) -> bool {
        match &self.auth_token {
            Some(expected) => token == Some(expected.as_ref()),
            None => true,
        }
    }
}

/// HTTP surface of the relay: `ws://host/ws/{participant_id}?token=...` plus `/health`.
pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/{participant_id}", get(ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Runs the relay on an already bound listener until `shutdown` resolves.
pub async fn serve_on<F>(listener: TcpListener, state: RelayState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("relay server failed")
}

/// Binds `config.bind_addr` and serves until Ctrl-C.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let catalog: Arc<dyn RoomCatalog> = match &config.enrolled {
        Some(path) => {
            info!(path = %path.display(), "Loading enrollment table");
            Arc::new(StaticCatalog::from_json_file(path)?)
        }
        None => Arc::new(OpenCatalog),
    };

    let state = RelayState::new(&config, catalog);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(
        addr = %config.bind_addr,
        auth = config.auth_token.is_some(),
        "Signaling relay listening"
    );

    serve_on(listener, state, shutdown_signal()).await?;

    info!("Signaling relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
