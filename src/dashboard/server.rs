use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use super::api::{self, AppState, SharedState};
use super::db::{DashboardDb, DbHandle};
use super::poller::spawn_poller;
use super::ws;
use crate::board::cache::{BoardFetcher, SnapshotCache};
use crate::board::client::{BoardApi, Credentials, TrelloClient};
use crate::config::DashboardConfig;

/// Runtime switches for `char3 serve`. Everything else comes from
/// [`DashboardConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Bind on all interfaces and allow any CORS origin.
    pub dev_mode: bool,
    pub open_browser: bool,
    /// Disable the background refresh even if an interval is configured.
    pub no_poll: bool,
}

/// Wire the board client, snapshot cache and store into shared state.
pub fn build_state(config: &DashboardConfig, db: DbHandle) -> SharedState {
    let credentials = Credentials::new(config.token().map(str::to_string));
    let api: Arc<dyn BoardApi> = Arc::new(TrelloClient::new(
        config.base_url(),
        config.api_key().unwrap_or_default(),
        credentials.clone(),
    ));
    let source = Arc::new(BoardFetcher::new(api.clone(), config.board_ids()));
    let cache = SnapshotCache::with_system_clock(source, config.cache_ttl());
    Arc::new(AppState::new(
        api,
        credentials,
        cache,
        db,
        config.list_roles(),
        config.utc_offset(),
    ))
}

/// API routes plus the `/ws` event stream.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

pub async fn start_server(config: &DashboardConfig, server: ServerConfig) -> Result<()> {
    for warning in config.validate() {
        warn!("{}", warning);
    }

    let db = DashboardDb::new(config.db_path()).context("Failed to initialize dashboard database")?;
    let state = build_state(config, DbHandle::new(db));

    let forwarder = ws::spawn_cache_forwarder(state.cache.subscribe(), state.ws_tx.clone());
    let poller = match config.poll_interval() {
        Some(interval) if !server.no_poll => {
            info!(interval_secs = interval.as_secs(), "background refresh enabled");
            Some(spawn_poller(state.cache.clone(), interval))
        }
        _ => None,
    };

    let mut app = build_router(state);
    if server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if server.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    let url = format!("http://{}", local_addr);
    info!(%url, db = %config.db_path().display(), "dashboard server listening");
    println!("char3 dashboard running at {}", url);

    if server.open_browser
        && let Err(e) = open::that(&url)
    {
        warn!(error = %e, "could not open browser");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(poller) = poller {
        poller.abort();
    }
    forwarder.abort();
    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
