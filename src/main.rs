//! Card Table Back binary entrypoint wiring REST, WebSocket, SSE, and the
//! durable room store.

use std::{env, net::SocketAddr};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_config = AppConfig::load();
    let app_state = AppState::new(app_config);

    spawn_storage_supervisor(app_state.clone());
    app_state.scheduler().start(app_state.clone()).await;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    // Cancel scheduler ticks and heartbeat timers before the state is torn down.
    app_state.scheduler().stop().await;
    app_state.registry().shutdown();

    Ok(())
}

/// Keep the durable store connected in the background, entering degraded mode
/// while it is unreachable.
#[cfg(feature = "couch-store")]
fn spawn_storage_supervisor(state: SharedState) {
    use std::sync::Arc;

    use crate::dao::room_store::RoomStore;
    use crate::dao::room_store::couchdb::{CouchConfig, CouchRoomStore};
    use crate::dao::storage::StorageError;

    tokio::spawn(services::storage_supervisor::run(state, || async {
        let config = CouchConfig::from_env()
            .map_err(|err| StorageError::unavailable(err.to_string(), err))?;
        let store = CouchRoomStore::connect(config)
            .await
            .map_err(|err| StorageError::unavailable(err.to_string(), err))?;
        Ok(Arc::new(store) as Arc<dyn RoomStore>)
    }));
}

/// Without a database backend compiled in, fall back to the in-memory store.
#[cfg(not(feature = "couch-store"))]
fn spawn_storage_supervisor(state: SharedState) {
    use std::sync::Arc;

    use crate::dao::room_store::memory::MemoryRoomStore;

    tokio::spawn(async move {
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        tracing::warn!("no durable backend compiled in; using the in-memory room store");
    });
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
