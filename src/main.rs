//! Live Quiz Back binary entrypoint wiring WebSocket, REST, SSE and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_quiz_back::{
    config::AppConfig,
    dao::{game_store::memory::MemoryGameStore, quiz_catalog::QuizCatalog},
    routes,
    services::{persistence, sweeper},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let catalog = QuizCatalog::load(&config.quiz_file, config.default_time_limit());
    let app_state = AppState::new(config, catalog);

    tokio::spawn(persistence::run_worker(app_state.clone()));
    tokio::spawn(sweeper::run(app_state.clone()));
    start_storage(app_state.clone()).await;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

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

    Ok(())
}

fn env_set(var: &str) -> bool {
    env::var(var).is_ok_and(|value| !value.is_empty())
}

/// Pick the storage backend from the environment and keep it connected in the background.
///
/// Without any backend the server runs in degraded mode: games still work but nothing is stored.
async fn start_storage(state: SharedState) {
    if env_set("MONGO_URI") {
        #[cfg(feature = "mongo-store")]
        {
            use live_quiz_back::dao::{
                game_store::{
                    GameStore,
                    mongodb::{MongoConfig, MongoGameStore},
                },
                storage::StorageError,
            };

            info!("using MongoDB storage");
            tokio::spawn(live_quiz_back::services::storage_supervisor::run(
                state,
                || async {
                    let config = MongoConfig::from_env().await?;
                    let store = MongoGameStore::connect(config).await?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
                },
            ));
            return;
        }
        #[cfg(not(feature = "mongo-store"))]
        warn!("MONGO_URI is set but the mongo-store feature is disabled");
    }

    if env_set("COUCH_BASE_URL") {
        #[cfg(feature = "couch-store")]
        {
            use live_quiz_back::dao::{
                game_store::{
                    GameStore,
                    couchdb::{CouchConfig, CouchGameStore},
                },
                storage::StorageError,
            };

            info!("using CouchDB storage");
            tokio::spawn(live_quiz_back::services::storage_supervisor::run(
                state,
                || async {
                    let config = CouchConfig::from_env()?;
                    let store = CouchGameStore::connect(config).await?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
                },
            ));
            return;
        }
        #[cfg(not(feature = "couch-store"))]
        warn!("COUCH_BASE_URL is set but the couch-store feature is disabled");
    }

    if env::var("STORAGE_BACKEND").is_ok_and(|value| value.eq_ignore_ascii_case("memory")) {
        info!("using in-memory storage");
        state
            .install_game_store(Arc::new(MemoryGameStore::new()))
            .await;
        return;
    }

    warn!("no storage backend configured; running in degraded mode");
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
