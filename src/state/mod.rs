pub mod connections;
pub mod effects;
pub mod identity;
pub mod inactivity;
pub mod leaderboard;
pub mod quiz;
pub mod registry;
pub mod scoring;
pub mod session;
mod sse;
pub mod state_machine;
pub mod timers;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::info;

use crate::{
    config::AppConfig,
    dao::{game_store::GameStore, quiz_catalog::QuizCatalog},
    dto::sse::SystemStatus,
    error::ServiceError,
    services::persistence::PersistenceQueue,
};

pub use self::sse::SseHub;
use self::{connections::ConnectionHub, registry::SessionRegistry};

pub type SharedState = Arc<AppState>;

const EVENTS_CAPACITY: usize = 64;

/// Central application state: live sessions, open sockets and the storage handle.
pub struct AppState {
    config: Arc<AppConfig>,
    quizzes: QuizCatalog,
    sessions: SessionRegistry,
    connections: ConnectionHub,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    degraded: watch::Sender<bool>,
    persistence: PersistenceQueue,
    events: SseHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, quizzes: QuizCatalog) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            quizzes,
            sessions: SessionRegistry::new(),
            connections: ConnectionHub::new(),
            game_store: RwLock::new(None),
            degraded: degraded_tx,
            persistence: PersistenceQueue::new(),
            events: SseHub::new(EVENTS_CAPACITY),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// Playable quizzes.
    pub fn quizzes(&self) -> &QuizCatalog {
        &self.quizzes
    }

    /// Live sessions keyed by game code.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Open host and player sockets.
    pub fn connections(&self) -> &ConnectionHub {
        &self.connections
    }

    /// Ordered queue of best-effort store writes.
    pub fn persistence(&self) -> &PersistenceQueue {
        &self.persistence
    }

    /// Broadcast hub behind the `/sse/events` stream.
    pub fn events(&self) -> &SseHub {
        &self.events
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current game store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn install_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag and tell operators when the value changes.
    pub fn update_degraded(&self, value: bool) {
        let changed = self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
        if changed {
            info!(degraded = value, "degraded mode changed");
            self.events
                .publish("system.status", &SystemStatus { degraded: value });
        }
    }
}
