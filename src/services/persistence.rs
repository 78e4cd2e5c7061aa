//! Ordered, fire-and-forget store writes requested by sessions.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dao::{game_store::GameStore, storage::StorageResult},
    state::{SharedState, effects::PersistOp},
};

/// Single queue feeding the persistence worker, so writes land in the order sessions made them.
pub struct PersistenceQueue {
    tx: mpsc::UnboundedSender<PersistOp>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<PersistOp>>>,
}

impl PersistenceQueue {
    /// Fresh queue; the receiving end waits for [`run_worker`].
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Queue a write. Never blocks the caller.
    pub fn enqueue(&self, op: PersistOp) {
        if self.tx.send(op).is_err() {
            warn!("persistence worker stopped; dropping write");
        }
    }

    /// Hand the receiving end to the worker. Only the first caller gets it.
    fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<PersistOp>> {
        self.rx.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl Default for PersistenceQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain the persistence queue until the application shuts down.
///
/// Writes are skipped while degraded; failures are logged and never retried.
pub async fn run_worker(state: SharedState) {
    let Some(mut rx) = state.persistence().take_receiver() else {
        warn!("persistence worker already running");
        return;
    };

    while let Some(op) = rx.recv().await {
        let Some(store) = state.game_store().await else {
            debug!(op = op.name(), "skipping write in degraded mode");
            continue;
        };
        let name = op.name();
        if let Err(err) = write(store.as_ref(), op).await {
            warn!(op = name, error = %err, "persistence write failed");
        }
    }
}

/// Apply one write against `store`.
pub async fn write(store: &dyn GameStore, op: PersistOp) -> StorageResult<()> {
    match op {
        PersistOp::SaveGame(game) => store.save_game(game).await,
        PersistOp::SavePlayer(player) => store.save_player(player).await,
        PersistOp::RemovePlayer { code, name_key } => store.delete_player(code, name_key).await,
        PersistOp::RecordAnswer(response) => store.record_answer(response).await,
        PersistOp::DeleteGame { code } => store.delete_game(code).await.map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            game_store::memory::MemoryGameStore, models::PlayerEntity, quiz_catalog::QuizCatalog,
        },
        state::AppState,
    };

    fn player(code: &str, name: &str) -> PlayerEntity {
        PlayerEntity {
            game_code: code.into(),
            name_key: name.to_lowercase(),
            name: name.into(),
            connection_id: None,
            score: 0,
            streak: 0,
            team: None,
            connected: true,
            answered_questions: Vec::new(),
            join_order: 0,
            joined_at: SystemTime::now(),
            updated_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn writes_apply_in_queue_order() {
        let store = MemoryGameStore::new();
        write(&store, PersistOp::SavePlayer(player("ABC234", "Ada")))
            .await
            .unwrap();
        write(
            &store,
            PersistOp::RemovePlayer {
                code: "ABC234".into(),
                name_key: "ada".into(),
            },
        )
        .await
        .unwrap();
        assert!(store.list_players("ABC234".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn worker_drains_queue_into_installed_store() {
        let state = AppState::new(AppConfig::default(), QuizCatalog::default());
        let store = MemoryGameStore::new();
        state.install_game_store(Arc::new(store.clone())).await;
        tokio::spawn(run_worker(state.clone()));

        state
            .persistence()
            .enqueue(PersistOp::SavePlayer(player("ABC234", "Ada")));
        for _ in 0..50 {
            if !store.list_players("ABC234".into()).await.unwrap().is_empty() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("player was never written");
    }

    #[test]
    fn receiver_is_handed_out_once() {
        let queue = PersistenceQueue::new();
        assert!(queue.take_receiver().is_some());
        assert!(queue.take_receiver().is_none());
    }
}
