//! In-process store, used with `STORAGE_BACKEND=memory` and in tests.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    game_store::GameStore,
    models::{AnswerResponseEntity, GameEntity, PlayerEntity},
    storage::StorageResult,
};

/// [`GameStore`] backed by concurrent maps. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryGameStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    games: DashMap<String, GameEntity>,
    players: DashMap<(String, String), PlayerEntity>,
    answers: DashMap<String, Vec<AnswerResponseEntity>>,
}

impl MemoryGameStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn drop_players(&self, code: &str) {
        self.inner.players.retain(|(game, _), _| game != code);
    }
}

impl GameStore for MemoryGameStore {
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.games.insert(game.code.clone(), game);
            Ok(())
        })
    }

    fn find_game(&self, code: String) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .games
                .get(&code)
                .map(|entry| entry.value().clone()))
        })
    }

    fn delete_game(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let removed = store.inner.games.remove(&code).is_some();
            store.drop_players(&code);
            Ok(removed)
        })
    }

    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let key = (player.game_code.clone(), player.name_key.clone());
            store.inner.players.insert(key, player);
            Ok(())
        })
    }

    fn list_players(&self, code: String) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut players: Vec<PlayerEntity> = store
                .inner
                .players
                .iter()
                .filter(|entry| entry.key().0 == code)
                .map(|entry| entry.value().clone())
                .collect();
            players.sort_by_key(|player| player.join_order);
            Ok(players)
        })
    }

    fn delete_player(
        &self,
        code: String,
        name_key: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.players.remove(&(code, name_key));
            Ok(())
        })
    }

    fn record_answer(
        &self,
        response: AnswerResponseEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .answers
                .entry(response.game_code.clone())
                .or_default()
                .push(response);
            Ok(())
        })
    }

    fn list_answers(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerResponseEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .answers
                .get(&code)
                .map(|entry| entry.value().clone())
                .unwrap_or_default())
        })
    }

    fn delete_stale_games(&self, cutoff: SystemTime) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let stale: Vec<String> = store
                .inner
                .games
                .iter()
                .filter(|entry| entry.value().updated_at < cutoff)
                .map(|entry| entry.key().clone())
                .collect();
            for code in &stale {
                store.inner.games.remove(code);
                store.drop_players(code);
            }
            Ok(stale.len() as u64)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::dao::models::QuizEntity;

    fn game(code: &str, updated_at: SystemTime) -> GameEntity {
        GameEntity {
            code: code.into(),
            host_connection: None,
            quiz: QuizEntity {
                title: "Quiz".into(),
                questions: Vec::new(),
            },
            phase: "lobby".into(),
            current_question_index: -1,
            team_mode: false,
            teams: Vec::new(),
            top_n_players: 3,
            auto_remove_enabled: false,
            auto_remove_threshold: 3,
            created_at: updated_at,
            updated_at,
        }
    }

    fn player(code: &str, name: &str, join_order: u64) -> PlayerEntity {
        PlayerEntity {
            game_code: code.into(),
            name_key: name.to_lowercase(),
            name: name.into(),
            connection_id: Some(Uuid::new_v4()),
            score: 0,
            streak: 0,
            team: None,
            connected: true,
            answered_questions: Vec::new(),
            join_order,
            joined_at: SystemTime::now(),
            updated_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn players_are_listed_in_join_order() {
        let store = MemoryGameStore::new();
        store.save_player(player("ABC234", "Zed", 1)).await.unwrap();
        store.save_player(player("ABC234", "Amy", 0)).await.unwrap();
        store.save_player(player("XYZ789", "Bob", 0)).await.unwrap();

        let names: Vec<String> = store
            .list_players("ABC234".into())
            .await
            .unwrap()
            .into_iter()
            .map(|player| player.name)
            .collect();
        assert_eq!(names, vec!["Amy".to_string(), "Zed".to_string()]);
    }

    #[tokio::test]
    async fn delete_game_drops_players_but_keeps_answers() {
        let store = MemoryGameStore::new();
        store.save_game(game("ABC234", SystemTime::now())).await.unwrap();
        store.save_player(player("ABC234", "Amy", 0)).await.unwrap();
        store
            .record_answer(AnswerResponseEntity {
                id: Uuid::new_v4(),
                game_code: "ABC234".into(),
                player_name: "Amy".into(),
                question_index: 0,
                answer_index: 1,
                is_correct: true,
                time_taken_ms: 1200,
                points_awarded: 970,
                answered_at: SystemTime::now(),
            })
            .await
            .unwrap();

        assert!(store.delete_game("ABC234".into()).await.unwrap());
        assert!(store.find_game("ABC234".into()).await.unwrap().is_none());
        assert!(store.list_players("ABC234".into()).await.unwrap().is_empty());
        assert_eq!(store.list_answers("ABC234".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_games_are_swept() {
        let store = MemoryGameStore::new();
        let now = SystemTime::now();
        store
            .save_game(game("OLD234", now - Duration::from_secs(7200)))
            .await
            .unwrap();
        store.save_game(game("NEW234", now)).await.unwrap();
        store.save_player(player("OLD234", "Amy", 0)).await.unwrap();

        let removed = store
            .delete_stale_games(now - Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_game("NEW234".into()).await.unwrap().is_some());
        assert!(store.list_players("OLD234".into()).await.unwrap().is_empty());
    }
}
