#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use crate::dao::models::{AnswerResponseEntity, GameEntity, PlayerEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the persistence layer for sessions, players and answer analytics.
///
/// Futures are `'static` so callers can hold them across awaits without borrowing the store.
pub trait GameStore: Send + Sync {
    /// Upsert the game record keyed by its code.
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_game(&self, code: String) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    /// Remove the game and its players. Recorded answers are kept.
    fn delete_game(&self, code: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Upsert one player keyed by `(game_code, name_key)`.
    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn list_players(&self, code: String) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    fn delete_player(
        &self,
        code: String,
        name_key: String,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Append one answer record.
    fn record_answer(
        &self,
        response: AnswerResponseEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn list_answers(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerResponseEntity>>>;
    /// Remove games (and their players) last updated before `cutoff`, returning how many went.
    fn delete_stale_games(&self, cutoff: SystemTime) -> BoxFuture<'static, StorageResult<u64>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
