use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{DateTime, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoGameDocument, MongoPlayerDocument, MongoResponseDocument, code_filter,
        game_code_filter, player_filter,
    },
};
use crate::dao::{
    game_store::GameStore,
    models::{AnswerResponseEntity, GameEntity, PlayerEntity},
    storage::StorageResult,
};

const GAME_COLLECTION_NAME: &str = "games";
const PLAYER_COLLECTION_NAME: &str = "players";
const RESPONSE_COLLECTION_NAME: &str = "responses";

/// [`GameStore`] backed by MongoDB.
#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        self.state.write().await.database = database;
        Ok(())
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let players = self.players().await;
        let unique_name = IndexModel::builder()
            .keys(doc! { "game_code": 1, "name_key": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("player_game_name_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        players
            .create_index(unique_name)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "game_code,name_key",
                source,
            })?;

        let responses = self.responses().await;
        let by_game = IndexModel::builder()
            .keys(doc! { "game_code": 1, "question_index": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("response_game_idx".to_owned()))
                    .build(),
            )
            .build();
        responses
            .create_index(by_game)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RESPONSE_COLLECTION_NAME,
                index: "game_code,question_index",
                source,
            })?;

        let games = self.games().await;
        let by_update = IndexModel::builder()
            .keys(doc! { "updated_at": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("game_updated_idx".to_owned()))
                    .build(),
            )
            .build();
        games
            .create_index(by_update)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: GAME_COLLECTION_NAME,
                index: "updated_at",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.state.read().await.database.clone()
    }

    async fn games(&self) -> Collection<MongoGameDocument> {
        self.database().await.collection(GAME_COLLECTION_NAME)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        self.database().await.collection(PLAYER_COLLECTION_NAME)
    }

    async fn responses(&self) -> Collection<MongoResponseDocument> {
        self.database().await.collection(RESPONSE_COLLECTION_NAME)
    }

    async fn save_game(&self, game: GameEntity) -> MongoResult<()> {
        let code = game.code.clone();
        let document: MongoGameDocument = game.into();
        self.games()
            .await
            .replace_one(code_filter(&code), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveGame { code, source })?;
        Ok(())
    }

    async fn find_game(&self, code: String) -> MongoResult<Option<GameEntity>> {
        let document = self
            .games()
            .await
            .find_one(code_filter(&code))
            .await
            .map_err(|source| MongoDaoError::LoadGame { code, source })?;
        Ok(document.map(Into::into))
    }

    async fn delete_game(&self, code: String) -> MongoResult<bool> {
        let result = self
            .games()
            .await
            .delete_one(code_filter(&code))
            .await
            .map_err(|source| MongoDaoError::DeleteGame {
                code: code.clone(),
                source,
            })?;
        self.players()
            .await
            .delete_many(game_code_filter(&code))
            .await
            .map_err(|source| MongoDaoError::DeleteGame { code, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn save_player(&self, player: PlayerEntity) -> MongoResult<()> {
        let code = player.game_code.clone();
        let name_key = player.name_key.clone();
        let document: MongoPlayerDocument = player.into();
        self.players()
            .await
            .replace_one(player_filter(&code, &name_key), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SavePlayer {
                code,
                name_key,
                source,
            })?;
        Ok(())
    }

    async fn list_players(&self, code: String) -> MongoResult<Vec<PlayerEntity>> {
        let documents: Vec<MongoPlayerDocument> = self
            .players()
            .await
            .find(game_code_filter(&code))
            .sort(doc! { "join_order": 1 })
            .await
            .map_err(|source| MongoDaoError::LoadPlayers {
                code: code.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadPlayers { code, source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn delete_player(&self, code: String, name_key: String) -> MongoResult<()> {
        self.players()
            .await
            .delete_one(player_filter(&code, &name_key))
            .await
            .map_err(|source| MongoDaoError::DeletePlayer {
                code,
                name_key,
                source,
            })?;
        Ok(())
    }

    async fn record_answer(&self, response: AnswerResponseEntity) -> MongoResult<()> {
        let code = response.game_code.clone();
        let document: MongoResponseDocument = response.into();
        self.responses()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::RecordAnswer { code, source })?;
        Ok(())
    }

    async fn list_answers(&self, code: String) -> MongoResult<Vec<AnswerResponseEntity>> {
        let documents: Vec<MongoResponseDocument> = self
            .responses()
            .await
            .find(game_code_filter(&code))
            .await
            .map_err(|source| MongoDaoError::LoadAnswers {
                code: code.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadAnswers { code, source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn delete_stale_games(&self, cutoff: SystemTime) -> MongoResult<u64> {
        let filter = doc! { "updated_at": { "$lt": DateTime::from_system_time(cutoff) } };
        let games = self.games().await;
        let stale: Vec<MongoGameDocument> = games
            .find(filter.clone())
            .await
            .map_err(|source| MongoDaoError::SweepGames { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::SweepGames { source })?;
        if stale.is_empty() {
            return Ok(0);
        }

        let codes: Vec<String> = stale
            .into_iter()
            .map(|document| GameEntity::from(document).code)
            .collect();
        self.players()
            .await
            .delete_many(doc! { "game_code": { "$in": codes.clone() } })
            .await
            .map_err(|source| MongoDaoError::SweepGames { source })?;
        let result = games
            .delete_many(doc! { "_id": { "$in": codes.clone() } })
            .await
            .map_err(|source| MongoDaoError::SweepGames { source })?;
        Ok(result.deleted_count)
    }
}

impl GameStore for MongoGameStore {
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_game(game).await.map_err(Into::into) })
    }

    fn find_game(&self, code: String) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game(code).await.map_err(Into::into) })
    }

    fn delete_game(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_game(code).await.map_err(Into::into) })
    }

    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_player(player).await.map_err(Into::into) })
    }

    fn list_players(&self, code: String) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_players(code).await.map_err(Into::into) })
    }

    fn delete_player(
        &self,
        code: String,
        name_key: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_player(code, name_key)
                .await
                .map_err(Into::into)
        })
    }

    fn record_answer(
        &self,
        response: AnswerResponseEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.record_answer(response).await.map_err(Into::into) })
    }

    fn list_answers(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerResponseEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_answers(code).await.map_err(Into::into) })
    }

    fn delete_stale_games(&self, cutoff: SystemTime) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.delete_stale_games(cutoff).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
