use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;

use crate::dao::{
    game_store::GameStore,
    models::{AnswerResponseEntity, GameEntity, PlayerEntity},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchDocument, CouchGameDocument, CouchPlayerDocument,
        CouchResponseDocument, END_SUFFIX, GAME_PREFIX, RevisionOnly, game_doc_id,
        player_doc_id, player_prefix, response_doc_id, response_prefix,
    },
};

/// [`GameStore`] backed by a CouchDB database over HTTP.
#[derive(Clone)]
pub struct CouchGameStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchGameStore {
    /// Build the HTTP client and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let auth = config
            .username
            .zip(config.password)
            .map(|(user, pass)| (Arc::<str>::from(user), Arc::<str>::from(pass)));
        let store = Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            database: Arc::from(config.database),
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                doc: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        doc: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                doc: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn current_revision(&self, doc_id: &str) -> CouchResult<Option<String>> {
        Ok(self
            .get_document::<RevisionOnly>(doc_id)
            .await?
            .map(|doc| doc.rev))
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                doc: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                doc: doc_id.to_string(),
                status: response.status(),
            })
        }
    }

    /// Insert or overwrite `body` under `doc_id`.
    async fn upsert<T: Serialize>(&self, doc_id: String, body: T) -> CouchResult<()> {
        let mut document = CouchDocument::new(doc_id, body);
        document.rev = self.current_revision(&document.id).await?;
        self.put_document(&document.id, &document).await
    }

    /// Delete `doc_id`; returns `false` when it did not exist.
    async fn delete_document(&self, doc_id: &str) -> CouchResult<bool> {
        let Some(rev) = self.current_revision(doc_id).await? else {
            return Ok(false);
        };
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                doc: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(CouchDaoError::RequestStatus {
                doc: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{prefix}\"")),
            ("endkey", format!("\"{prefix}{END_SUFFIX}\"")),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                doc: prefix.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                doc: prefix.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                doc: prefix.to_string(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::MalformedRecord {
                    doc: prefix.to_string(),
                    source,
                })
            })
            .collect()
    }

    async fn delete_players_of(&self, code: &str) -> CouchResult<()> {
        let players = self
            .list_documents::<CouchPlayerDocument>(&player_prefix(code))
            .await?;
        for player in players {
            self.delete_document(&player.id).await?;
        }
        Ok(())
    }

    async fn delete_game(&self, code: &str) -> CouchResult<bool> {
        let removed = self.delete_document(&game_doc_id(code)).await?;
        self.delete_players_of(code).await?;
        Ok(removed)
    }
}

impl GameStore for CouchGameStore {
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = game_doc_id(&game.code);
            store.upsert(doc_id, game).await.map_err(Into::into)
        })
    }

    fn find_game(&self, code: String) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .get_document::<CouchGameDocument>(&game_doc_id(&code))
                .await?;
            Ok(document.map(|doc| doc.body))
        })
    }

    fn delete_game(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_game(&code).await.map_err(Into::into) })
    }

    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = player_doc_id(&player.game_code, &player.name_key);
            store.upsert(doc_id, player).await.map_err(Into::into)
        })
    }

    fn list_players(&self, code: String) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut players: Vec<PlayerEntity> = store
                .list_documents::<CouchPlayerDocument>(&player_prefix(&code))
                .await?
                .into_iter()
                .map(|doc| doc.body)
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
            store
                .delete_document(&player_doc_id(&code, &name_key))
                .await?;
            Ok(())
        })
    }

    fn record_answer(
        &self,
        response: AnswerResponseEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document = CouchDocument::new(response_doc_id(&response), response);
            store
                .put_document(&document.id, &document)
                .await
                .map_err(Into::into)
        })
    }

    fn list_answers(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerResponseEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let documents = store
                .list_documents::<CouchResponseDocument>(&response_prefix(&code))
                .await?;
            Ok(documents.into_iter().map(|doc| doc.body).collect())
        })
    }

    fn delete_stale_games(&self, cutoff: SystemTime) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let games = store
                .list_documents::<CouchGameDocument>(GAME_PREFIX)
                .await?;
            let mut removed = 0;
            for game in games.into_iter().filter(|doc| doc.body.updated_at < cutoff) {
                if store.delete_game(&game.body.code).await? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::DatabaseQuery {
                    database: store.database.to_string(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::DatabaseStatus {
                    database: store.database.to_string(),
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
