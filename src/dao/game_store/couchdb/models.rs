use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::models::{AnswerResponseEntity, GameEntity, PlayerEntity};

pub const GAME_PREFIX: &str = "game::";
pub const PLAYER_PREFIX: &str = "player::";
pub const RESPONSE_PREFIX: &str = "response::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Just the revision of a document, for updates and deletes.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> CouchDocument<T> {
    pub fn new(id: String, body: T) -> Self {
        Self {
            id,
            rev: None,
            body,
        }
    }
}

pub type CouchGameDocument = CouchDocument<GameEntity>;
pub type CouchPlayerDocument = CouchDocument<PlayerEntity>;
pub type CouchResponseDocument = CouchDocument<AnswerResponseEntity>;

pub fn game_doc_id(code: &str) -> String {
    format!("{GAME_PREFIX}{code}")
}

/// Prefix shared by every player document of `code`.
pub fn player_prefix(code: &str) -> String {
    format!("{PLAYER_PREFIX}{code}:")
}

/// Player document id. The name key is hex-encoded so any display name yields a valid id.
pub fn player_doc_id(code: &str, name_key: &str) -> String {
    let hex: String = name_key.bytes().map(|byte| format!("{byte:02x}")).collect();
    format!("{}{hex}", player_prefix(code))
}

pub fn response_prefix(code: &str) -> String {
    format!("{RESPONSE_PREFIX}{code}:")
}

pub fn response_doc_id(response: &AnswerResponseEntity) -> String {
    format!("{}{}", response_prefix(&response.game_code), response.id)
}
