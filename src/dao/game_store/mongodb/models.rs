use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{AnswerResponseEntity, GameEntity, PlayerEntity, QuizEntity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    code: String,
    host_connection: Option<String>,
    quiz: QuizEntity,
    phase: String,
    current_question_index: i64,
    #[serde(default)]
    team_mode: bool,
    #[serde(default)]
    teams: Vec<String>,
    top_n_players: i64,
    #[serde(default)]
    auto_remove_enabled: bool,
    auto_remove_threshold: i64,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<GameEntity> for MongoGameDocument {
    fn from(value: GameEntity) -> Self {
        Self {
            code: value.code,
            host_connection: value.host_connection.map(|id| id.to_string()),
            quiz: value.quiz,
            phase: value.phase,
            current_question_index: value.current_question_index,
            team_mode: value.team_mode,
            teams: value.teams,
            top_n_players: to_i64(value.top_n_players),
            auto_remove_enabled: value.auto_remove_enabled,
            auto_remove_threshold: to_i64(value.auto_remove_threshold),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoGameDocument> for GameEntity {
    fn from(value: MongoGameDocument) -> Self {
        Self {
            code: value.code,
            host_connection: value
                .host_connection
                .and_then(|id| Uuid::parse_str(&id).ok()),
            quiz: value.quiz,
            phase: value.phase,
            current_question_index: value.current_question_index,
            team_mode: value.team_mode,
            teams: value.teams,
            top_n_players: to_usize(value.top_n_players),
            auto_remove_enabled: value.auto_remove_enabled,
            auto_remove_threshold: to_usize(value.auto_remove_threshold),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: String,
    game_code: String,
    name_key: String,
    name: String,
    connection_id: Option<String>,
    score: i64,
    streak: i64,
    team: Option<String>,
    connected: bool,
    #[serde(default)]
    answered_questions: Vec<i64>,
    join_order: i64,
    joined_at: DateTime,
    updated_at: DateTime,
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: player_doc_key(&value.game_code, &value.name_key),
            game_code: value.game_code,
            name_key: value.name_key,
            name: value.name,
            connection_id: value.connection_id.map(|id| id.to_string()),
            score: i64::from(value.score),
            streak: i64::from(value.streak),
            team: value.team,
            connected: value.connected,
            answered_questions: value.answered_questions.into_iter().map(to_i64).collect(),
            join_order: i64::try_from(value.join_order).unwrap_or(i64::MAX),
            joined_at: DateTime::from_system_time(value.joined_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoPlayerDocument> for PlayerEntity {
    fn from(value: MongoPlayerDocument) -> Self {
        Self {
            game_code: value.game_code,
            name_key: value.name_key,
            name: value.name,
            connection_id: value
                .connection_id
                .and_then(|id| Uuid::parse_str(&id).ok()),
            score: u32::try_from(value.score).unwrap_or_default(),
            streak: u32::try_from(value.streak).unwrap_or_default(),
            team: value.team,
            connected: value.connected,
            answered_questions: value.answered_questions.into_iter().map(to_usize).collect(),
            join_order: u64::try_from(value.join_order).unwrap_or_default(),
            joined_at: value.joined_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoResponseDocument {
    #[serde(rename = "_id")]
    id: String,
    game_code: String,
    player_name: String,
    question_index: i64,
    answer_index: i64,
    is_correct: bool,
    time_taken_ms: i64,
    points_awarded: i64,
    answered_at: DateTime,
}

impl From<AnswerResponseEntity> for MongoResponseDocument {
    fn from(value: AnswerResponseEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_code: value.game_code,
            player_name: value.player_name,
            question_index: to_i64(value.question_index),
            answer_index: to_i64(value.answer_index),
            is_correct: value.is_correct,
            time_taken_ms: i64::try_from(value.time_taken_ms).unwrap_or(i64::MAX),
            points_awarded: i64::from(value.points_awarded),
            answered_at: DateTime::from_system_time(value.answered_at),
        }
    }
}

impl From<MongoResponseDocument> for AnswerResponseEntity {
    fn from(value: MongoResponseDocument) -> Self {
        Self {
            id: Uuid::parse_str(&value.id).unwrap_or_else(|_| Uuid::new_v4()),
            game_code: value.game_code,
            player_name: value.player_name,
            question_index: to_usize(value.question_index),
            answer_index: to_usize(value.answer_index),
            is_correct: value.is_correct,
            time_taken_ms: u64::try_from(value.time_taken_ms).unwrap_or_default(),
            points_awarded: u32::try_from(value.points_awarded).unwrap_or_default(),
            answered_at: value.answered_at.to_system_time(),
        }
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or_default()
}

fn player_doc_key(code: &str, name_key: &str) -> String {
    format!("{code}:{name_key}")
}

pub fn code_filter(code: &str) -> Document {
    doc! { "_id": code }
}

pub fn player_filter(code: &str, name_key: &str) -> Document {
    doc! { "_id": player_doc_key(code, name_key) }
}

pub fn game_code_filter(code: &str) -> Document {
    doc! { "game_code": code }
}
