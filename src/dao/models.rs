use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::state::quiz::{Question, Quiz, QuizError};

/// Stored session record, keyed by game code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameEntity {
    /// Six-character game code.
    pub code: String,
    /// Last known host connection, if the host is connected.
    pub host_connection: Option<Uuid>,
    /// Copy of the quiz so the session can be rebuilt without the catalog.
    pub quiz: QuizEntity,
    /// Phase name (`lobby`, `starting`, ...).
    pub phase: String,
    /// Zero-based question index, `-1` before the first question.
    pub current_question_index: i64,
    /// Whether team mode is on.
    pub team_mode: bool,
    /// Configured team names.
    pub teams: Vec<String>,
    /// Team score aggregation depth.
    pub top_n_players: usize,
    /// Whether inactive players are pruned.
    pub auto_remove_enabled: bool,
    /// Pruning window.
    pub auto_remove_threshold: usize,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last mutation time.
    pub updated_at: SystemTime,
}

/// Stored quiz content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizEntity {
    pub title: String,
    pub questions: Vec<QuestionEntity>,
}

/// Stored question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionEntity {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub time_limit_secs: u64,
}

impl From<&Quiz> for QuizEntity {
    fn from(quiz: &Quiz) -> Self {
        Self {
            title: quiz.title.clone(),
            questions: quiz
                .questions
                .iter()
                .map(|question| QuestionEntity {
                    prompt: question.prompt.clone(),
                    options: question.options.to_vec(),
                    correct_index: question.correct_index,
                    time_limit_secs: question.time_limit.as_secs(),
                })
                .collect(),
        }
    }
}

impl TryFrom<QuizEntity> for Quiz {
    type Error = QuizError;

    fn try_from(entity: QuizEntity) -> Result<Self, Self::Error> {
        let questions = entity
            .questions
            .into_iter()
            .map(|question| {
                Question::new(
                    question.prompt,
                    question.options,
                    question.correct_index,
                    Duration::from_secs(question.time_limit_secs),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Quiz::new(entity.title, questions)
    }
}

/// Stored player record, keyed by `(game_code, name_key)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Owning game.
    pub game_code: String,
    /// Case-folded name used as identity.
    pub name_key: String,
    /// Display name.
    pub name: String,
    /// Current connection handle, replaced on every reconnect.
    pub connection_id: Option<Uuid>,
    pub score: u32,
    pub streak: u32,
    pub team: Option<String>,
    pub connected: bool,
    /// Question indices the player answered.
    pub answered_questions: Vec<usize>,
    /// Join order within the game.
    pub join_order: u64,
    pub joined_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Analytics record appended for every scored answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerResponseEntity {
    pub id: Uuid,
    pub game_code: String,
    pub player_name: String,
    pub question_index: usize,
    pub answer_index: usize,
    pub is_correct: bool,
    pub time_taken_ms: u64,
    pub points_awarded: u32,
    pub answered_at: SystemTime,
}
