use serde::Serialize;
use utoipa::ToSchema;

use crate::state::quiz::Quiz;

/// Catalog entry offered to hosts before `create_game`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizSummary {
    /// Value to pass as `quiz_id`.
    pub id: usize,
    pub title: String,
    pub question_count: usize,
}

impl QuizSummary {
    /// Summary of the quiz at catalog position `id`.
    pub fn new(id: usize, quiz: &Quiz) -> Self {
        Self {
            id,
            title: quiz.title.clone(),
            question_count: quiz.len(),
        }
    }
}
