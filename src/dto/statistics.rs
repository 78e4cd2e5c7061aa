use serde::Serialize;
use utoipa::ToSchema;

use crate::{dao::models::AnswerResponseEntity, dto::format_system_time};

/// Answer statistics of one game, computed from recorded responses.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GameStatistics {
    pub code: String,
    pub total_responses: usize,
    pub correct_responses: usize,
    /// Share of correct responses, `0.0` when nothing was recorded.
    pub accuracy: f64,
    /// Mean answer time in milliseconds.
    pub average_time_ms: u64,
    /// RFC 3339 time of the latest response.
    pub last_response_at: Option<String>,
}

impl GameStatistics {
    /// Aggregate `responses` recorded for `code`.
    pub fn from_responses(code: String, responses: &[AnswerResponseEntity]) -> Self {
        let total_responses = responses.len();
        let correct_responses = responses.iter().filter(|r| r.is_correct).count();
        let (accuracy, average_time_ms) = if total_responses == 0 {
            (0.0, 0)
        } else {
            let total_ms: u64 = responses.iter().map(|r| r.time_taken_ms).sum();
            (
                correct_responses as f64 / total_responses as f64,
                total_ms / total_responses as u64,
            )
        };
        let last_response_at = responses
            .iter()
            .map(|r| r.answered_at)
            .max()
            .map(format_system_time);
        Self {
            code,
            total_responses,
            correct_responses,
            accuracy,
            average_time_ms,
            last_response_at,
        }
    }
}
