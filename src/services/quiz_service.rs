use crate::{dto::quiz::QuizSummary, state::SharedState};

/// Quizzes a host can pick from, in catalog order.
pub fn list_quizzes(state: &SharedState) -> Vec<QuizSummary> {
    state
        .quizzes()
        .iter()
        .map(|(id, quiz)| QuizSummary::new(id, quiz))
        .collect()
}
