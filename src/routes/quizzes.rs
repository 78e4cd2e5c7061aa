use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::quiz::QuizSummary, services::quiz_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/api/quizzes",
    tag = "quizzes",
    responses((status = 200, description = "Playable quizzes in catalog order", body = [QuizSummary]))
)]
/// List the quizzes a host can open a game for.
pub async fn list_quizzes(State(state): State<SharedState>) -> Json<Vec<QuizSummary>> {
    Json(quiz_service::list_quizzes(&state))
}

/// Configure the quiz catalog routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/api/quizzes", get(list_quizzes))
}
