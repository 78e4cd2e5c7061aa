use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    dto::{statistics::GameStatistics, validation::validate_game_code},
    error::AppError,
    services::statistics_service,
    state::SharedState,
};

#[derive(Debug, Deserialize, Validate)]
struct GamePath {
    #[validate(custom(function = "validate_game_code"))]
    code: String,
}

#[utoipa::path(
    get,
    path = "/api/games/{code}/statistics",
    tag = "games",
    params(("code" = String, Path, description = "Game code")),
    responses(
        (status = 200, description = "Answer statistics", body = GameStatistics),
        (status = 400, description = "Malformed game code"),
        (status = 404, description = "Unknown game"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Aggregate the answers recorded for a game.
pub async fn game_statistics(
    State(state): State<SharedState>,
    Path(path): Path<GamePath>,
) -> Result<Json<GameStatistics>, AppError> {
    path.validate()?;
    let stats = statistics_service::game_statistics(&state, &path.code).await?;
    Ok(Json(stats))
}

/// Configure the game statistics routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/api/games/{code}/statistics", get(game_statistics))
}
