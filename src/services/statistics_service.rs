use crate::{
    dto::{statistics::GameStatistics, validation::normalize_game_code},
    error::ServiceError,
    state::SharedState,
};

/// Answer statistics of the game `code`, from recorded responses.
///
/// A game counts as known while it is live or stored; responses outlive both.
pub async fn game_statistics(
    state: &SharedState,
    code: &str,
) -> Result<GameStatistics, ServiceError> {
    let code = normalize_game_code(code);
    let store = state.require_game_store().await?;
    let responses = store.list_answers(code.clone()).await?;

    let known = !responses.is_empty()
        || state.sessions().get(&code).is_some()
        || store.find_game(code.clone()).await?.is_some();
    if !known {
        return Err(ServiceError::NotFound(format!("game `{code}` not found")));
    }
    Ok(GameStatistics::from_responses(code, &responses))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            game_store::{GameStore, memory::MemoryGameStore},
            models::AnswerResponseEntity,
            quiz_catalog::QuizCatalog,
        },
        state::AppState,
    };

    #[tokio::test]
    async fn degraded_mode_is_reported() {
        let state = AppState::new(AppConfig::default(), QuizCatalog::default());
        assert!(matches!(
            game_statistics(&state, "ABC234").await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn unknown_game_is_not_found() {
        let state = AppState::new(AppConfig::default(), QuizCatalog::default());
        state
            .install_game_store(Arc::new(MemoryGameStore::new()))
            .await;
        assert!(matches!(
            game_statistics(&state, "ABC234").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn recorded_answers_are_aggregated() {
        let state = AppState::new(AppConfig::default(), QuizCatalog::default());
        let store = MemoryGameStore::new();
        store
            .record_answer(AnswerResponseEntity {
                id: Uuid::new_v4(),
                game_code: "ABC234".into(),
                player_name: "Ada".into(),
                question_index: 0,
                answer_index: 1,
                is_correct: true,
                time_taken_ms: 1_500,
                points_awarded: 925,
                answered_at: SystemTime::now(),
            })
            .await
            .unwrap();
        state.install_game_store(Arc::new(store)).await;

        let stats = game_statistics(&state, "abc234").await.unwrap();
        assert_eq!(stats.code, "ABC234");
        assert_eq!(stats.total_responses, 1);
        assert_eq!(stats.correct_responses, 1);
        assert_eq!(stats.average_time_ms, 1_500);
    }
}
