use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Live Quiz Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::quizzes::list_quizzes,
        crate::routes::statistics::game_statistics,
        crate::routes::sse::event_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::quiz::QuizSummary,
            crate::dto::statistics::GameStatistics,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::EventOutcome,
            crate::dto::sse::SessionEventPayload,
            crate::dto::ws::CreateGameRequest,
            crate::dto::ws::GameCodeRequest,
            crate::dto::ws::PlayerNameRequest,
            crate::dto::ws::ConfigureTeamsRequest,
            crate::dto::ws::ConfigureAutoRemoveRequest,
            crate::dto::ws::SelectTeamRequest,
            crate::dto::ws::SubmitAnswerRequest,
            crate::dto::ws::AutoplayRequest,
            crate::state::state_machine::SessionPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "quizzes", description = "Quiz catalog"),
        (name = "games", description = "Recorded game statistics"),
        (name = "sse", description = "Operator event stream"),
        (name = "sessions", description = "WebSocket protocol for hosts and players"),
    )
)]
pub struct ApiDoc;
