use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Sessions currently registered.
    pub active_sessions: usize,
}

impl HealthResponse {
    /// Healthy backend with `active_sessions` live games.
    pub fn ok(active_sessions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_sessions,
        }
    }

    /// Backend running without storage.
    pub fn degraded(active_sessions: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            active_sessions,
        }
    }
}
