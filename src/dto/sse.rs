use serde::Serialize;
use utoipa::ToSchema;

use crate::state::state_machine::SessionPhase;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// First event of every operator stream.
pub struct Handshake {
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// How an inbound event or timer was handled.
pub enum EventOutcome {
    Applied,
    Ignored,
    Rejected,
}

#[derive(Debug, Serialize, ToSchema)]
/// One processed session event, as seen by operators.
pub struct SessionEventPayload {
    /// Game code, when the event reached a session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Inbound event name or timer purpose.
    pub event: String,
    pub outcome: EventOutcome,
    /// Phase after the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SessionPhase>,
    /// Rejection message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
