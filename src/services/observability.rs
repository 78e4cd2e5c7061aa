//! Records how every inbound event and timer was handled.

use tracing::{debug, info};

use crate::{
    dto::sse::{EventOutcome, SessionEventPayload},
    state::{AppState, state_machine::SessionPhase},
};

/// SSE event name of [`SessionEventPayload`].
pub const SESSION_EVENT: &str = "session.event";

/// Event reached a session and changed something.
pub fn applied(state: &AppState, code: &str, event: &str, phase: SessionPhase) {
    record(
        state,
        SessionEventPayload {
            code: Some(code.to_string()),
            event: event.to_string(),
            outcome: EventOutcome::Applied,
            phase: Some(phase),
            detail: None,
        },
    );
}

/// Event was a no-op: stale timer, duplicate answer and the like.
pub fn ignored(state: &AppState, code: &str, event: &str, phase: SessionPhase) {
    record(
        state,
        SessionEventPayload {
            code: Some(code.to_string()),
            event: event.to_string(),
            outcome: EventOutcome::Ignored,
            phase: Some(phase),
            detail: None,
        },
    );
}

/// Event was refused with `reason`.
pub fn rejected(state: &AppState, code: Option<&str>, event: &str, reason: &str) {
    record(
        state,
        SessionEventPayload {
            code: code.map(str::to_string),
            event: event.to_string(),
            outcome: EventOutcome::Rejected,
            phase: None,
            detail: Some(reason.to_string()),
        },
    );
}

fn record(state: &AppState, payload: SessionEventPayload) {
    let code = payload.code.as_deref().unwrap_or("-");
    match payload.outcome {
        EventOutcome::Rejected => info!(
            code,
            event = %payload.event,
            reason = payload.detail.as_deref().unwrap_or_default(),
            "session event rejected"
        ),
        EventOutcome::Applied | EventOutcome::Ignored => debug!(
            code,
            event = %payload.event,
            outcome = ?payload.outcome,
            phase = payload.phase.map(|phase| phase.as_str()),
            "session event processed"
        ),
    }
    state.events().publish(SESSION_EVENT, &payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dao::quiz_catalog::QuizCatalog};

    #[tokio::test]
    async fn outcomes_are_published_to_operators() {
        let state = AppState::new(AppConfig::default(), QuizCatalog::default());
        let mut events = state.events().subscribe();

        applied(&state, "ABC234", "start_game", SessionPhase::Starting);
        rejected(&state, None, "join_game", "Game not found");

        let first = events.recv().await.unwrap();
        assert_eq!(first.event.as_deref(), Some(SESSION_EVENT));
        assert_eq!(
            first.data,
            r#"{"code":"ABC234","event":"start_game","outcome":"applied","phase":"starting"}"#
        );
        let second = events.recv().await.unwrap();
        assert_eq!(
            second.data,
            r#"{"event":"join_game","outcome":"rejected","detail":"Game not found"}"#
        );
    }
}
