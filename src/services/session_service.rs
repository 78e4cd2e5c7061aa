//! Routes inbound client events to their session and applies the resulting effects.
//!
//! Every mutation runs while holding the session lock, and its effects (frames, timers, store
//! writes, teardown) are applied before the lock is released, so clients observe transitions in
//! exactly the order they were accepted.

use std::sync::{Arc, Weak};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    dto::{
        validation::normalize_game_code,
        ws::{ClientMessage, ServerMessage},
    },
    error::ServiceError,
    services::observability,
    state::{
        SharedState,
        connections::{Membership, Role},
        effects::{Delivery, Effects, TimerCommand},
        identity::ConnectionId,
        registry::SessionHandle,
        session::{GameSession, SessionError},
        timers::TimerToken,
    },
};

/// How an event locates its session and what it means for the sending connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// `join_game`: may restore, binds the connection as a player.
    Join,
    /// `reconnect_player`: may restore, binds as a player, failures are reconnect failures.
    RecoverPlayer,
    /// `reconnect_host`: may restore, binds as the host, failures are reconnect failures.
    RecoverHost,
    /// Any other event on a live session.
    Live,
}

impl Access {
    fn restores(self) -> bool {
        !matches!(self, Self::Live)
    }

    fn binds(self) -> Option<Role> {
        match self {
            Self::Join | Self::RecoverPlayer => Some(Role::Player),
            Self::RecoverHost => Some(Role::Host),
            Self::Live => None,
        }
    }

    fn failure(self, err: &SessionError) -> ServerMessage {
        match self {
            Self::RecoverPlayer | Self::RecoverHost => {
                ServerMessage::reconnect_failed(err.to_string())
            }
            Self::Join | Self::Live => ServerMessage::error(err.to_string()),
        }
    }
}

/// Dispatch one parsed frame from `connection`.
pub async fn handle_client_message(
    state: &SharedState,
    connection: ConnectionId,
    message: ClientMessage,
) {
    let event = message.name();
    match message {
        ClientMessage::CreateGame(request) => create_game(state, connection, request.quiz_id).await,
        ClientMessage::JoinGame(request) => {
            with_session(state, connection, event, &request.code, Access::Join, |session, now| {
                session.join(connection, &request.name, now)
            })
            .await
        }
        ClientMessage::ReconnectPlayer(request) => {
            with_session(
                state,
                connection,
                event,
                &request.code,
                Access::RecoverPlayer,
                |session, now| session.reconnect_player(connection, &request.name, now),
            )
            .await
        }
        ClientMessage::ReconnectHost(request) => {
            with_session(
                state,
                connection,
                event,
                &request.code,
                Access::RecoverHost,
                |session, now| session.reconnect_host(connection, now),
            )
            .await
        }
        ClientMessage::StartGame(request) => {
            with_session(state, connection, event, &request.code, Access::Live, |session, now| {
                session.start(connection, now)
            })
            .await
        }
        ClientMessage::ConfigureTeams(request) => {
            with_session(state, connection, event, &request.code, Access::Live, |session, now| {
                session.configure_teams(
                    connection,
                    request.team_mode,
                    request.teams,
                    request.top_n_players,
                    now,
                )
            })
            .await
        }
        ClientMessage::ConfigureAutoRemove(request) => {
            with_session(state, connection, event, &request.code, Access::Live, |session, now| {
                session.configure_auto_remove(connection, request.enabled, request.threshold, now)
            })
            .await
        }
        ClientMessage::SelectTeam(request) => {
            with_session(state, connection, event, &request.code, Access::Live, |session, now| {
                session.select_team(connection, &request.team, now)
            })
            .await
        }
        ClientMessage::SubmitAnswer(request) => {
            with_session(state, connection, event, &request.code, Access::Live, |session, now| {
                session.submit_answer(connection, request.answer, now)
            })
            .await
        }
        ClientMessage::TimeUp(request) => {
            with_session(state, connection, event, &request.code, Access::Live, |session, now| {
                session.time_up(connection, now)
            })
            .await
        }
        ClientMessage::NextQuestionRequest(request) => {
            with_session(state, connection, event, &request.code, Access::Live, |session, now| {
                session.next_question(connection, now)
            })
            .await
        }
        ClientMessage::EndGameRequest(request) => {
            with_session(state, connection, event, &request.code, Access::Live, |session, now| {
                session.end_game(connection, now)
            })
            .await
        }
        ClientMessage::AutoplayStarted(request) => {
            with_session(state, connection, event, &request.code, Access::Live, |session, now| {
                session.autoplay_started(connection, request.seconds, now)
            })
            .await
        }
    }
}

/// Open a session for the catalog quiz at `quiz_id`, hosted by `connection`.
pub async fn create_game(state: &SharedState, connection: ConnectionId, quiz_id: usize) {
    let Some(quiz) = state.quizzes().get(quiz_id) else {
        let err = SessionError::UnknownQuiz;
        observability::rejected(state, None, "create_game", &err.to_string());
        state
            .connections()
            .send(connection, ServerMessage::error(err.to_string()));
        return;
    };

    let timing = state.config().session_timing();
    let (handle, fx) = state
        .sessions()
        .create(|code| GameSession::open(code, quiz, connection, timing, Instant::now()));
    info!(code = handle.code(), "session created");

    {
        let mut session = handle.session().lock().await;
        observability::applied(state, handle.code(), "create_game", session.phase());
        apply_effects(state, &handle, &mut session, fx);
    }
    bind_connection(state, connection, handle.code(), Role::Host).await;
}

/// Transport-level close of `connection`: leave whatever game it belonged to.
pub async fn handle_disconnect(state: &SharedState, connection: ConnectionId) {
    let Some(membership) = state.connections().unregister(connection) else {
        return;
    };
    leave(state, connection, membership).await;
}

/// Timer callback. A token the session no longer expects is ignored.
pub async fn on_timer(state: SharedState, handle: Weak<SessionHandle>, token: TimerToken) {
    let Some(handle) = handle.upgrade() else {
        return;
    };
    let _ = run_locked(&state, &handle, token.purpose().as_str(), |session, now| {
        session.on_timer(token, now)
    })
    .await;
}

/// Load `code` from storage and register it, unless it is already live.
///
/// Returns `Ok(None)` when no store is installed or the game is unknown to it.
pub async fn restore_session(
    state: &SharedState,
    code: &str,
) -> Result<Option<Arc<SessionHandle>>, ServiceError> {
    let Some(store) = state.game_store().await else {
        return Ok(None);
    };
    let Some(game) = store.find_game(code.to_string()).await? else {
        return Ok(None);
    };
    let players = store.list_players(code.to_string()).await?;
    let (session, fx) = GameSession::restore(
        game,
        players,
        state.config().session_timing(),
        Instant::now(),
    )?;

    let (handle, inserted) = state.sessions().insert_if_absent(session);
    if inserted {
        info!(code, "session restored from storage");
        let mut session = handle.session().lock().await;
        apply_effects(state, &handle, &mut session, fx);
    }
    Ok(Some(handle))
}

/// Apply `fx` on behalf of `handle`. Must be called while holding the session lock.
pub fn apply_effects(
    state: &SharedState,
    handle: &Arc<SessionHandle>,
    session: &mut GameSession,
    fx: Effects,
) {
    for Delivery { to, message } in fx.deliveries {
        if !state.connections().send(to, message) {
            debug!(code = handle.code(), connection = %to, "dropping frame for closed socket");
        }
    }

    for command in fx.timers {
        match command {
            TimerCommand::Arm { purpose, after } => {
                let target = Arc::downgrade(handle);
                let owner = Arc::clone(state);
                let token = handle.timers().arm(purpose, after, move |token| {
                    Box::pin(on_timer(owner, target, token))
                });
                session.timer_armed(token);
            }
            TimerCommand::Cancel(token) => {
                handle.timers().cancel(token);
            }
        }
    }

    for op in fx.persistence {
        state.persistence().enqueue(op);
    }

    if fx.teardown && state.sessions().remove(handle) {
        info!(code = handle.code(), "session removed");
    }
}

async fn with_session<F>(
    state: &SharedState,
    connection: ConnectionId,
    event: &'static str,
    code: &str,
    access: Access,
    op: F,
) where
    F: FnOnce(&mut GameSession, Instant) -> Result<Effects, SessionError>,
{
    let code = normalize_game_code(code);
    let handle = match resolve(state, &code, access.restores()).await {
        Ok(handle) => handle,
        Err(err) => {
            observability::rejected(state, Some(&code), event, &err.to_string());
            state.connections().send(connection, access.failure(&err));
            return;
        }
    };

    match run_locked(state, &handle, event, op).await {
        Ok(()) => {
            if let Some(role) = access.binds() {
                bind_connection(state, connection, handle.code(), role).await;
            }
        }
        Err(err) => {
            state.connections().send(connection, access.failure(&err));
        }
    }
}

async fn resolve(
    state: &SharedState,
    code: &str,
    restore: bool,
) -> Result<Arc<SessionHandle>, SessionError> {
    if let Some(handle) = state.sessions().get(code) {
        return Ok(handle);
    }
    if !restore {
        return Err(SessionError::UnknownGame);
    }
    match restore_session(state, code).await {
        Ok(Some(handle)) => Ok(handle),
        Ok(None) => Err(SessionError::UnknownGame),
        Err(ServiceError::Session(err)) => Err(err),
        Err(err) => {
            warn!(code, error = %err, "failed to restore session from storage");
            Err(SessionError::UnknownGame)
        }
    }
}

async fn run_locked<F>(
    state: &SharedState,
    handle: &Arc<SessionHandle>,
    event: &str,
    op: F,
) -> Result<(), SessionError>
where
    F: FnOnce(&mut GameSession, Instant) -> Result<Effects, SessionError>,
{
    let mut session = handle.session().lock().await;
    match op(&mut session, Instant::now()) {
        Ok(fx) if fx.is_empty() => {
            observability::ignored(state, handle.code(), event, session.phase());
            Ok(())
        }
        Ok(fx) => {
            observability::applied(state, handle.code(), event, session.phase());
            apply_effects(state, handle, &mut session, fx);
            Ok(())
        }
        Err(err) => {
            observability::rejected(state, Some(handle.code()), event, &err.to_string());
            Err(err)
        }
    }
}

/// Record that `connection` now belongs to `code`, leaving any other game it was part of.
async fn bind_connection(state: &SharedState, connection: ConnectionId, code: &str, role: Role) {
    let membership = Membership {
        code: code.to_string(),
        role,
    };
    let previous = state.connections().attach(connection, membership.clone());

    if !state.connections().is_open(connection) {
        // The socket closed while the event was processed.
        leave(state, connection, membership).await;
        return;
    }
    if let Some(previous) = previous.filter(|previous| previous.code != code) {
        leave(state, connection, previous).await;
    }
}

async fn leave(state: &SharedState, connection: ConnectionId, membership: Membership) {
    let Some(handle) = state.sessions().get(&membership.code) else {
        return;
    };
    debug!(code = %membership.code, role = ?membership.role, "connection left game");
    let _ = run_locked(state, &handle, "disconnect", |session, now| {
        session.disconnect(connection, now)
    })
    .await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::quiz_catalog::QuizCatalog,
        dto::ws::{CreateGameRequest, GameCodeRequest, PlayerNameRequest},
        state::{
            AppState,
            quiz::{Question, Quiz},
            state_machine::SessionPhase,
        },
    };

    fn state() -> SharedState {
        let question = Question::new(
            "Capital of France?".into(),
            vec!["Paris".into(), "Rome".into(), "Oslo".into(), "Bern".into()],
            0,
            Duration::from_secs(20),
        )
        .unwrap();
        let quiz = Quiz::new("Geography".into(), vec![question]).unwrap();
        AppState::new(AppConfig::default(), QuizCatalog::new(vec![quiz]))
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    async fn host_game(
        state: &SharedState,
    ) -> (ConnectionId, UnboundedReceiver<ServerMessage>, String) {
        let (host, mut rx) = state.connections().register();
        handle_client_message(
            state,
            host,
            ClientMessage::CreateGame(CreateGameRequest { quiz_id: 0 }),
        )
        .await;
        let code = match drain(&mut rx).as_slice() {
            [ServerMessage::GameCreated(payload)] => payload.code.clone(),
            other => panic!("unexpected frames {other:?}"),
        };
        (host, rx, code)
    }

    #[tokio::test]
    async fn unknown_quiz_is_rejected() {
        let state = state();
        let (host, mut rx) = state.connections().register();
        create_game(&state, host, 7).await;
        assert!(matches!(drain(&mut rx).as_slice(), [ServerMessage::Error(_)]));
        assert!(state.sessions().is_empty());
    }

    #[tokio::test]
    async fn join_binds_connection_to_game() {
        let state = state();
        let (_host, _host_rx, code) = host_game(&state).await;
        let (player, mut rx) = state.connections().register();

        handle_client_message(
            &state,
            player,
            ClientMessage::JoinGame(PlayerNameRequest {
                code: code.to_lowercase(),
                name: "Ada".into(),
            }),
        )
        .await;

        assert!(matches!(
            drain(&mut rx).first(),
            Some(ServerMessage::JoinedGame(_))
        ));
        assert_eq!(
            state.connections().membership(player),
            Some(Membership {
                code,
                role: Role::Player
            })
        );
    }

    #[tokio::test]
    async fn unknown_code_replies_error_or_reconnect_failed() {
        let state = state();
        let (conn, mut rx) = state.connections().register();

        handle_client_message(
            &state,
            conn,
            ClientMessage::StartGame(GameCodeRequest {
                code: "ZZZZZZ".into(),
            }),
        )
        .await;
        handle_client_message(
            &state,
            conn,
            ClientMessage::ReconnectHost(GameCodeRequest {
                code: "ZZZZZZ".into(),
            }),
        )
        .await;

        let frames = drain(&mut rx);
        assert!(matches!(
            frames.as_slice(),
            [ServerMessage::Error(_), ServerMessage::ReconnectFailed(_)]
        ));
        assert_eq!(state.connections().membership(conn), None);
    }

    #[tokio::test(start_paused = true)]
    async fn host_disconnect_without_return_tears_session_down() {
        let state = state();
        let (host, _host_rx, code) = host_game(&state).await;
        let (player, mut rx) = state.connections().register();
        handle_client_message(
            &state,
            player,
            ClientMessage::JoinGame(PlayerNameRequest {
                code: code.clone(),
                name: "Ada".into(),
            }),
        )
        .await;
        drain(&mut rx);

        handle_disconnect(&state, host).await;
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::HostDisconnected(_)]
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;
        let ended = drain(&mut rx)
            .into_iter()
            .filter(|frame| matches!(frame, ServerMessage::GameEnded(_)))
            .count();
        assert_eq!(ended, 1);
        assert!(state.sessions().get(&code).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_timer_opens_first_question() {
        let state = state();
        let (host, mut host_rx, code) = host_game(&state).await;
        let (player, _player_rx) = state.connections().register();
        handle_client_message(
            &state,
            player,
            ClientMessage::JoinGame(PlayerNameRequest {
                code: code.clone(),
                name: "Ada".into(),
            }),
        )
        .await;
        drain(&mut host_rx);

        handle_client_message(
            &state,
            host,
            ClientMessage::StartGame(GameCodeRequest { code: code.clone() }),
        )
        .await;
        assert!(matches!(
            drain(&mut host_rx).as_slice(),
            [ServerMessage::GameStarting(_)]
        ));

        tokio::time::sleep(Duration::from_secs(4)).await;
        let handle = state.sessions().get(&code).unwrap();
        assert_eq!(handle.session().lock().await.phase(), SessionPhase::Reading);
        assert!(matches!(
            drain(&mut host_rx).as_slice(),
            [ServerMessage::ShowQuestionReading(_)]
        ));
    }
}
