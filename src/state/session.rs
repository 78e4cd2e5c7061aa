//! The per-session state machine.
//!
//! A [`GameSession`] owns the roster, answer ledger and settings of one game. It never performs
//! I/O: every operation takes the acting connection and the current instant, mutates the session
//! and returns the [`Effects`] to apply. A rejected operation leaves the session untouched.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use thiserror::Error;
use tokio::time::Instant;

use crate::{
    dao::models::{AnswerResponseEntity, GameEntity, PlayerEntity, QuizEntity},
    dto::ws::{
        AnswerProgressPayload, AnswerReceivedPayload, AutoRemovePayload,
        AutoplayCountdownPayload, GameCreatedPayload, GameEndedPayload, GameStartingPayload,
        HostDisconnectedPayload, HostSnapshotPayload, InactivePlayersPayload, JoinedGamePayload,
        PlayerResultPayload, PlayerSummary, PlayersPayload, QuestionAnswersPayload,
        QuestionReadingPayload, QuestionResultsPayload, ReconnectedPlayerPayload, ResultRow,
        RosterChangePayload, ServerMessage, TeamConfigPayload,
    },
    state::{
        effects::{Effects, PersistOp},
        identity::{ConnectionId, IdentityMap, PlayerId},
        inactivity::{InactivityConfig, inactive_players},
        leaderboard::{LeaderboardEntry, TeamConfig, rank, team_standings},
        quiz::{OPTION_COUNT, Question, Quiz, ReadingPace},
        scoring::score_answer,
        state_machine::{InvalidTransition, SessionPhase, Trigger, next_phase},
        timers::{TimerPurpose, TimerToken},
    },
};

const HOST_LEFT_REASON: &str = "The host left the game";
const HOST_ENDED_REASON: &str = "The host ended the game";
const EXPIRED_REASON: &str = "The game expired";
const INACTIVE_REASON: &str = "You were removed for inactivity";

/// Validation rejections. The message is what the client sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Game not found")]
    UnknownGame,
    #[error("Quiz not found")]
    UnknownQuiz,
    #[error("Only the host can do that")]
    NotHost,
    #[error("You are not part of this game")]
    NotInGame,
    #[error("Please enter a name")]
    EmptyName,
    #[error("Name already taken")]
    NameTaken,
    #[error("This connection is already part of the game")]
    AlreadyInGame,
    #[error("Game has already started")]
    AlreadyStarted,
    #[error("At least one player is required")]
    NoPlayers,
    #[error("Not allowed while the game is in {0}")]
    WrongPhase(SessionPhase),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("Team mode is disabled")]
    TeamModeDisabled,
    #[error("Unknown team `{0}`")]
    UnknownTeam(String),
    #[error("Invalid answer option {0}")]
    InvalidOption(usize),
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
    #[error("Player `{0}` not found")]
    UnknownPlayer(String),
    #[error("Game has ended")]
    GameEnded,
    #[error("Stored game is unusable: {0}")]
    CorruptRecord(String),
}

/// A player as known to the session, connected or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub display_name: String,
    pub score: u32,
    pub streak: u32,
    pub team: Option<String>,
    pub connected: bool,
    pub join_order: u64,
    pub joined_at: SystemTime,
}

/// One answer to the open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerRecord {
    pub option: usize,
    pub elapsed: Duration,
}

/// Durations that shape a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTiming {
    /// Countdown between start and the first question.
    pub countdown: Duration,
    /// Reading-phase pacing.
    pub reading: ReadingPace,
    /// Time a disconnected host has to come back.
    pub host_grace: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(3),
            reading: ReadingPace::default(),
            host_grace: Duration::from_secs(60),
        }
    }
}

/// Idle limits applied by the stale-session sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Ended sessions are dropped after this much inactivity.
    pub ended_after: Duration,
    /// Live sessions are ended after this much inactivity.
    pub idle_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HostBinding {
    connection: Option<ConnectionId>,
    disconnected: bool,
}

/// State of one quiz game.
#[derive(Debug)]
pub struct GameSession {
    code: String,
    quiz: Arc<Quiz>,
    phase: SessionPhase,
    current_question: Option<usize>,
    roster: IndexMap<PlayerId, PlayerRecord>,
    identities: IdentityMap,
    answers: HashMap<PlayerId, AnswerRecord>,
    answer_history: HashMap<PlayerId, BTreeSet<usize>>,
    teams: TeamConfig,
    inactivity: InactivityConfig,
    host: HostBinding,
    question_started_at: Option<Instant>,
    reading_deadline: Option<Instant>,
    last_results: Option<QuestionResultsPayload>,
    pending_timers: HashMap<TimerPurpose, TimerToken>,
    timing: SessionTiming,
    next_join_order: u64,
    created_at: SystemTime,
    updated_at: SystemTime,
    last_activity: Instant,
}

impl GameSession {
    /// Open a new session in the lobby, hosted by `host`.
    pub fn open(
        code: String,
        quiz: Arc<Quiz>,
        host: ConnectionId,
        timing: SessionTiming,
        now: Instant,
    ) -> (Self, Effects) {
        let created_at = SystemTime::now();
        let session = Self {
            code,
            quiz,
            phase: SessionPhase::Lobby,
            current_question: None,
            roster: IndexMap::new(),
            identities: IdentityMap::default(),
            answers: HashMap::new(),
            answer_history: HashMap::new(),
            teams: TeamConfig::default(),
            inactivity: InactivityConfig::default(),
            host: HostBinding {
                connection: Some(host),
                disconnected: false,
            },
            question_started_at: None,
            reading_deadline: None,
            last_results: None,
            pending_timers: HashMap::new(),
            timing,
            next_join_order: 0,
            created_at,
            updated_at: created_at,
            last_activity: now,
        };

        let mut fx = Effects::none();
        fx.send(
            host,
            ServerMessage::GameCreated(GameCreatedPayload {
                code: session.code.clone(),
                quiz_title: session.quiz.title.clone(),
                question_count: session.quiz.len(),
            }),
        );
        fx.persist(PersistOp::SaveGame(session.game_entity()));
        (session, fx)
    }

    /// Rebuild a session from its stored records after a restart.
    ///
    /// Phases that depend on a running timer fall back to `results`. Everybody starts
    /// disconnected and the host grace timer is armed straight away.
    pub fn restore(
        game: GameEntity,
        mut players: Vec<PlayerEntity>,
        timing: SessionTiming,
        now: Instant,
    ) -> Result<(Self, Effects), SessionError> {
        let phase = game
            .phase
            .parse::<SessionPhase>()
            .map_err(|err| SessionError::CorruptRecord(err.to_string()))?;
        let phase = match phase {
            SessionPhase::Ended => return Err(SessionError::GameEnded),
            SessionPhase::Starting | SessionPhase::Reading | SessionPhase::Question => {
                SessionPhase::Results
            }
            other => other,
        };
        let quiz = Quiz::try_from(game.quiz)
            .map_err(|err| SessionError::CorruptRecord(err.to_string()))?;
        let current_question = usize::try_from(game.current_question_index)
            .ok()
            .filter(|index| *index < quiz.len());

        players.sort_by_key(|player| player.join_order);
        let mut roster = IndexMap::new();
        let mut answer_history = HashMap::new();
        let mut next_join_order = 0;
        for player in players {
            let id = PlayerId::from_name(&player.name);
            next_join_order = next_join_order.max(player.join_order + 1);
            answer_history.insert(
                id.clone(),
                player.answered_questions.iter().copied().collect::<BTreeSet<_>>(),
            );
            roster.insert(
                id,
                PlayerRecord {
                    display_name: player.name,
                    score: player.score,
                    streak: player.streak,
                    team: player.team,
                    connected: false,
                    join_order: player.join_order,
                    joined_at: player.joined_at,
                },
            );
        }

        let mut session = Self {
            code: game.code,
            quiz: Arc::new(quiz),
            phase,
            current_question,
            roster,
            identities: IdentityMap::default(),
            answers: HashMap::new(),
            answer_history,
            teams: TeamConfig {
                enabled: game.team_mode,
                teams: game.teams,
                top_n: game.top_n_players.max(1),
            },
            inactivity: InactivityConfig {
                enabled: game.auto_remove_enabled,
                window: game.auto_remove_threshold,
            },
            host: HostBinding {
                connection: None,
                disconnected: true,
            },
            question_started_at: None,
            reading_deadline: None,
            last_results: None,
            pending_timers: HashMap::new(),
            timing,
            next_join_order,
            created_at: game.created_at,
            updated_at: game.updated_at,
            last_activity: now,
        };
        session.touch(now);

        let mut fx = Effects::none();
        fx.arm(TimerPurpose::HostGrace, session.timing.host_grace);
        fx.persist(PersistOp::SaveGame(session.game_entity()));
        Ok((session, fx))
    }

    /// Game code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Index of the question being played, if any.
    pub fn current_question(&self) -> Option<usize> {
        self.current_question
    }

    /// Player looked up by display name, case-insensitively.
    pub fn player(&self, name: &str) -> Option<&PlayerRecord> {
        self.roster.get(&PlayerId::from_name(name))
    }

    /// Number of known players.
    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    /// Answer recorded for `name` on the current question.
    pub fn answer_of(&self, name: &str) -> Option<&AnswerRecord> {
        self.answers.get(&PlayerId::from_name(name))
    }

    /// Whether the host socket is gone.
    pub fn is_host_disconnected(&self) -> bool {
        self.host.disconnected
    }

    /// Token of the timer the session is waiting on for `purpose`.
    pub fn pending_timer(&self, purpose: TimerPurpose) -> Option<TimerToken> {
        self.pending_timers.get(&purpose).copied()
    }

    /// Overall leaderboard, ties in join order.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        rank(
            self.roster
                .values()
                .map(|record| LeaderboardEntry {
                    name: record.display_name.clone(),
                    score: record.score,
                    team: record.team.clone(),
                })
                .collect(),
        )
    }

    /// Record the token of a timer armed on behalf of this session.
    pub fn timer_armed(&mut self, token: TimerToken) {
        self.pending_timers.insert(token.purpose(), token);
    }

    /// Player joins by name. A known name after the lobby recovers that player.
    pub fn join(
        &mut self,
        connection: ConnectionId,
        name: &str,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        let display_name = name.trim();
        if display_name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        if self.phase == SessionPhase::Ended {
            return Err(SessionError::GameEnded);
        }

        let id = PlayerId::from_name(display_name);
        self.ensure_free(connection, &id)?;
        if let Some(existing) = self.roster.get(&id) {
            if self.phase == SessionPhase::Lobby && existing.connected {
                return Err(SessionError::NameTaken);
            }
            return self.recover_player(connection, id, now);
        }
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::AlreadyStarted);
        }

        self.roster.insert(
            id.clone(),
            PlayerRecord {
                display_name: display_name.to_string(),
                score: 0,
                streak: 0,
                team: None,
                connected: true,
                join_order: self.next_join_order,
                joined_at: SystemTime::now(),
            },
        );
        self.next_join_order += 1;
        self.identities.bind(id.clone(), connection);
        self.touch(now);

        let mut fx = Effects::none();
        fx.send(
            connection,
            ServerMessage::JoinedGame(JoinedGamePayload {
                code: self.code.clone(),
                quiz_title: self.quiz.title.clone(),
                team_mode: self.teams.enabled,
                teams: self.teams.teams.clone(),
            }),
        );
        let notice = ServerMessage::PlayerJoined(RosterChangePayload {
            name: display_name.to_string(),
            players: self.player_summaries(),
        });
        fx.send_all(self.everyone(), &notice);
        self.persist_player(&mut fx, &id);
        Ok(fx)
    }

    /// Player comes back on a new connection.
    pub fn reconnect_player(
        &mut self,
        connection: ConnectionId,
        name: &str,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        let id = PlayerId::from_name(name);
        if !self.roster.contains_key(&id) {
            return Err(SessionError::UnknownPlayer(name.trim().to_string()));
        }
        self.ensure_free(connection, &id)?;
        self.recover_player(connection, id, now)
    }

    /// A connection speaks for the host or for one player, never both.
    fn ensure_free(&self, connection: ConnectionId, id: &PlayerId) -> Result<(), SessionError> {
        if self.host.connection == Some(connection) {
            return Err(SessionError::AlreadyInGame);
        }
        match self.identities.player_for(connection) {
            Some(bound) if bound != id => Err(SessionError::AlreadyInGame),
            _ => Ok(()),
        }
    }

    fn recover_player(
        &mut self,
        connection: ConnectionId,
        id: PlayerId,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        self.identities.bind(id.clone(), connection);
        let Some(record) = self.roster.get_mut(&id) else {
            return Err(SessionError::UnknownPlayer(id.to_string()));
        };
        record.connected = true;
        let reply = ReconnectedPlayerPayload {
            code: self.code.clone(),
            quiz_title: self.quiz.title.clone(),
            state: self.phase,
            team_mode: self.teams.enabled,
            teams: self.teams.teams.clone(),
            team: record.team.clone(),
            score: record.score,
            streak: record.streak,
        };
        let name = record.display_name.clone();
        self.touch(now);

        let mut fx = Effects::none();
        fx.send(connection, ServerMessage::ReconnectedPlayer(reply));
        self.replay_player_view(&mut fx, connection, &id, now);

        let notice = ServerMessage::PlayerReconnected(RosterChangePayload {
            name,
            players: self.player_summaries(),
        });
        fx.send_all(
            self.everyone().into_iter().filter(|to| *to != connection),
            &notice,
        );
        self.persist_player(&mut fx, &id);
        Ok(fx)
    }

    /// Host comes back on a new connection; cancels the grace timer.
    pub fn reconnect_host(
        &mut self,
        connection: ConnectionId,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        if self.identities.player_for(connection).is_some() {
            return Err(SessionError::AlreadyInGame);
        }
        let was_disconnected = self.host.disconnected;
        self.host = HostBinding {
            connection: Some(connection),
            disconnected: false,
        };
        self.touch(now);

        let mut fx = Effects::none();
        if let Some(token) = self.pending_timers.remove(&TimerPurpose::HostGrace) {
            fx.cancel(token);
        }
        fx.send(connection, ServerMessage::ReconnectedHost(self.host_snapshot()));
        self.replay_host_view(&mut fx, connection, now);
        if was_disconnected {
            fx.send_all(self.player_handles(), &ServerMessage::HostReconnected);
        }
        fx.persist(PersistOp::SaveGame(self.game_entity()));
        Ok(fx)
    }

    /// Transport-level disconnect of `connection`. Unknown or stale handles are ignored.
    pub fn disconnect(
        &mut self,
        connection: ConnectionId,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        if self.host.connection == Some(connection) {
            return Ok(self.host_lost(now));
        }

        let Some(id) = self.identities.release(connection) else {
            return Ok(Effects::none());
        };
        self.touch(now);

        let mut fx = Effects::none();
        if self.phase == SessionPhase::Lobby {
            let Some(record) = self.roster.shift_remove(&id) else {
                return Ok(fx);
            };
            self.answer_history.remove(&id);
            self.answers.remove(&id);
            let notice = ServerMessage::PlayerLeft(RosterChangePayload {
                name: record.display_name,
                players: self.player_summaries(),
            });
            fx.send_all(self.everyone(), &notice);
            fx.persist(PersistOp::RemovePlayer {
                code: self.code.clone(),
                name_key: id.as_str().to_string(),
            });
            return Ok(fx);
        }

        let Some(record) = self.roster.get_mut(&id) else {
            return Ok(fx);
        };
        record.connected = false;
        let notice = ServerMessage::PlayerDisconnected(RosterChangePayload {
            name: record.display_name.clone(),
            players: self.player_summaries(),
        });
        fx.send_all(self.everyone(), &notice);
        self.persist_player(&mut fx, &id);

        if self.phase == SessionPhase::Question && self.all_connected_answered() {
            fx.extend(self.close_answers(now)?);
        }
        Ok(fx)
    }

    fn host_lost(&mut self, now: Instant) -> Effects {
        self.host = HostBinding {
            connection: None,
            disconnected: true,
        };
        if self.phase == SessionPhase::Ended {
            return Effects::none();
        }
        self.touch(now);

        let mut fx = Effects::none();
        let notice = ServerMessage::HostDisconnected(HostDisconnectedPayload {
            grace_period: self.timing.host_grace.as_secs(),
        });
        fx.send_all(self.player_handles(), &notice);
        fx.arm(TimerPurpose::HostGrace, self.timing.host_grace);
        fx.persist(PersistOp::SaveGame(self.game_entity()));
        fx
    }

    /// Host starts the countdown.
    pub fn start(&mut self, connection: ConnectionId, now: Instant) -> Result<Effects, SessionError> {
        self.require_host(connection)?;
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::AlreadyStarted);
        }
        if self.roster.is_empty() {
            return Err(SessionError::NoPlayers);
        }
        self.transition(Trigger::Start)?;
        self.touch(now);

        let mut fx = Effects::none();
        let notice = ServerMessage::GameStarting(GameStartingPayload {
            countdown: self.timing.countdown.as_secs(),
        });
        fx.send_all(self.everyone(), &notice);
        fx.arm(TimerPurpose::Countdown, self.timing.countdown);
        fx.persist(PersistOp::SaveGame(self.game_entity()));
        Ok(fx)
    }

    /// A timer armed for this session fired. Cancelled, replaced or stale tokens are ignored.
    pub fn on_timer(&mut self, token: TimerToken, now: Instant) -> Result<Effects, SessionError> {
        let purpose = token.purpose();
        if self.pending_timers.get(&purpose) != Some(&token) {
            return Ok(Effects::none());
        }
        self.pending_timers.remove(&purpose);

        match purpose {
            TimerPurpose::Countdown if self.phase == SessionPhase::Starting => {
                self.advance_question(now)
            }
            TimerPurpose::ReadingAdvance if self.phase == SessionPhase::Reading => {
                self.open_answers(now)
            }
            TimerPurpose::HostGrace
                if self.host.disconnected && self.phase != SessionPhase::Ended =>
            {
                self.finish(Trigger::Terminate, Some(HOST_LEFT_REASON), true, now)
            }
            _ => Ok(Effects::none()),
        }
    }

    /// Player answers the open question. A second answer is ignored.
    pub fn submit_answer(
        &mut self,
        connection: ConnectionId,
        option: usize,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        let id = self
            .identities
            .player_for(connection)
            .cloned()
            .ok_or(SessionError::NotInGame)?;
        if self.phase != SessionPhase::Question {
            return Err(SessionError::WrongPhase(self.phase));
        }
        if option >= OPTION_COUNT {
            return Err(SessionError::InvalidOption(option));
        }
        if self.answers.contains_key(&id) {
            return Ok(Effects::none());
        }
        let Some(index) = self.current_question else {
            return Err(SessionError::WrongPhase(self.phase));
        };

        let elapsed = self
            .question_started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        self.answers
            .insert(id.clone(), AnswerRecord { option, elapsed });
        self.answer_history.entry(id).or_default().insert(index);
        self.touch(now);

        let mut fx = Effects::none();
        fx.send(
            connection,
            ServerMessage::AnswerReceived(AnswerReceivedPayload { answer: option }),
        );
        if let Some(host) = self.host_handle() {
            fx.send(host, self.answer_progress());
        }
        if self.all_connected_answered() {
            fx.extend(self.close_answers(now)?);
        }
        Ok(fx)
    }

    /// Host calls time. Outside the question phase this does nothing.
    pub fn time_up(&mut self, connection: ConnectionId, now: Instant) -> Result<Effects, SessionError> {
        self.require_host(connection)?;
        if self.phase != SessionPhase::Question {
            return Ok(Effects::none());
        }
        self.close_answers(now)
    }

    /// Host moves on from results to the next question, or to the end.
    pub fn next_question(
        &mut self,
        connection: ConnectionId,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        self.require_host(connection)?;
        if self.phase != SessionPhase::Results {
            return Err(SessionError::WrongPhase(self.phase));
        }
        self.advance_question(now)
    }

    /// Host ends the game: from results this shows the final leaderboard, anywhere else the
    /// host quits and the session is torn down.
    pub fn end_game(&mut self, connection: ConnectionId, now: Instant) -> Result<Effects, SessionError> {
        self.require_host(connection)?;
        match self.phase {
            SessionPhase::Ended => Ok(Effects::none()),
            SessionPhase::Results => self.finish(Trigger::EndEarly, None, false, now),
            _ => self.finish(Trigger::Terminate, Some(HOST_ENDED_REASON), true, now),
        }
    }

    /// Host changes team mode. Lobby only.
    pub fn configure_teams(
        &mut self,
        connection: ConnectionId,
        enabled: bool,
        teams: Vec<String>,
        top_n: usize,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        self.require_host(connection)?;
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::WrongPhase(self.phase));
        }
        if top_n == 0 {
            return Err(SessionError::InvalidSettings(
                "top_n_players must be at least 1".into(),
            ));
        }

        self.teams = TeamConfig {
            enabled,
            teams: TeamConfig::normalize_names(teams),
            top_n,
        };
        let mut orphaned = Vec::new();
        for (id, record) in self.roster.iter_mut() {
            if record
                .team
                .as_deref()
                .is_some_and(|team| !self.teams.has_team(team))
            {
                record.team = None;
                orphaned.push(id.clone());
            }
        }
        self.touch(now);

        let mut fx = Effects::none();
        let notice = ServerMessage::TeamConfigUpdated(TeamConfigPayload {
            team_mode: self.teams.enabled,
            teams: self.teams.teams.clone(),
            top_n_players: self.teams.top_n,
        });
        fx.send_all(self.everyone(), &notice);
        fx.persist(PersistOp::SaveGame(self.game_entity()));
        for id in &orphaned {
            self.persist_player(&mut fx, id);
        }
        Ok(fx)
    }

    /// Host changes inactivity pruning.
    pub fn configure_auto_remove(
        &mut self,
        connection: ConnectionId,
        enabled: bool,
        window: usize,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        self.require_host(connection)?;
        if self.phase == SessionPhase::Ended {
            return Err(SessionError::GameEnded);
        }
        if !InactivityConfig::is_valid_window(window) {
            return Err(SessionError::InvalidSettings(format!(
                "threshold must be between 1 and {}",
                crate::state::inactivity::MAX_WINDOW
            )));
        }
        self.inactivity = InactivityConfig { enabled, window };
        self.touch(now);

        let mut fx = Effects::none();
        fx.send(
            connection,
            ServerMessage::AutoRemoveConfigUpdated(self.auto_remove_payload()),
        );
        fx.persist(PersistOp::SaveGame(self.game_entity()));
        Ok(fx)
    }

    /// Player picks a team. Lobby only, team mode on.
    pub fn select_team(
        &mut self,
        connection: ConnectionId,
        team: &str,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        let id = self
            .identities
            .player_for(connection)
            .cloned()
            .ok_or(SessionError::NotInGame)?;
        if self.phase != SessionPhase::Lobby {
            return Err(SessionError::WrongPhase(self.phase));
        }
        if !self.teams.enabled {
            return Err(SessionError::TeamModeDisabled);
        }
        let team = team.trim();
        if !self.teams.has_team(team) {
            return Err(SessionError::UnknownTeam(team.to_string()));
        }
        if let Some(record) = self.roster.get_mut(&id) {
            record.team = Some(team.to_string());
        }
        self.touch(now);

        let mut fx = Effects::none();
        let notice = ServerMessage::PlayerUpdated(PlayersPayload {
            players: self.player_summaries(),
        });
        fx.send_all(self.everyone(), &notice);
        self.persist_player(&mut fx, &id);
        Ok(fx)
    }

    /// Host started its auto-advance countdown; relay it to the players.
    pub fn autoplay_started(
        &mut self,
        connection: ConnectionId,
        seconds: u32,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        self.require_host(connection)?;
        if self.phase != SessionPhase::Results {
            return Ok(Effects::none());
        }
        self.touch(now);

        let is_last_question = self
            .current_question
            .is_some_and(|index| index + 1 >= self.quiz.len());
        let mut fx = Effects::none();
        let notice = ServerMessage::AutoplayCountdown(AutoplayCountdownPayload {
            seconds,
            is_last_question,
        });
        fx.send_all(self.player_handles(), &notice);
        Ok(fx)
    }

    /// Expire the session if it has been idle for too long.
    pub fn expire(&mut self, now: Instant, policy: &ExpiryPolicy) -> Option<Effects> {
        let idle = now.saturating_duration_since(self.last_activity);
        match self.phase {
            SessionPhase::Ended if idle >= policy.ended_after => {
                let mut fx = Effects::none();
                for (_, token) in self.pending_timers.drain() {
                    fx.cancel(token);
                }
                fx.teardown = true;
                Some(fx)
            }
            SessionPhase::Ended => None,
            _ if idle >= policy.idle_after => self
                .finish(Trigger::Terminate, Some(EXPIRED_REASON), true, now)
                .ok(),
            _ => None,
        }
    }

    fn advance_question(&mut self, now: Instant) -> Result<Effects, SessionError> {
        let next = self.current_question.map_or(0, |index| index + 1);
        if next >= self.quiz.len() {
            return self.finish(Trigger::QuizExhausted, None, false, now);
        }
        let trigger = if self.phase == SessionPhase::Starting {
            Trigger::CountdownElapsed
        } else {
            Trigger::NextQuestion
        };
        self.transition(trigger)?;

        let quiz = Arc::clone(&self.quiz);
        let question = &quiz.questions[next];
        let reading = self.timing.reading.duration_for(&question.prompt);
        self.current_question = Some(next);
        self.last_results = None;
        self.reading_deadline = Some(now + reading);
        self.touch(now);

        let mut fx = Effects::none();
        let notice = self.reading_message(next, question, reading);
        fx.send_all(self.everyone(), &notice);
        fx.arm(TimerPurpose::ReadingAdvance, reading);
        fx.persist(PersistOp::SaveGame(self.game_entity()));
        Ok(fx)
    }

    fn open_answers(&mut self, now: Instant) -> Result<Effects, SessionError> {
        let Some(index) = self.current_question else {
            return Ok(Effects::none());
        };
        self.transition(Trigger::ReadingElapsed)?;
        self.answers.clear();
        self.question_started_at = Some(now);
        self.reading_deadline = None;
        self.touch(now);

        let quiz = Arc::clone(&self.quiz);
        let question = &quiz.questions[index];
        let mut fx = Effects::none();
        if let Some(host) = self.host_handle() {
            fx.send(host, self.answers_message(index, question, true, now));
        }
        let notice = self.answers_message(index, question, false, now);
        fx.send_all(self.player_handles(), &notice);
        fx.persist(PersistOp::SaveGame(self.game_entity()));
        Ok(fx)
    }

    fn close_answers(&mut self, now: Instant) -> Result<Effects, SessionError> {
        let quiz = Arc::clone(&self.quiz);
        let Some((index, question)) = self
            .current_question
            .and_then(|index| quiz.question(index).map(|question| (index, question)))
        else {
            return Ok(Effects::none());
        };
        self.transition(Trigger::CloseAnswers)?;
        self.question_started_at = None;

        let answered_at = SystemTime::now();
        let mut answer_counts = vec![0u32; OPTION_COUNT];
        let mut outcomes: HashMap<PlayerId, (bool, u32)> = HashMap::new();
        let mut responses = Vec::new();
        for (id, record) in self.roster.iter_mut() {
            let answer = self.answers.get(id);
            if let Some(answer) = answer {
                answer_counts[answer.option] += 1;
            }
            let correct = answer.is_some_and(|answer| answer.option == question.correct_index);
            let outcome = score_answer(
                correct,
                answer.map(|answer| answer.elapsed),
                question.time_limit,
                record.streak,
            );
            record.score = record.score.saturating_add(outcome.points);
            record.streak = outcome.streak;
            outcomes.insert(id.clone(), (correct, outcome.points));

            if let Some(answer) = answer {
                responses.push(AnswerResponseEntity {
                    id: uuid::Uuid::new_v4(),
                    game_code: self.code.clone(),
                    player_name: record.display_name.clone(),
                    question_index: index,
                    answer_index: answer.option,
                    is_correct: correct,
                    time_taken_ms: u64::try_from(answer.elapsed.as_millis()).unwrap_or(u64::MAX),
                    points_awarded: outcome.points,
                    answered_at,
                });
            }
        }
        self.touch(now);

        let ranked = self.leaderboard();
        let results: Vec<ResultRow> = ranked
            .iter()
            .map(|entry| {
                let (correct, gained) = outcomes
                    .get(&PlayerId::from_name(&entry.name))
                    .copied()
                    .unwrap_or_default();
                ResultRow {
                    name: entry.name.clone(),
                    correct,
                    score_gained: gained,
                    total_score: entry.score,
                }
            })
            .collect();
        let payload = QuestionResultsPayload {
            correct_index: question.correct_index,
            correct_answer: question.correct_answer().to_string(),
            answer_counts,
            results,
        };
        self.last_results = Some(payload.clone());

        let mut fx = Effects::none();
        if let Some(host) = self.host_handle() {
            fx.send(host, ServerMessage::ShowResults(payload));
        }
        let total_players = ranked.len();
        for (position, entry) in ranked.iter().enumerate() {
            let id = PlayerId::from_name(&entry.name);
            let (Some(to), Some(record)) = (self.identities.connection_for(&id), self.roster.get(&id))
            else {
                continue;
            };
            let (correct, gained) = outcomes.get(&id).copied().unwrap_or_default();
            fx.send(
                to,
                ServerMessage::YourResult(PlayerResultPayload {
                    correct,
                    correct_answer: question.correct_answer().to_string(),
                    score_gained: gained,
                    total_score: record.score,
                    streak: record.streak,
                    rank: position + 1,
                    total_players,
                }),
            );
        }

        let ids: Vec<PlayerId> = self.roster.keys().cloned().collect();
        for id in &ids {
            self.persist_player(&mut fx, id);
        }
        for response in responses {
            fx.persist(PersistOp::RecordAnswer(response));
        }
        fx.persist(PersistOp::SaveGame(self.game_entity()));

        fx.extend(self.prune_inactive(index));
        Ok(fx)
    }

    fn prune_inactive(&mut self, index: usize) -> Effects {
        let candidates: Vec<PlayerId> = self
            .roster
            .iter()
            .filter(|(_, record)| record.connected)
            .map(|(id, _)| id.clone())
            .collect();
        let flagged = inactive_players(
            &self.inactivity,
            index,
            candidates.iter(),
            &self.answer_history,
        );

        let mut fx = Effects::none();
        if flagged.is_empty() {
            return fx;
        }

        let mut names = Vec::with_capacity(flagged.len());
        let mut removed_handles = Vec::new();
        for id in flagged {
            if let Some(record) = self.roster.shift_remove(&id) {
                names.push(record.display_name);
            }
            self.answer_history.remove(&id);
            self.answers.remove(&id);
            if let Some(handle) = self.identities.forget(&id) {
                removed_handles.push(handle);
            }
            fx.persist(PersistOp::RemovePlayer {
                code: self.code.clone(),
                name_key: id.as_str().to_string(),
            });
        }

        let farewell = ServerMessage::GameEnded(self.game_ended_payload(Some(INACTIVE_REASON)));
        fx.send_all(removed_handles, &farewell);
        if let Some(host) = self.host_handle() {
            fx.send(
                host,
                ServerMessage::InactivePlayersRemoved(InactivePlayersPayload {
                    names,
                    players: self.player_summaries(),
                }),
            );
        }
        fx
    }

    fn finish(
        &mut self,
        trigger: Trigger,
        reason: Option<&str>,
        teardown: bool,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        self.transition(trigger)?;
        self.question_started_at = None;
        self.reading_deadline = None;
        self.touch(now);

        let mut fx = Effects::none();
        for (_, token) in self.pending_timers.drain() {
            fx.cancel(token);
        }
        let notice = ServerMessage::GameEnded(self.game_ended_payload(reason));
        fx.send_all(self.everyone(), &notice);
        if teardown {
            fx.persist(PersistOp::DeleteGame {
                code: self.code.clone(),
            });
            fx.teardown = true;
        } else {
            fx.persist(PersistOp::SaveGame(self.game_entity()));
        }
        Ok(fx)
    }

    fn replay_player_view(
        &self,
        fx: &mut Effects,
        connection: ConnectionId,
        id: &PlayerId,
        now: Instant,
    ) {
        let Some((index, question)) = self
            .current_question
            .and_then(|index| self.quiz.question(index).map(|question| (index, question)))
        else {
            if self.phase == SessionPhase::Ended {
                fx.send(
                    connection,
                    ServerMessage::GameEnded(self.game_ended_payload(None)),
                );
            }
            return;
        };

        match self.phase {
            SessionPhase::Reading => {
                fx.send(connection, self.remaining_reading_message(index, question, now));
            }
            SessionPhase::Question => {
                fx.send(connection, self.answers_message(index, question, false, now));
                if let Some(answer) = self.answers.get(id) {
                    fx.send(
                        connection,
                        ServerMessage::AnswerReceived(AnswerReceivedPayload {
                            answer: answer.option,
                        }),
                    );
                }
            }
            SessionPhase::Ended => {
                fx.send(
                    connection,
                    ServerMessage::GameEnded(self.game_ended_payload(None)),
                );
            }
            _ => {}
        }
    }

    fn replay_host_view(&self, fx: &mut Effects, connection: ConnectionId, now: Instant) {
        let current = self
            .current_question
            .and_then(|index| self.quiz.question(index).map(|question| (index, question)));
        match (self.phase, current) {
            (SessionPhase::Reading, Some((index, question))) => {
                fx.send(connection, self.remaining_reading_message(index, question, now));
            }
            (SessionPhase::Question, Some((index, question))) => {
                fx.send(connection, self.answers_message(index, question, true, now));
                fx.send(connection, self.answer_progress());
            }
            (SessionPhase::Results, _) => {
                if let Some(results) = &self.last_results {
                    fx.send(connection, ServerMessage::ShowResults(results.clone()));
                }
            }
            (SessionPhase::Ended, _) => {
                fx.send(
                    connection,
                    ServerMessage::GameEnded(self.game_ended_payload(None)),
                );
            }
            _ => {}
        }
    }

    fn reading_message(&self, index: usize, question: &Question, reading: Duration) -> ServerMessage {
        ServerMessage::ShowQuestionReading(QuestionReadingPayload {
            question_num: index + 1,
            total_questions: self.quiz.len(),
            question: question.prompt.clone(),
            reading_time: reading.as_secs_f64(),
        })
    }

    fn remaining_reading_message(&self, index: usize, question: &Question, now: Instant) -> ServerMessage {
        let remaining = self
            .reading_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or_default();
        self.reading_message(index, question, remaining)
    }

    fn answers_message(
        &self,
        index: usize,
        question: &Question,
        for_host: bool,
        now: Instant,
    ) -> ServerMessage {
        let elapsed = self
            .question_started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        let remaining = question.time_limit.saturating_sub(elapsed);
        ServerMessage::ShowAnswers(QuestionAnswersPayload {
            question_num: index + 1,
            total_questions: self.quiz.len(),
            question: question.prompt.clone(),
            answers: question.options.to_vec(),
            time_limit: remaining.as_secs_f64().ceil() as u64,
            correct_index: for_host.then_some(question.correct_index),
        })
    }

    fn answer_progress(&self) -> ServerMessage {
        ServerMessage::AnswerUpdate(AnswerProgressPayload {
            answered: self.answers.len(),
            total: self.roster.values().filter(|record| record.connected).count(),
        })
    }

    fn host_snapshot(&self) -> HostSnapshotPayload {
        HostSnapshotPayload {
            code: self.code.clone(),
            quiz_title: self.quiz.title.clone(),
            state: self.phase,
            current_question: self.current_index(),
            total_questions: self.quiz.len(),
            players: self.player_summaries(),
            team_mode: self.teams.enabled,
            teams: self.teams.teams.clone(),
            top_n_players: self.teams.top_n,
            auto_remove: self.auto_remove_payload(),
        }
    }

    fn auto_remove_payload(&self) -> AutoRemovePayload {
        AutoRemovePayload {
            enabled: self.inactivity.enabled,
            threshold: self.inactivity.window,
        }
    }

    fn game_ended_payload(&self, reason: Option<&str>) -> GameEndedPayload {
        let ranked = self.leaderboard();
        let team_leaderboard = team_standings(&ranked, &self.teams)
            .into_iter()
            .map(Into::into)
            .collect();
        GameEndedPayload {
            reason: reason.map(str::to_string),
            leaderboard: ranked.into_iter().map(Into::into).collect(),
            team_mode: self.teams.enabled,
            team_leaderboard,
            top_n_players: self.teams.top_n,
        }
    }

    fn player_summaries(&self) -> Vec<PlayerSummary> {
        self.roster
            .values()
            .map(|record| PlayerSummary {
                name: record.display_name.clone(),
                score: record.score,
                team: record.team.clone(),
                connected: record.connected,
            })
            .collect()
    }

    fn all_connected_answered(&self) -> bool {
        let mut any_connected = false;
        for (id, record) in &self.roster {
            if record.connected {
                any_connected = true;
                if !self.answers.contains_key(id) {
                    return false;
                }
            }
        }
        any_connected
    }

    fn require_host(&self, connection: ConnectionId) -> Result<(), SessionError> {
        if self.host.connection == Some(connection) {
            Ok(())
        } else {
            Err(SessionError::NotHost)
        }
    }

    fn host_handle(&self) -> Option<ConnectionId> {
        self.host.connection.filter(|_| !self.host.disconnected)
    }

    fn player_handles(&self) -> Vec<ConnectionId> {
        self.roster
            .keys()
            .filter_map(|id| self.identities.connection_for(id))
            .collect()
    }

    fn everyone(&self) -> Vec<ConnectionId> {
        self.host_handle()
            .into_iter()
            .chain(self.player_handles())
            .collect()
    }

    fn transition(&mut self, trigger: Trigger) -> Result<(), SessionError> {
        self.phase = next_phase(self.phase, trigger)?;
        Ok(())
    }

    fn touch(&mut self, now: Instant) {
        self.last_activity = now;
        self.updated_at = SystemTime::now();
    }

    fn current_index(&self) -> i64 {
        self.current_question
            .and_then(|index| i64::try_from(index).ok())
            .unwrap_or(-1)
    }

    fn persist_player(&self, fx: &mut Effects, id: &PlayerId) {
        if let Some(entity) = self.player_entity(id) {
            fx.persist(PersistOp::SavePlayer(entity));
        }
    }

    /// Stored form of the game record.
    pub fn game_entity(&self) -> GameEntity {
        GameEntity {
            code: self.code.clone(),
            host_connection: self.host_handle().map(|handle| handle.as_uuid()),
            quiz: QuizEntity::from(self.quiz.as_ref()),
            phase: self.phase.as_str().to_string(),
            current_question_index: self.current_index(),
            team_mode: self.teams.enabled,
            teams: self.teams.teams.clone(),
            top_n_players: self.teams.top_n,
            auto_remove_enabled: self.inactivity.enabled,
            auto_remove_threshold: self.inactivity.window,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn player_entity(&self, id: &PlayerId) -> Option<PlayerEntity> {
        let record = self.roster.get(id)?;
        Some(PlayerEntity {
            game_code: self.code.clone(),
            name_key: id.as_str().to_string(),
            name: record.display_name.clone(),
            connection_id: self
                .identities
                .connection_for(id)
                .map(|handle| handle.as_uuid()),
            score: record.score,
            streak: record.streak,
            team: record.team.clone(),
            connected: record.connected,
            answered_questions: self
                .answer_history
                .get(id)
                .map(|answered| answered.iter().copied().collect())
                .unwrap_or_default(),
            join_order: record.join_order,
            joined_at: record.joined_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::effects::TimerCommand;

    fn quiz(count: usize) -> Arc<Quiz> {
        let questions = (0..count)
            .map(|i| {
                Question::new(
                    format!("Question {i}?"),
                    vec!["A".into(), "B".into(), "C".into(), "D".into()],
                    1,
                    Duration::from_secs(20),
                )
                .unwrap()
            })
            .collect();
        Arc::new(Quiz::new("Trivia".into(), questions).unwrap())
    }

    struct Harness {
        session: GameSession,
        host: ConnectionId,
        clock: Instant,
        seq: u64,
    }

    impl Harness {
        fn new(questions: usize) -> Self {
            let host = ConnectionId::new();
            let clock = Instant::now();
            let (session, fx) = GameSession::open(
                "ABC234".into(),
                quiz(questions),
                host,
                SessionTiming::default(),
                clock,
            );
            assert!(matches!(
                fx.messages_for(host).next(),
                Some(ServerMessage::GameCreated(_))
            ));
            Self {
                session,
                host,
                clock,
                seq: 0,
            }
        }

        fn arm_requested(&mut self, fx: &Effects) {
            for command in &fx.timers {
                if let TimerCommand::Arm { purpose, .. } = command {
                    self.seq += 1;
                    self.session.timer_armed(TimerToken::new(*purpose, self.seq));
                }
            }
        }

        fn run<F>(&mut self, op: F) -> Result<Effects, SessionError>
        where
            F: FnOnce(&mut GameSession, Instant) -> Result<Effects, SessionError>,
        {
            let clock = self.clock;
            let fx = op(&mut self.session, clock)?;
            self.arm_requested(&fx);
            Ok(fx)
        }

        fn fire(&mut self, purpose: TimerPurpose) -> Effects {
            let token = self.session.pending_timer(purpose).expect("timer armed");
            self.run(|session, now| session.on_timer(token, now)).unwrap()
        }

        fn join(&mut self, name: &str) -> ConnectionId {
            let connection = ConnectionId::new();
            self.run(|session, now| session.join(connection, name, now))
                .unwrap();
            connection
        }

        fn start_to_question(&mut self) {
            let host = self.host;
            self.run(|session, now| session.start(host, now)).unwrap();
            self.fire(TimerPurpose::Countdown);
            self.fire(TimerPurpose::ReadingAdvance);
            assert_eq!(self.session.phase(), SessionPhase::Question);
        }

        fn advance(&mut self, by: Duration) {
            self.clock += by;
        }
    }

    fn ended_count(fx: &Effects, to: ConnectionId) -> usize {
        fx.messages_for(to)
            .filter(|message| matches!(message, ServerMessage::GameEnded(_)))
            .count()
    }

    #[test]
    fn join_rejects_duplicate_name_in_lobby() {
        let mut h = Harness::new(2);
        h.join("Alice");
        let other = ConnectionId::new();
        let err = h
            .run(|session, now| session.join(other, "  alice ", now))
            .unwrap_err();
        assert_eq!(err, SessionError::NameTaken);
        assert_eq!(h.session.roster_len(), 1);
    }

    #[test]
    fn join_notifies_host_and_roster() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        let bob = ConnectionId::new();
        let fx = h.run(|session, now| session.join(bob, "Bob", now)).unwrap();

        assert!(matches!(
            fx.messages_for(bob).next(),
            Some(ServerMessage::JoinedGame(_))
        ));
        for to in [h.host, alice] {
            let Some(ServerMessage::PlayerJoined(payload)) = fx.messages_for(to).next() else {
                panic!("expected player_joined");
            };
            assert_eq!(payload.name, "Bob");
            assert_eq!(payload.players.len(), 2);
        }
        assert!(
            fx.persistence
                .iter()
                .any(|op| matches!(op, PersistOp::SavePlayer(player) if player.name_key == "bob"))
        );
    }

    #[test]
    fn late_join_with_new_name_is_refused() {
        let mut h = Harness::new(2);
        h.join("Alice");
        h.start_to_question();
        let late = ConnectionId::new();
        let err = h
            .run(|session, now| session.join(late, "Zoe", now))
            .unwrap_err();
        assert_eq!(err, SessionError::AlreadyStarted);
    }

    #[test]
    fn start_requires_host_and_players() {
        let mut h = Harness::new(2);
        let host = h.host;
        assert_eq!(
            h.run(|session, now| session.start(host, now)).unwrap_err(),
            SessionError::NoPlayers
        );
        let alice = h.join("Alice");
        assert_eq!(
            h.run(|session, now| session.start(alice, now)).unwrap_err(),
            SessionError::NotHost
        );
        let fx = h.run(|session, now| session.start(host, now)).unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Starting);
        assert!(fx.timers.contains(&TimerCommand::Arm {
            purpose: TimerPurpose::Countdown,
            after: Duration::from_secs(3),
        }));
    }

    #[test]
    fn answer_outside_question_is_rejected() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        let err = h
            .run(|session, now| session.submit_answer(alice, 1, now))
            .unwrap_err();
        assert_eq!(err, SessionError::WrongPhase(SessionPhase::Lobby));
    }

    #[test]
    fn second_answer_is_ignored() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        h.join("Bob");
        h.start_to_question();

        h.run(|session, now| session.submit_answer(alice, 2, now))
            .unwrap();
        let fx = h
            .run(|session, now| session.submit_answer(alice, 1, now))
            .unwrap();
        assert!(fx.is_empty());
        assert_eq!(h.session.answer_of("Alice").unwrap().option, 2);
    }

    #[test]
    fn last_answer_closes_question_and_scores() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        let bob = h.join("Bob");
        h.start_to_question();

        h.advance(Duration::from_secs(5));
        h.run(|session, now| session.submit_answer(alice, 1, now))
            .unwrap();
        h.advance(Duration::from_secs(5));
        let fx = h
            .run(|session, now| session.submit_answer(bob, 0, now))
            .unwrap();

        assert_eq!(h.session.phase(), SessionPhase::Results);
        let alice_record = h.session.player("Alice").unwrap();
        assert_eq!(alice_record.score, 875);
        assert_eq!(alice_record.streak, 1);
        assert_eq!(h.session.player("Bob").unwrap().score, 0);

        let Some(ServerMessage::ShowResults(results)) = fx
            .messages_for(h.host)
            .find(|message| matches!(message, ServerMessage::ShowResults(_)))
        else {
            panic!("expected show_results");
        };
        assert_eq!(results.answer_counts, vec![1, 1, 0, 0]);
        assert_eq!(results.results[0].name, "Alice");

        let Some(ServerMessage::YourResult(mine)) = fx
            .messages_for(bob)
            .find(|message| matches!(message, ServerMessage::YourResult(_)))
        else {
            panic!("expected your_result");
        };
        assert!(!mine.correct);
        assert_eq!(mine.rank, 2);
        assert_eq!(mine.total_players, 2);

        let recorded = fx
            .persistence
            .iter()
            .filter(|op| matches!(op, PersistOp::RecordAnswer(_)))
            .count();
        assert_eq!(recorded, 2);
    }

    #[test]
    fn time_up_outside_question_is_a_no_op() {
        let mut h = Harness::new(2);
        h.join("Alice");
        let host = h.host;
        let fx = h.run(|session, now| session.time_up(host, now)).unwrap();
        assert!(fx.is_empty());
        assert_eq!(h.session.phase(), SessionPhase::Lobby);
    }

    #[test]
    fn stale_reading_timer_is_ignored() {
        let mut h = Harness::new(2);
        h.join("Alice");
        let host = h.host;
        h.run(|session, now| session.start(host, now)).unwrap();
        h.fire(TimerPurpose::Countdown);
        let stale = h.session.pending_timer(TimerPurpose::ReadingAdvance).unwrap();
        h.fire(TimerPurpose::ReadingAdvance);

        let fx = h
            .run(|session, now| session.on_timer(stale, now))
            .unwrap();
        assert!(fx.is_empty());
        assert_eq!(h.session.phase(), SessionPhase::Question);
    }

    #[test]
    fn quiz_exhaustion_ends_the_game() {
        let mut h = Harness::new(1);
        let alice = h.join("Alice");
        h.start_to_question();
        h.run(|session, now| session.submit_answer(alice, 1, now))
            .unwrap();
        let host = h.host;
        let fx = h
            .run(|session, now| session.next_question(host, now))
            .unwrap();

        assert_eq!(h.session.phase(), SessionPhase::Ended);
        assert!(!fx.teardown);
        let Some(ServerMessage::GameEnded(payload)) = fx.messages_for(alice).next() else {
            panic!("expected game_ended");
        };
        assert!(payload.reason.is_none());
        assert_eq!(payload.leaderboard[0].name, "Alice");
    }

    #[test]
    fn end_game_from_lobby_tears_down() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        let host = h.host;
        let fx = h.run(|session, now| session.end_game(host, now)).unwrap();
        assert!(fx.teardown);
        assert_eq!(ended_count(&fx, alice), 1);
        assert!(
            fx.persistence
                .iter()
                .any(|op| matches!(op, PersistOp::DeleteGame { .. }))
        );
    }

    #[test]
    fn host_grace_expiry_ends_game_once() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        h.start_to_question();
        let host = h.host;
        let fx = h
            .run(|session, now| session.disconnect(host, now))
            .unwrap();
        assert!(matches!(
            fx.messages_for(alice).next(),
            Some(ServerMessage::HostDisconnected(_))
        ));

        h.advance(Duration::from_secs(60));
        let fx = h.fire(TimerPurpose::HostGrace);
        assert!(fx.teardown);
        assert_eq!(ended_count(&fx, alice), 1);
        assert_eq!(ended_count(&fx, host), 0);
        assert!(h.session.pending_timer(TimerPurpose::ReadingAdvance).is_none());
    }

    #[test]
    fn host_reconnect_cancels_grace_timer() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        let host = h.host;
        h.run(|session, now| session.disconnect(host, now)).unwrap();
        let grace = h.session.pending_timer(TimerPurpose::HostGrace).unwrap();

        let new_host = ConnectionId::new();
        let fx = h
            .run(|session, now| session.reconnect_host(new_host, now))
            .unwrap();
        assert!(fx.timers.contains(&TimerCommand::Cancel(grace)));
        assert!(matches!(
            fx.messages_for(new_host).next(),
            Some(ServerMessage::ReconnectedHost(_))
        ));
        assert!(
            fx.messages_for(alice)
                .any(|message| matches!(message, ServerMessage::HostReconnected))
        );

        let late = h
            .run(|session, now| session.on_timer(grace, now))
            .unwrap();
        assert!(late.is_empty());
        assert_eq!(h.session.phase(), SessionPhase::Lobby);
    }

    #[test]
    fn player_reconnect_keeps_score_and_answer() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        h.join("Bob");
        h.start_to_question();
        h.run(|session, now| session.submit_answer(alice, 3, now))
            .unwrap();
        h.run(|session, now| session.disconnect(alice, now)).unwrap();
        assert!(!h.session.player("Alice").unwrap().connected);

        let again = ConnectionId::new();
        let fx = h
            .run(|session, now| session.reconnect_player(again, "ALICE", now))
            .unwrap();
        let replies: Vec<_> = fx.messages_for(again).collect();
        assert!(matches!(replies[0], ServerMessage::ReconnectedPlayer(_)));
        assert!(matches!(replies[1], ServerMessage::ShowAnswers(payload) if payload.correct_index.is_none()));
        assert!(matches!(replies[2], ServerMessage::AnswerReceived(payload) if payload.answer == 3));
        assert_eq!(h.session.answer_of("Alice").unwrap().option, 3);

        let stale = h
            .run(|session, now| session.disconnect(alice, now))
            .unwrap();
        assert!(stale.is_empty());
        assert!(h.session.player("Alice").unwrap().connected);
    }

    #[test]
    fn rejoin_mid_question_keeps_team_streak_and_tie_order() {
        let mut h = Harness::new(3);
        let alice = h.join("Alice");
        let bob = h.join("Bob");
        let host = h.host;
        h.run(|session, now| {
            session.configure_teams(host, true, vec!["Red".into(), "Blue".into()], 2, now)
        })
        .unwrap();
        h.run(|session, now| session.select_team(alice, "Red", now))
            .unwrap();
        h.run(|session, now| session.select_team(bob, "Blue", now))
            .unwrap();
        h.start_to_question();

        h.advance(Duration::from_secs(2));
        h.run(|session, now| session.submit_answer(alice, 1, now))
            .unwrap();
        h.run(|session, now| session.submit_answer(bob, 1, now))
            .unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Results);

        h.run(|session, now| session.next_question(host, now))
            .unwrap();
        h.fire(TimerPurpose::ReadingAdvance);
        h.run(|session, now| session.submit_answer(alice, 1, now))
            .unwrap();
        h.run(|session, now| session.disconnect(alice, now)).unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Question);

        let again = ConnectionId::new();
        h.run(|session, now| session.join(again, "alice", now))
            .unwrap();
        let record = h.session.player("Alice").unwrap();
        assert!(record.connected);
        assert_eq!(record.team.as_deref(), Some("Red"));
        assert_eq!(record.streak, 1);
        assert_eq!(record.score, 950);
        assert_eq!(h.session.answer_of("Alice").unwrap().option, 1);

        let order = |session: &GameSession| {
            session
                .leaderboard()
                .into_iter()
                .map(|entry| (entry.name, entry.score))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            order(&h.session),
            vec![("Alice".to_string(), 950), ("Bob".to_string(), 950)]
        );

        h.run(|session, now| session.submit_answer(bob, 1, now))
            .unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Results);
        assert_eq!(h.session.player("Alice").unwrap().streak, 2);
        assert_eq!(
            order(&h.session),
            vec![("Alice".to_string(), 2050), ("Bob".to_string(), 2050)]
        );
    }

    #[test]
    fn bound_connection_cannot_take_a_second_identity() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        let host = h.host;
        assert_eq!(
            h.run(|session, now| session.join(alice, "Bob", now))
                .unwrap_err(),
            SessionError::AlreadyInGame
        );
        assert_eq!(
            h.run(|session, now| session.join(host, "Carol", now))
                .unwrap_err(),
            SessionError::AlreadyInGame
        );
        assert_eq!(
            h.run(|session, now| session.reconnect_host(alice, now))
                .unwrap_err(),
            SessionError::AlreadyInGame
        );
        assert_eq!(h.session.roster_len(), 1);

        h.start_to_question();
        h.run(|session, now| session.submit_answer(alice, 1, now))
            .unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Results);

        h.run(|session, now| session.disconnect(alice, now)).unwrap();
        assert!(!h.session.player("Alice").unwrap().connected);
    }

    #[test]
    fn rejected_second_name_leaves_lobby_disconnect_intact() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        h.join("Bob");
        assert_eq!(
            h.run(|session, now| session.reconnect_player(alice, "Bob", now))
                .unwrap_err(),
            SessionError::AlreadyInGame
        );
        h.run(|session, now| session.disconnect(alice, now)).unwrap();
        assert!(h.session.player("Alice").is_none());
        assert!(h.session.player("Bob").unwrap().connected);
    }

    #[test]
    fn reconnect_unknown_player_fails() {
        let mut h = Harness::new(2);
        let connection = ConnectionId::new();
        let err = h
            .run(|session, now| session.reconnect_player(connection, "Ghost", now))
            .unwrap_err();
        assert_eq!(err, SessionError::UnknownPlayer("Ghost".into()));
    }

    #[test]
    fn lobby_disconnect_removes_player() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        let fx = h.run(|session, now| session.disconnect(alice, now)).unwrap();
        assert_eq!(h.session.roster_len(), 0);
        assert!(matches!(
            fx.messages_for(h.host).next(),
            Some(ServerMessage::PlayerLeft(_))
        ));
    }

    #[test]
    fn disconnect_of_last_pending_player_closes_question() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        let bob = h.join("Bob");
        h.start_to_question();
        h.run(|session, now| session.submit_answer(alice, 1, now))
            .unwrap();
        h.run(|session, now| session.disconnect(bob, now)).unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Results);
        assert_eq!(h.session.player("Bob").unwrap().streak, 0);
    }

    #[test]
    fn inactive_players_are_pruned_after_results() {
        let mut h = Harness::new(3);
        let alice = h.join("Alice");
        let bob = h.join("Bob");
        let host = h.host;
        h.run(|session, now| session.configure_auto_remove(host, true, 1, now))
            .unwrap();
        h.start_to_question();

        h.run(|session, now| session.submit_answer(alice, 1, now))
            .unwrap();
        let fx = h.run(|session, now| session.time_up(host, now)).unwrap();

        assert!(h.session.player("Bob").is_none());
        assert_eq!(ended_count(&fx, bob), 1);
        let Some(ServerMessage::InactivePlayersRemoved(payload)) = fx
            .messages_for(host)
            .find(|message| matches!(message, ServerMessage::InactivePlayersRemoved(_)))
        else {
            panic!("expected inactive_players_removed");
        };
        assert_eq!(payload.names, vec!["Bob".to_string()]);
        assert_eq!(payload.players.len(), 1);
    }

    #[test]
    fn team_settings_are_lobby_only_and_validated() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        let host = h.host;
        assert_eq!(
            h.run(|session, now| session.select_team(alice, "Red", now))
                .unwrap_err(),
            SessionError::TeamModeDisabled
        );
        h.run(|session, now| {
            session.configure_teams(
                host,
                true,
                vec![" Red ".into(), "red".into(), "Blue".into()],
                2,
                now,
            )
        })
        .unwrap();
        assert_eq!(
            h.run(|session, now| session.select_team(alice, "Green", now))
                .unwrap_err(),
            SessionError::UnknownTeam("Green".into())
        );
        h.run(|session, now| session.select_team(alice, "Red", now))
            .unwrap();
        assert_eq!(h.session.player("Alice").unwrap().team.as_deref(), Some("Red"));

        h.run(|session, now| session.configure_teams(host, true, vec!["Blue".into()], 2, now))
            .unwrap();
        assert_eq!(h.session.player("Alice").unwrap().team, None);

        h.start_to_question();
        assert_eq!(
            h.run(|session, now| session.configure_teams(host, false, Vec::new(), 3, now))
                .unwrap_err(),
            SessionError::WrongPhase(SessionPhase::Question)
        );
    }

    #[test]
    fn restore_falls_back_to_results_and_waits_for_host() {
        let mut h = Harness::new(2);
        h.join("Alice");
        h.start_to_question();
        let game = h.session.game_entity();
        let player = h
            .session
            .player_entity(&PlayerId::from_name("Alice"))
            .unwrap();

        let (restored, fx) =
            GameSession::restore(game, vec![player], SessionTiming::default(), h.clock).unwrap();
        assert_eq!(restored.phase(), SessionPhase::Results);
        assert_eq!(restored.current_question(), Some(0));
        assert!(restored.is_host_disconnected());
        assert!(!restored.player("Alice").unwrap().connected);
        assert!(fx.timers.contains(&TimerCommand::Arm {
            purpose: TimerPurpose::HostGrace,
            after: Duration::from_secs(60),
        }));
    }

    #[test]
    fn idle_sessions_expire() {
        let mut h = Harness::new(2);
        let alice = h.join("Alice");
        let policy = ExpiryPolicy {
            ended_after: Duration::from_secs(60),
            idle_after: Duration::from_secs(600),
        };
        assert!(h.session.expire(h.clock, &policy).is_none());

        h.advance(Duration::from_secs(600));
        let fx = h.session.expire(h.clock, &policy).unwrap();
        assert!(fx.teardown);
        assert_eq!(ended_count(&fx, alice), 1);
        assert_eq!(h.session.phase(), SessionPhase::Ended);
    }
}
