//! JSON frames exchanged with host and player sockets.
//!
//! Every frame is `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::validation::validate_game_code,
    state::{
        leaderboard::{LeaderboardEntry, TeamStanding},
        state_machine::SessionPhase,
    },
};

/// Why an inbound frame was refused before reaching a session.
#[derive(Debug, Error)]
pub enum InboundError {
    /// Not JSON, or not a known event.
    #[error("malformed message: {0}")]
    Parse(#[from] serde_json::Error),
    /// Known event with out-of-range fields.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Events sent by host and player clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Host opens a new session for a catalog quiz.
    CreateGame(CreateGameRequest),
    /// Player joins (or silently recovers) by name.
    JoinGame(PlayerNameRequest),
    /// Host starts the countdown.
    StartGame(GameCodeRequest),
    /// Host changes team mode.
    ConfigureTeams(ConfigureTeamsRequest),
    /// Host changes inactivity pruning.
    ConfigureAutoRemove(ConfigureAutoRemoveRequest),
    /// Player picks a team.
    SelectTeam(SelectTeamRequest),
    /// Player answers the open question.
    SubmitAnswer(SubmitAnswerRequest),
    /// Host closes the question early.
    TimeUp(GameCodeRequest),
    /// Host moves on from results.
    NextQuestionRequest(GameCodeRequest),
    /// Host ends or quits the game.
    EndGameRequest(GameCodeRequest),
    /// Host comes back on a new socket.
    ReconnectHost(GameCodeRequest),
    /// Player comes back on a new socket.
    ReconnectPlayer(PlayerNameRequest),
    /// Host started its auto-advance countdown.
    AutoplayStarted(AutoplayRequest),
}

impl ClientMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, InboundError> {
        let message: Self = serde_json::from_str(raw)?;
        message.validate()?;
        Ok(message)
    }

    /// Event name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateGame(_) => "create_game",
            Self::JoinGame(_) => "join_game",
            Self::StartGame(_) => "start_game",
            Self::ConfigureTeams(_) => "configure_teams",
            Self::ConfigureAutoRemove(_) => "configure_auto_remove",
            Self::SelectTeam(_) => "select_team",
            Self::SubmitAnswer(_) => "submit_answer",
            Self::TimeUp(_) => "time_up",
            Self::NextQuestionRequest(_) => "next_question_request",
            Self::EndGameRequest(_) => "end_game_request",
            Self::ReconnectHost(_) => "reconnect_host",
            Self::ReconnectPlayer(_) => "reconnect_player",
            Self::AutoplayStarted(_) => "autoplay_started",
        }
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::CreateGame(_) => Ok(()),
            Self::JoinGame(request) | Self::ReconnectPlayer(request) => request.validate(),
            Self::StartGame(request)
            | Self::TimeUp(request)
            | Self::NextQuestionRequest(request)
            | Self::EndGameRequest(request)
            | Self::ReconnectHost(request) => request.validate(),
            Self::ConfigureTeams(request) => request.validate(),
            Self::ConfigureAutoRemove(request) => request.validate(),
            Self::SelectTeam(request) => request.validate(),
            Self::SubmitAnswer(request) => request.validate(),
            Self::AutoplayStarted(request) => request.validate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
/// Payload of `create_game`.
pub struct CreateGameRequest {
    /// Position of the quiz in the catalog.
    #[serde(default)]
    pub quiz_id: usize,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Payload of host-only events that only name the game.
pub struct GameCodeRequest {
    #[validate(custom(function = "validate_game_code"))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Payload of `join_game` and `reconnect_player`.
pub struct PlayerNameRequest {
    #[validate(custom(function = "validate_game_code"))]
    pub code: String,
    #[validate(length(min = 1, max = 30))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Payload of `configure_teams`.
pub struct ConfigureTeamsRequest {
    #[validate(custom(function = "validate_game_code"))]
    pub code: String,
    #[serde(default, alias = "enabled")]
    pub team_mode: bool,
    #[serde(default)]
    #[validate(length(max = 16))]
    pub teams: Vec<String>,
    #[serde(default = "default_top_n", alias = "top_n")]
    #[validate(range(min = 1, max = 50))]
    pub top_n_players: usize,
}

fn default_top_n() -> usize {
    crate::state::leaderboard::DEFAULT_TOP_N
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Payload of `configure_auto_remove`.
pub struct ConfigureAutoRemoveRequest {
    #[validate(custom(function = "validate_game_code"))]
    pub code: String,
    #[serde(default)]
    pub enabled: bool,
    #[validate(range(min = 1, max = 10))]
    pub threshold: usize,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Payload of `select_team`.
pub struct SelectTeamRequest {
    #[validate(custom(function = "validate_game_code"))]
    pub code: String,
    #[validate(length(min = 1, max = 40))]
    pub team: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Payload of `submit_answer`.
pub struct SubmitAnswerRequest {
    #[validate(custom(function = "validate_game_code"))]
    pub code: String,
    #[serde(alias = "option_index")]
    #[validate(range(max = 3))]
    pub answer: usize,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Payload of `autoplay_started`.
pub struct AutoplayRequest {
    #[validate(custom(function = "validate_game_code"))]
    pub code: String,
    #[validate(range(min = 1, max = 120))]
    pub seconds: u32,
}

/// Events pushed to host and player clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Host created a session.
    GameCreated(GameCreatedPayload),
    /// Joining player is in.
    JoinedGame(JoinedGamePayload),
    /// Someone joined the roster.
    PlayerJoined(RosterChangePayload),
    /// Someone left the lobby.
    PlayerLeft(RosterChangePayload),
    /// Someone dropped during the game.
    PlayerDisconnected(RosterChangePayload),
    /// Someone came back during the game.
    PlayerReconnected(RosterChangePayload),
    /// Reply to a recovering player.
    ReconnectedPlayer(ReconnectedPlayerPayload),
    /// Reply to a recovering host.
    ReconnectedHost(HostSnapshotPayload),
    /// Recovery was refused.
    ReconnectFailed(ErrorPayload),
    /// Host dropped; the game ends unless it comes back in time.
    HostDisconnected(HostDisconnectedPayload),
    /// Host is back.
    HostReconnected,
    /// Team mode changed.
    TeamConfigUpdated(TeamConfigPayload),
    /// A player changed team.
    PlayerUpdated(PlayersPayload),
    /// Inactivity pruning changed.
    AutoRemoveConfigUpdated(AutoRemovePayload),
    /// Countdown before the first question.
    GameStarting(GameStartingPayload),
    /// Reading phase of a question.
    ShowQuestionReading(QuestionReadingPayload),
    /// Options are open.
    ShowAnswers(QuestionAnswersPayload),
    /// Answer stored.
    AnswerReceived(AnswerReceivedPayload),
    /// Answer progress for the host.
    AnswerUpdate(AnswerProgressPayload),
    /// Per-question results for the host.
    ShowResults(QuestionResultsPayload),
    /// Per-question result for one player.
    YourResult(PlayerResultPayload),
    /// Inactive players were pruned.
    InactivePlayersRemoved(InactivePlayersPayload),
    /// Host-driven auto-advance countdown.
    AutoplayCountdown(AutoplayCountdownPayload),
    /// Final leaderboard, or the reason the game stopped.
    GameEnded(GameEndedPayload),
    /// Request refused.
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Error frame carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Reconnect refusal carrying `message`.
    pub fn reconnect_failed(message: impl Into<String>) -> Self {
        Self::ReconnectFailed(ErrorPayload {
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
/// Public view of a roster entry.
pub struct PlayerSummary {
    pub name: String,
    pub score: u32,
    pub team: Option<String>,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameCreatedPayload {
    pub code: String,
    pub quiz_title: String,
    pub question_count: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinedGamePayload {
    pub code: String,
    pub quiz_title: String,
    pub team_mode: bool,
    pub teams: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Roster change naming the affected player.
pub struct RosterChangePayload {
    pub name: String,
    pub players: Vec<PlayerSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayersPayload {
    pub players: Vec<PlayerSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconnectedPlayerPayload {
    pub code: String,
    pub quiz_title: String,
    pub state: SessionPhase,
    pub team_mode: bool,
    pub teams: Vec<String>,
    pub team: Option<String>,
    pub score: u32,
    pub streak: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Everything a stateless host client needs to resume.
pub struct HostSnapshotPayload {
    pub code: String,
    pub quiz_title: String,
    pub state: SessionPhase,
    /// Zero-based index, `-1` before the first question.
    pub current_question: i64,
    pub total_questions: usize,
    pub players: Vec<PlayerSummary>,
    pub team_mode: bool,
    pub teams: Vec<String>,
    pub top_n_players: usize,
    pub auto_remove: AutoRemovePayload,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HostDisconnectedPayload {
    /// Seconds the host has to come back.
    pub grace_period: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamConfigPayload {
    pub team_mode: bool,
    pub teams: Vec<String>,
    pub top_n_players: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AutoRemovePayload {
    pub enabled: bool,
    pub threshold: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameStartingPayload {
    /// Seconds until the first question.
    pub countdown: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionReadingPayload {
    /// One-based question number.
    pub question_num: usize,
    pub total_questions: usize,
    pub question: String,
    /// Seconds before the options open.
    pub reading_time: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionAnswersPayload {
    pub question_num: usize,
    pub total_questions: usize,
    pub question: String,
    pub answers: Vec<String>,
    /// Seconds allowed to answer.
    pub time_limit: u64,
    /// Only present in the host copy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerReceivedPayload {
    pub answer: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerProgressPayload {
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResultRow {
    pub name: String,
    pub correct: bool,
    pub score_gained: u32,
    pub total_score: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionResultsPayload {
    pub correct_index: usize,
    pub correct_answer: String,
    /// Number of picks per option.
    pub answer_counts: Vec<u32>,
    /// Ranked by total score.
    pub results: Vec<ResultRow>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerResultPayload {
    pub correct: bool,
    pub correct_answer: String,
    pub score_gained: u32,
    pub total_score: u32,
    pub streak: u32,
    /// One-based rank in the overall leaderboard.
    pub rank: usize,
    pub total_players: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InactivePlayersPayload {
    pub names: Vec<String>,
    pub players: Vec<PlayerSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AutoplayCountdownPayload {
    pub seconds: u32,
    pub is_last_question: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LeaderboardRow {
    pub name: String,
    pub score: u32,
    pub team: Option<String>,
}

impl From<LeaderboardEntry> for LeaderboardRow {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            name: entry.name,
            score: entry.score,
            team: entry.team,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TeamStandingRow {
    pub team: String,
    pub score: u64,
    pub player_count: usize,
    pub top_players: Vec<LeaderboardRow>,
}

impl From<TeamStanding> for TeamStandingRow {
    fn from(standing: TeamStanding) -> Self {
        Self {
            team: standing.team,
            score: standing.score,
            player_count: standing.member_count,
            top_players: standing.top_players.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameEndedPayload {
    /// Set when the game stopped before its natural end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub leaderboard: Vec<LeaderboardRow>,
    pub team_mode: bool,
    pub team_leaderboard: Vec<TeamStandingRow>,
    pub top_n_players: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorPayload {
    pub message: String,
}
