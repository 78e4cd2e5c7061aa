use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle phases of a quiz session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Players are joining; teams and settings can change.
    Lobby,
    /// Countdown before the first question.
    Starting,
    /// Question text shown without options.
    Reading,
    /// Options shown, answers accepted.
    Question,
    /// Per-question results shown, waiting for the host.
    Results,
    /// Final leaderboard; nothing else can happen.
    Ended,
}

impl SessionPhase {
    /// Wire and storage name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::Starting => "starting",
            Self::Reading => "reading",
            Self::Question => "question",
            Self::Results => "results",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored phase name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown session phase `{0}`")]
pub struct UnknownPhase(pub String);

impl FromStr for SessionPhase {
    type Err = UnknownPhase;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "lobby" => Ok(Self::Lobby),
            "starting" => Ok(Self::Starting),
            "reading" => Ok(Self::Reading),
            "question" => Ok(Self::Question),
            "results" => Ok(Self::Results),
            "ended" => Ok(Self::Ended),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// Triggers that move a session between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Host starts the game.
    Start,
    /// Pre-game countdown finished.
    CountdownElapsed,
    /// Reading timer fired.
    ReadingElapsed,
    /// Everyone answered or the host called time.
    CloseAnswers,
    /// Host moves on and another question remains.
    NextQuestion,
    /// No question left to ask.
    QuizExhausted,
    /// Host ends the game from the results screen.
    EndEarly,
    /// Host quit, host grace expired or the session went stale.
    Terminate,
}

/// Error returned when a trigger is not allowed from the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {trigger:?} cannot be applied while in {from}")]
pub struct InvalidTransition {
    /// Phase the session was in.
    pub from: SessionPhase,
    /// Rejected trigger.
    pub trigger: Trigger,
}

/// Transition table of a quiz session.
pub fn next_phase(from: SessionPhase, trigger: Trigger) -> Result<SessionPhase, InvalidTransition> {
    use SessionPhase::*;

    let next = match (from, trigger) {
        (Lobby, Trigger::Start) => Starting,
        (Starting, Trigger::CountdownElapsed) => Reading,
        (Starting, Trigger::QuizExhausted) => Ended,
        (Reading, Trigger::ReadingElapsed) => Question,
        (Question, Trigger::CloseAnswers) => Results,
        (Results, Trigger::NextQuestion) => Reading,
        (Results, Trigger::QuizExhausted) => Ended,
        (Results, Trigger::EndEarly) => Ended,
        (from, Trigger::Terminate) if from != Ended => Ended,
        (from, trigger) => return Err(InvalidTransition { from, trigger }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(phase: &mut SessionPhase, trigger: Trigger) -> SessionPhase {
        *phase = next_phase(*phase, trigger).unwrap();
        *phase
    }

    #[test]
    fn full_happy_path_through_game() {
        let mut phase = SessionPhase::Lobby;
        assert_eq!(apply(&mut phase, Trigger::Start), SessionPhase::Starting);
        assert_eq!(apply(&mut phase, Trigger::CountdownElapsed), SessionPhase::Reading);
        assert_eq!(apply(&mut phase, Trigger::ReadingElapsed), SessionPhase::Question);
        assert_eq!(apply(&mut phase, Trigger::CloseAnswers), SessionPhase::Results);
        assert_eq!(apply(&mut phase, Trigger::NextQuestion), SessionPhase::Reading);
        assert_eq!(apply(&mut phase, Trigger::ReadingElapsed), SessionPhase::Question);
        assert_eq!(apply(&mut phase, Trigger::CloseAnswers), SessionPhase::Results);
        assert_eq!(apply(&mut phase, Trigger::QuizExhausted), SessionPhase::Ended);
    }

    #[test]
    fn end_early_only_from_results() {
        assert_eq!(
            next_phase(SessionPhase::Results, Trigger::EndEarly),
            Ok(SessionPhase::Ended)
        );
        for from in [SessionPhase::Lobby, SessionPhase::Reading, SessionPhase::Question] {
            assert!(next_phase(from, Trigger::EndEarly).is_err());
        }
    }

    #[test]
    fn terminate_reaches_ended_from_every_live_phase() {
        for from in [
            SessionPhase::Lobby,
            SessionPhase::Starting,
            SessionPhase::Reading,
            SessionPhase::Question,
            SessionPhase::Results,
        ] {
            assert_eq!(next_phase(from, Trigger::Terminate), Ok(SessionPhase::Ended));
        }
    }

    #[test]
    fn invalid_transition_returns_error() {
        let err = next_phase(SessionPhase::Lobby, Trigger::CloseAnswers).unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: SessionPhase::Lobby,
                trigger: Trigger::CloseAnswers,
            }
        );
        assert!(next_phase(SessionPhase::Ended, Trigger::Terminate).is_err());
        assert!(next_phase(SessionPhase::Question, Trigger::Start).is_err());
    }

    #[test]
    fn phase_names_round_trip_through_from_str() {
        for phase in [
            SessionPhase::Lobby,
            SessionPhase::Starting,
            SessionPhase::Reading,
            SessionPhase::Question,
            SessionPhase::Results,
            SessionPhase::Ended,
        ] {
            assert_eq!(phase.as_str().parse::<SessionPhase>(), Ok(phase));
        }
        assert!("paused".parse::<SessionPhase>().is_err());
    }
}
