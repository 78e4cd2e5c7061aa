//! Per-question scoring: speed-weighted base points plus a capped streak bonus.

use std::time::Duration;

/// Points awarded for any correct answer, regardless of speed.
pub const BASE_POINTS: u32 = 500;
/// Upper bound of the speed bonus, earned by answering instantly.
pub const MAX_SPEED_BONUS: u32 = 500;
/// Streak bonus awarded per consecutive correct answer.
pub const STREAK_STEP: u32 = 50;
/// Cap applied to the streak bonus.
pub const STREAK_CAP: u32 = 200;

/// Result of scoring one player for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// Points added to the running total.
    pub points: u32,
    /// Streak after this question.
    pub streak: u32,
}

/// Score a single answer.
///
/// `answer` is `None` when the player did not answer, otherwise the time it took them.
/// Wrong or missing answers reset the streak and award nothing.
pub fn score_answer(
    correct: bool,
    answer: Option<Duration>,
    time_limit: Duration,
    streak: u32,
) -> ScoreOutcome {
    let Some(elapsed) = answer.filter(|_| correct) else {
        return ScoreOutcome {
            points: 0,
            streak: 0,
        };
    };

    let streak = streak.saturating_add(1);
    let points = BASE_POINTS + speed_bonus(elapsed, time_limit) + streak_bonus(streak);
    ScoreOutcome { points, streak }
}

/// Fraction of the speed bonus still available after `elapsed`, rounded to whole points.
fn speed_bonus(elapsed: Duration, time_limit: Duration) -> u32 {
    if time_limit.is_zero() {
        return 0;
    }
    let fraction = (1.0 - elapsed.as_secs_f64() / time_limit.as_secs_f64()).max(0.0);
    (f64::from(MAX_SPEED_BONUS) * fraction).round() as u32
}

/// Extra points for a streak of `streak` consecutive correct answers (this one included).
pub fn streak_bonus(streak: u32) -> u32 {
    if streak <= 1 {
        0
    } else {
        streak.saturating_mul(STREAK_STEP).min(STREAK_CAP)
    }
}
