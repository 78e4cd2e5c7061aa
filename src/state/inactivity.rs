//! Detection of players who stopped answering.

use std::{
    collections::{BTreeSet, HashMap},
    ops::RangeInclusive,
};

use crate::state::identity::PlayerId;

/// Largest accepted window.
pub const MAX_WINDOW: usize = 10;

/// Auto-remove settings of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactivityConfig {
    /// Whether pruning runs after each question.
    pub enabled: bool,
    /// Number of most recent questions a player must have answered at least one of.
    pub window: usize,
}

impl Default for InactivityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: 3,
        }
    }
}

impl InactivityConfig {
    /// Whether `window` is an accepted value.
    pub fn is_valid_window(window: usize) -> bool {
        (1..=MAX_WINDOW).contains(&window)
    }

    /// Question indices to inspect once question `current` is over, if enough have elapsed.
    pub fn window_ending_at(&self, current: usize) -> Option<RangeInclusive<usize>> {
        if !self.enabled || self.window == 0 || current + 1 < self.window {
            return None;
        }
        Some(current + 1 - self.window..=current)
    }
}

/// Players among `candidates` with no answer inside the window ending at `current`.
///
/// The result is a snapshot: callers prune the roster from it afterwards.
pub fn inactive_players<'a, I>(
    config: &InactivityConfig,
    current: usize,
    candidates: I,
    history: &HashMap<PlayerId, BTreeSet<usize>>,
) -> Vec<PlayerId>
where
    I: IntoIterator<Item = &'a PlayerId>,
{
    let Some(window) = config.window_ending_at(current) else {
        return Vec::new();
    };

    candidates
        .into_iter()
        .filter(|player| {
            history
                .get(*player)
                .is_none_or(|answered| answered.range(window.clone()).next().is_none())
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(entries: &[(&str, &[usize])]) -> HashMap<PlayerId, BTreeSet<usize>> {
        entries
            .iter()
            .map(|(name, answered)| {
                (
                    PlayerId::from_name(name),
                    answered.iter().copied().collect::<BTreeSet<_>>(),
                )
            })
            .collect()
    }

    fn enabled(window: usize) -> InactivityConfig {
        InactivityConfig {
            enabled: true,
            window,
        }
    }

    #[test]
    fn player_silent_for_whole_window_is_flagged() {
        let players = [
            PlayerId::from_name("idle"),
            PlayerId::from_name("partial"),
            PlayerId::from_name("busy"),
        ];
        let history = history(&[
            ("idle", &[0, 1]),
            ("partial", &[3]),
            ("busy", &[2, 3, 4]),
        ]);

        let flagged = inactive_players(&enabled(3), 4, players.iter(), &history);
        assert_eq!(flagged, vec![PlayerId::from_name("idle")]);
    }

    #[test]
    fn player_without_history_is_flagged() {
        let players = [PlayerId::from_name("ghost")];
        let flagged = inactive_players(&enabled(1), 0, players.iter(), &HashMap::new());
        assert_eq!(flagged, players.to_vec());
    }

    #[test]
    fn nothing_flagged_before_window_fills() {
        let players = [PlayerId::from_name("ghost")];
        assert!(inactive_players(&enabled(3), 1, players.iter(), &HashMap::new()).is_empty());
        assert_eq!(enabled(3).window_ending_at(2), Some(0..=2));
    }

    #[test]
    fn disabled_monitor_flags_nobody() {
        let players = [PlayerId::from_name("ghost")];
        let config = InactivityConfig {
            enabled: false,
            window: 1,
        };
        assert!(inactive_players(&config, 5, players.iter(), &HashMap::new()).is_empty());
    }

    #[test]
    fn window_bounds() {
        assert!(!InactivityConfig::is_valid_window(0));
        assert!(InactivityConfig::is_valid_window(1));
        assert!(InactivityConfig::is_valid_window(10));
        assert!(!InactivityConfig::is_valid_window(11));
    }
}
