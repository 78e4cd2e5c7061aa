//! Overall and per-team rankings.

use std::collections::HashSet;

/// Top-N players counted towards a team score when nothing else is configured.
pub const DEFAULT_TOP_N: usize = 3;

/// Team mode settings of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamConfig {
    /// Whether players pick teams and team standings are reported.
    pub enabled: bool,
    /// Team names in display order.
    pub teams: Vec<String>,
    /// Number of best players whose scores make up a team score.
    pub top_n: usize,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            teams: Vec::new(),
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl TeamConfig {
    /// Whether `team` is one of the configured names.
    pub fn has_team(&self, team: &str) -> bool {
        self.teams.iter().any(|known| known == team)
    }

    /// Trim names, drop blanks and case-insensitive duplicates, keep first spelling and order.
    pub fn normalize_names<I>(names: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        names
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty() && seen.insert(name.to_lowercase()))
            .collect()
    }
}

/// One row of the overall leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    /// Display name.
    pub name: String,
    /// Total score.
    pub score: u32,
    /// Team, when one was picked.
    pub team: Option<String>,
}

/// Aggregated standing of one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamStanding {
    /// Team name.
    pub team: String,
    /// Sum of the top-N member scores.
    pub score: u64,
    /// Every member, not just the top-N.
    pub member_count: usize,
    /// Members counted towards the score, best first.
    pub top_players: Vec<LeaderboardEntry>,
}

/// Sort by score, highest first. `entries` must be in join order: ties keep it.
pub fn rank(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
}

/// Per-team standings built from an already ranked leaderboard.
///
/// Returns nothing when team mode is off. Players without a team are skipped.
pub fn team_standings(ranked: &[LeaderboardEntry], config: &TeamConfig) -> Vec<TeamStanding> {
    if !config.enabled {
        return Vec::new();
    }

    let mut standings: Vec<TeamStanding> = config
        .teams
        .iter()
        .map(|team| {
            let members: Vec<&LeaderboardEntry> = ranked
                .iter()
                .filter(|entry| entry.team.as_deref() == Some(team.as_str()))
                .collect();
            let top_players: Vec<LeaderboardEntry> = members
                .iter()
                .take(config.top_n)
                .map(|entry| (*entry).clone())
                .collect();
            TeamStanding {
                team: team.clone(),
                score: top_players.iter().map(|entry| u64::from(entry.score)).sum(),
                member_count: members.len(),
                top_players,
            }
        })
        .collect();

    standings.sort_by(|a, b| b.score.cmp(&a.score));
    standings
}
