//! Application-level configuration loading: quiz source, session timing and retention.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::{
    quiz::ReadingPace,
    session::{ExpiryPolicy, SessionTiming},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_QUIZ_BACK_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// JSON file holding the quiz catalog.
    pub quiz_file: PathBuf,
    pub timing: TimingConfig,
    pub retention: RetentionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            quiz_file: PathBuf::from("quizzes.json"),
            timing: TimingConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Durations shaping every session, in seconds.
pub struct TimingConfig {
    pub countdown_secs: u64,
    pub reading_words_per_minute: u32,
    pub reading_min_secs: u64,
    pub reading_max_secs: u64,
    pub host_grace_secs: u64,
    /// Applied to catalog questions without their own limit.
    pub default_time_limit_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            reading_words_per_minute: 200,
            reading_min_secs: 3,
            reading_max_secs: 12,
            host_grace_secs: 60,
            default_time_limit_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// How long finished or abandoned games are kept, in memory and in storage.
pub struct RetentionConfig {
    pub sweep_interval_secs: u64,
    pub ended_session_secs: u64,
    pub idle_session_secs: u64,
    pub stored_game_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            ended_session_secs: 900,
            idle_session_secs: 3 * 60 * 60,
            stored_game_hours: 24,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        quiz_file = %config.quiz_file.display(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Session durations derived from [`TimingConfig`].
    pub fn session_timing(&self) -> SessionTiming {
        let timing = &self.timing;
        SessionTiming {
            countdown: Duration::from_secs(timing.countdown_secs),
            reading: ReadingPace {
                words_per_minute: timing.reading_words_per_minute,
                min: Duration::from_secs(timing.reading_min_secs),
                max: Duration::from_secs(timing.reading_max_secs),
            },
            host_grace: Duration::from_secs(timing.host_grace_secs),
        }
    }

    /// Time limit for catalog questions that do not set one.
    pub fn default_time_limit(&self) -> Duration {
        Duration::from_secs(self.timing.default_time_limit_secs.max(1))
    }

    /// Idle limits for in-memory sessions.
    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy {
            ended_after: Duration::from_secs(self.retention.ended_session_secs),
            idle_after: Duration::from_secs(self.retention.idle_session_secs),
        }
    }

    /// Delay between two stale-session sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention.sweep_interval_secs.max(1))
    }

    /// Age after which stored games are deleted.
    pub fn stored_game_retention(&self) -> Duration {
        Duration::from_secs(self.retention.stored_game_hours * 60 * 60)
    }
}

/// Determine which configuration file to load, preferring the env override.
fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let config: AppConfig =
            serde_json::from_str(r#"{"timing": {"host_grace_secs": 5}}"#).unwrap();
        assert_eq!(config.timing.host_grace_secs, 5);
        assert_eq!(config.timing.countdown_secs, 3);
        assert_eq!(config.quiz_file, PathBuf::from("quizzes.json"));
        assert_eq!(config.retention.sweep_interval_secs, 300);
    }

    #[test]
    fn session_timing_follows_config() {
        let mut config = AppConfig::default();
        config.timing.reading_min_secs = 1;
        config.timing.host_grace_secs = 30;
        let timing = config.session_timing();
        assert_eq!(timing.reading.min, Duration::from_secs(1));
        assert_eq!(timing.host_grace, Duration::from_secs(30));
        assert_eq!(timing.countdown, Duration::from_secs(3));
    }

    #[test]
    fn expiry_policy_uses_retention_section() {
        let policy = AppConfig::default().expiry_policy();
        assert_eq!(policy.ended_after, Duration::from_secs(900));
        assert_eq!(policy.idle_after, Duration::from_secs(10_800));
    }
}
