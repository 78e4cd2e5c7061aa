//! Quiz catalog loaded once at startup from a JSON file.

use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::state::quiz::{Question, Quiz, QuizError};

/// Read-only list of playable quizzes. A quiz is addressed by its position.
#[derive(Debug, Clone, Default)]
pub struct QuizCatalog {
    quizzes: Vec<Arc<Quiz>>,
}

#[derive(Debug, Deserialize)]
struct RawQuiz {
    title: String,
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(alias = "prompt")]
    question: String,
    #[serde(alias = "options")]
    answers: Vec<String>,
    #[serde(alias = "correct_index")]
    correct: usize,
    /// Seconds; the catalog default applies when absent.
    #[serde(default)]
    time_limit: Option<u64>,
}

impl RawQuiz {
    fn into_quiz(self, default_time_limit: Duration) -> Result<Quiz, QuizError> {
        let questions = self
            .questions
            .into_iter()
            .map(|raw| {
                let time_limit = raw
                    .time_limit
                    .filter(|secs| *secs > 0)
                    .map_or(default_time_limit, Duration::from_secs);
                Question::new(raw.question, raw.answers, raw.correct, time_limit)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Quiz::new(self.title, questions)
    }
}

impl QuizCatalog {
    /// Catalog holding `quizzes` in order.
    pub fn new(quizzes: Vec<Quiz>) -> Self {
        Self {
            quizzes: quizzes.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load the catalog from `path`. A missing or unreadable file yields an empty catalog.
    pub fn load(path: &Path, default_time_limit: Duration) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_json(&contents, default_time_limit) {
                Ok(catalog) => {
                    info!(
                        path = %path.display(),
                        count = catalog.len(),
                        "loaded quiz catalog"
                    );
                    catalog
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse quiz catalog; starting without quizzes"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "quiz catalog not found; starting without quizzes"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read quiz catalog; starting without quizzes"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON array of quizzes, skipping entries that are not playable.
    pub fn from_json(raw: &str, default_time_limit: Duration) -> serde_json::Result<Self> {
        let entries: Vec<Value> = serde_json::from_str(raw)?;
        let mut quizzes = Vec::with_capacity(entries.len());
        for (position, entry) in entries.into_iter().enumerate() {
            let parsed = serde_json::from_value::<RawQuiz>(entry)
                .map_err(|err| err.to_string())
                .and_then(|raw| {
                    raw.into_quiz(default_time_limit)
                        .map_err(|err| err.to_string())
                });
            match parsed {
                Ok(quiz) => quizzes.push(Arc::new(quiz)),
                Err(error) => warn!(position, %error, "skipping invalid quiz"),
            }
        }
        Ok(Self { quizzes })
    }

    /// Quiz at catalog position `id`.
    pub fn get(&self, id: usize) -> Option<Arc<Quiz>> {
        self.quizzes.get(id).cloned()
    }

    /// Quizzes with their catalog positions.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Quiz)> {
        self.quizzes.iter().map(|quiz| &**quiz).enumerate()
    }

    pub fn len(&self) -> usize {
        self.quizzes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quizzes.is_empty()
    }
}
