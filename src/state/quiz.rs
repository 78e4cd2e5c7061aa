//! Immutable quiz content and reading-phase pacing.

use std::time::Duration;

use thiserror::Error;

/// Number of answer options every question carries.
pub const OPTION_COUNT: usize = 4;

/// A quiz as played by a session. Never mutated once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    /// Title shown to host and players.
    pub title: String,
    /// Questions in play order.
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Build a quiz, refusing one without questions.
    pub fn new(title: String, questions: Vec<Question>) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::NoQuestions(title));
        }
        Ok(Self { title, questions })
    }

    /// Question at `index`, if the quiz has that many.
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Whether the quiz has no question at all.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Why question data was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizError {
    /// A quiz needs at least one question.
    #[error("quiz `{0}` has no questions")]
    NoQuestions(String),
    /// Options must be exactly [`OPTION_COUNT`].
    #[error("question `{prompt}` has {got} options, expected {OPTION_COUNT}")]
    OptionCount {
        /// Offending question.
        prompt: String,
        /// Number of options found.
        got: usize,
    },
    /// Correct index points past the options.
    #[error("question `{prompt}` marks option {index} as correct")]
    CorrectIndex {
        /// Offending question.
        prompt: String,
        /// Index found.
        index: usize,
    },
}

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    /// Question text.
    pub prompt: String,
    /// Answer options, displayed in order.
    pub options: [String; OPTION_COUNT],
    /// Index of the correct option.
    pub correct_index: usize,
    /// Time allowed to answer.
    pub time_limit: Duration,
}

impl Question {
    /// Build a question, checking option count and correct index.
    pub fn new(
        prompt: String,
        options: Vec<String>,
        correct_index: usize,
        time_limit: Duration,
    ) -> Result<Self, QuizError> {
        let got = options.len();
        let options: [String; OPTION_COUNT] = options
            .try_into()
            .map_err(|_| QuizError::OptionCount {
                prompt: prompt.clone(),
                got,
            })?;
        if correct_index >= OPTION_COUNT {
            return Err(QuizError::CorrectIndex {
                prompt,
                index: correct_index,
            });
        }
        Ok(Self {
            prompt,
            options,
            correct_index,
            time_limit,
        })
    }

    /// Text of the correct option.
    pub fn correct_answer(&self) -> &str {
        &self.options[self.correct_index]
    }
}

/// Turns question length into a reading duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingPace {
    /// Assumed reading speed.
    pub words_per_minute: u32,
    /// Shortest reading phase.
    pub min: Duration,
    /// Longest reading phase.
    pub max: Duration,
}

impl Default for ReadingPace {
    fn default() -> Self {
        Self {
            words_per_minute: 200,
            min: Duration::from_secs(3),
            max: Duration::from_secs(12),
        }
    }
}

impl ReadingPace {
    /// Reading time for `prompt`, clamped to `[min, max]`.
    pub fn duration_for(&self, prompt: &str) -> Duration {
        let words = prompt.split_whitespace().count() as f64;
        let wpm = f64::from(self.words_per_minute.max(1));
        Duration::from_secs_f64(words / wpm * 60.0).clamp(self.min, self.max.max(self.min))
    }
}
