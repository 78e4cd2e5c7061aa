use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "live_quiz";

/// Runtime configuration describing how to connect to CouchDB.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CouchConfig {
    /// Configuration for `database` on the server at `base_url`.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Attach basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` (defaults to `live_quiz`) and the optional
    /// `COUCH_USERNAME` / `COUCH_PASSWORD` pair.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = std::env::var("COUCH_BASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .ok_or(CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL",
            })?;
        let database = std::env::var("COUCH_DB")
            .ok()
            .filter(|db| !db.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let config = Self::new(base_url, database);
        Ok(
            match (
                std::env::var("COUCH_USERNAME").ok(),
                std::env::var("COUCH_PASSWORD").ok(),
            ) {
                (Some(username), Some(password)) => config.with_credentials(username, password),
                _ => config,
            },
        )
    }
}
