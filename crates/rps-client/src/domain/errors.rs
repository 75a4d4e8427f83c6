//! # Domain Errors
//!
//! Error types for the remote store, the component boundary and configuration.

use thiserror::Error;

/// PostgREST code returned by `single()` when no row matches.
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Postgres unique-violation SQLSTATE.
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Failures reported by (or while talking to) the remote store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// Credential or session failure; message is the remote text verbatim.
    #[error("{0}")]
    Auth(String),

    /// Table API error with optional PostgREST / SQLSTATE code.
    #[error("{message}")]
    Api {
        /// PostgREST or SQLSTATE code.
        code: Option<String>,
        /// Remote message.
        message: String,
        /// HTTP status (0 when not transported over HTTP).
        status: u16,
    },

    /// Transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Response could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Push channel failure.
    #[error("Realtime channel error: {0}")]
    Realtime(String),

    /// Operation needs a signed-in session at the remote store.
    #[error("Not authenticated")]
    Unauthenticated,
}

impl StoreError {
    /// API error with a code and message.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Api {
            code: Some(code.into()),
            message: message.into(),
            status: 0,
        }
    }

    /// The PostgREST/SQLSTATE code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// "No row found" from a `single()` select. An expected branch, not a failure.
    pub fn is_no_rows(&self) -> bool {
        self.code() == Some(NO_ROWS_CODE)
    }

    /// Insert rejected because the row already exists.
    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(UNIQUE_VIOLATION_CODE)
    }
}

/// Invalid domain input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    /// Unknown move name.
    #[error("Invalid choice: {0}")]
    InvalidChoice(String),

    /// Unknown leaderboard mode.
    #[error("Invalid leaderboard mode: {0}")]
    InvalidMode(String),

    /// Recorded outcome disagrees with the moves.
    #[error("Outcome {recorded} does not match {player} vs {computer}")]
    OutcomeMismatch {
        /// Player move.
        player: String,
        /// Computer move.
        computer: String,
        /// Outcome that was supplied.
        recorded: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Base URL and/or public key absent in a production deployment.
    #[error("Remote store credentials missing: url={url_set}, anon_key={key_set}")]
    MissingCredentials {
        /// Whether the URL was set.
        url_set: bool,
        /// Whether the key was set.
        key_set: bool,
    },
}

/// Error surfaced to the view layer by every public operation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    /// Remote call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Gameplay attempted without a session.
    #[error("Sign in to play")]
    NotSignedIn,

    /// Invalid input.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Misconfiguration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Tagged result returned by every client operation.
pub type ActionResult<T = ()> = Result<T, ClientError>;
