//! Error taxonomy for client actions.
//!
//! Every action boundary (load, run, submit, hint, account calls) returns
//! `ClientResult`. The dispatcher turns each variant into a notification.

use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by client actions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Blocked locally before any network call (empty code, no challenge, bad form input).
    #[error("{0}")]
    Validation(String),

    /// Request failed, or the server answered with something that is not JSON.
    #[error("Network error: {0}")]
    Network(String),

    /// Backend reported a compile/syntax phase failure; no test ran.
    #[error("Compilation failed: {0}")]
    Compilation(String),

    /// Tests ran but the backend reported failure.
    #[error("Tests failed: {0}")]
    TestFailure(String),

    /// Client-side abort after the configured duration.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("No hints available")]
    NoHintsAvailable,

    /// The control that triggers this action is still busy with a previous request.
    #[error("{0} is already in progress")]
    Busy(&'static str),

    #[error("Could not persist client state: {0}")]
    Persistence(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ClientError::Validation(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        ClientError::Network(msg.into())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(ClientError::validation("Please write some code first").to_string(), "Please write some code first");
        assert_eq!(ClientError::Timeout(30).to_string(), "Request timed out after 30s");
        assert_eq!(ClientError::Busy("Submit").to_string(), "Submit is already in progress");
    }
}
