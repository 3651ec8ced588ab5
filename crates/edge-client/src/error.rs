//! Error types for edge client operations

use thiserror::Error;

use crate::commands::BuildError;
use crate::config::ConfigError;

/// Result type alias for edge client operations
pub type Result<T> = std::result::Result<T, EdgeClientError>;

/// Errors that can occur during edge client operations
#[derive(Error, Debug)]
pub enum EdgeClientError {
    /// Every attempt failed at the network level
    #[error("Service unavailable after {attempts} attempts")]
    ServiceUnavailable { attempts: u32 },

    /// The server answered with an empty body
    #[error("Received empty response from API")]
    EmptyResponse,

    /// The server answered with a body that does not follow the batch protocol
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Invalid endpoint URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected a command
    #[error("Command {command} rejected (error codes: {error_codes:?})")]
    RemoteRejected {
        command: String,
        error_codes: Vec<i64>,
    },

    /// Credentials or one-time code were refused
    #[error("Authentication failed (error codes: {error_codes:?})")]
    AuthenticationFailed { error_codes: Vec<i64> },

    /// An MFA code was submitted while no challenge is pending
    #[error("MFA not required")]
    MfaNotRequired,

    /// The backend asked for MFA while an MFA code was being submitted
    #[error("Unexpected authentication state")]
    UnexpectedAuthState,

    /// The operation requires an authenticated session
    #[error("User not authenticated")]
    NotAuthenticated,

    /// Caller supplied arguments that violate an operation precondition
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EdgeClientError {
    /// Create a remote rejection error for a command
    pub fn rejected(command: impl Into<String>, error_codes: Vec<i64>) -> Self {
        Self::RemoteRejected {
            command: command.into(),
            error_codes,
        }
    }

    /// Transient network failure that exhausted its retries
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }

    /// The server answered, but not with a usable batch response
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::EmptyResponse | Self::MalformedResponse(_))
    }

    /// Rejected before any network call was made
    pub fn is_caller_misuse(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

impl From<BuildError> for EdgeClientError {
    fn from(err: BuildError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_predicates() {
        assert!(EdgeClientError::ServiceUnavailable { attempts: 3 }.is_transient());
        assert!(EdgeClientError::EmptyResponse.is_protocol());
        assert!(EdgeClientError::MalformedResponse("x".into()).is_protocol());
        assert!(!EdgeClientError::EmptyResponse.is_transient());

        let misuse: EdgeClientError = BuildError::LengthMismatch {
            identifiers: 2,
            values: 1,
        }
        .into();
        assert!(misuse.is_caller_misuse());
    }

    #[test]
    fn test_rejected_message() {
        let err = EdgeClientError::rejected("thing.create", vec![-90008]);
        assert_eq!(
            err.to_string(),
            "Command thing.create rejected (error codes: [-90008])"
        );
    }
}
