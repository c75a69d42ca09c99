//! Error types for the relay.

use thiserror::Error;

/// Errors that can occur while resolving, transforming or diffing calendars.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("filter type '{0}' doesn't exist")]
    UnknownFilter(String),

    #[error("action type '{0}' doesn't exist")]
    UnknownAction(String),

    #[error("missing mandatory parameter '{0}'")]
    MissingParameter(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("profile '{0}' doesn't exist")]
    ProfileNotFound(String),

    #[error("notifier '{0}' doesn't exist")]
    NotifierNotFound(String),

    #[error("unknown source type '{0}'")]
    UnsupportedSource(String),

    #[error("cyclic source reference: {0}")]
    CyclicSource(String),

    #[error("Fetch error for {source_url}: {reason}")]
    Fetch { source_url: String, reason: String },

    #[error("HTTP error for {source_url}: {status}")]
    HttpStatus { source_url: String, status: u16 },

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RelayError {
    pub(crate) fn invalid_param(name: &str, reason: impl ToString) -> Self {
        RelayError::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error was caused by caller-supplied configuration
    /// (a bad rule or parameter) rather than by I/O or upstream data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RelayError::Config(_)
                | RelayError::InvalidRule(_)
                | RelayError::UnknownFilter(_)
                | RelayError::UnknownAction(_)
                | RelayError::MissingParameter(_)
                | RelayError::InvalidParameter { .. }
                | RelayError::UnsupportedSource(_)
                | RelayError::CyclicSource(_)
        )
    }
}

/// Result type alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
