use crate::domain::DomainError;
use crate::service::SessionError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that end a fetch. None of them carry a partial table.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] DomainError),

    /// Transport could not be reached; the vendor process is likely down or logged out.
    #[error("cannot reach data service at {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// Transport is up but the service refused to open (capability or licensing).
    #[error("service '{service}' unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    /// Well-formed completion with zero records, when the caller opted in.
    #[error("request completed without any data")]
    EmptyResult,

    #[error("no complete response within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("session ended before the response completed: {0}")]
    SessionTerminated(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl FetchError {
    /// Whether the fix lies in the environment (terminal running, logged in,
    /// entitled) rather than in the request parameters.
    pub fn needs_environment_fix(&self) -> bool {
        matches!(
            self,
            FetchError::Connection { .. } | FetchError::ServiceUnavailable { .. }
        )
    }

    /// Map an error raised after the service was opened.
    pub(crate) fn from_stream(err: SessionError) -> Self {
        match err {
            SessionError::Protocol(e) => FetchError::Protocol(e.to_string()),
            SessionError::Connect { endpoint, reason } => {
                FetchError::Connection { endpoint, reason }
            }
            SessionError::ServiceOpen { service, reason } => {
                FetchError::ServiceUnavailable { service, reason }
            }
            SessionError::Io(e) => FetchError::SessionTerminated(e.to_string()),
            SessionError::Closed => FetchError::SessionTerminated("connection closed".into()),
            SessionError::Lost(reason) => FetchError::SessionTerminated(reason),
        }
    }
}

/// A message or row that could not be read. Skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed response ({location}): {reason}")]
pub struct MalformedResponse {
    pub location: Location,
    pub reason: String,
}

/// Where in the response stream a problem was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub security: Option<String>,
    pub row: Option<usize>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.security, self.row) {
            (Some(sec), Some(row)) => write!(f, "{sec}, row {row}"),
            (Some(sec), None) => write!(f, "{sec}"),
            (None, Some(row)) => write!(f, "row {row}"),
            (None, None) => write!(f, "message"),
        }
    }
}

/// The service rejected a whole security (unknown identifier, no entitlement).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityError {
    pub security: String,
    pub category: String,
    pub message: String,
}

/// The service rejected one field for one security (invalid mnemonic and the like).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldException {
    pub security: String,
    pub field: String,
    pub message: String,
}
