use thiserror::Error;

use browserbase_client::BrowserError;
use budwatch_common::ErrorKind;

pub type Result<T> = std::result::Result<T, ScrapeError>;

/// A location-level extraction failure. The Display form is
/// `"{kind}: {message}"`, which ingestion parses back into a dead-letter
/// error type.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ScrapeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ScrapeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Blocked, reason)
    }

    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }
}

impl From<BrowserError> for ScrapeError {
    fn from(err: BrowserError) -> Self {
        let kind = match &err {
            BrowserError::Unavailable(_) | BrowserError::Api { .. } | BrowserError::Channel(_) => {
                ErrorKind::BrowserUnavailable
            }
            BrowserError::Navigation(_) => ErrorKind::NavigationFailed,
            BrowserError::Evaluation(_) => ErrorKind::EvaluationFailed,
            BrowserError::Timeout { .. } => ErrorKind::Timeout,
        };
        Self::new(kind, err.to_string())
    }
}
