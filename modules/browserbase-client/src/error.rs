use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Browser unavailable: {0}")]
    Unavailable(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Timed out after {}ms waiting for {what}", timeout.as_millis())]
    Timeout { what: String, timeout: Duration },

    #[error("Control channel error: {0}")]
    Channel(String),
}

impl BrowserError {
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout,
        }
    }
}

impl From<reqwest::Error> for BrowserError {
    fn from(err: reqwest::Error) -> Self {
        BrowserError::Unavailable(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BrowserError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BrowserError::Channel(err.to_string())
    }
}
