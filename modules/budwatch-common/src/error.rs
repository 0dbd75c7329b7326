use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire- and log-level error kinds. These names appear in scrape job rows,
/// dead letter entries, and operator summaries, so they are stable strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BrowserUnavailable,
    NavigationFailed,
    Blocked,
    EvaluationFailed,
    RateLimit,
    Timeout,
    ParseFailed,
    ValidationFailed,
    PersistFailed,
    WebhookFailed,
    Exhausted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::BrowserUnavailable => write!(f, "browser_unavailable"),
            ErrorKind::NavigationFailed => write!(f, "navigation_failed"),
            ErrorKind::Blocked => write!(f, "blocked"),
            ErrorKind::EvaluationFailed => write!(f, "evaluation_failed"),
            ErrorKind::RateLimit => write!(f, "rate_limit"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::ParseFailed => write!(f, "parse_failed"),
            ErrorKind::ValidationFailed => write!(f, "validation_failed"),
            ErrorKind::PersistFailed => write!(f, "persist_failed"),
            ErrorKind::WebhookFailed => write!(f, "webhook_failed"),
            ErrorKind::Exhausted => write!(f, "exhausted"),
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "browser_unavailable" => Ok(Self::BrowserUnavailable),
            "navigation_failed" => Ok(Self::NavigationFailed),
            "blocked" => Ok(Self::Blocked),
            "evaluation_failed" => Ok(Self::EvaluationFailed),
            "rate_limit" => Ok(Self::RateLimit),
            "timeout" => Ok(Self::Timeout),
            "parse_failed" => Ok(Self::ParseFailed),
            "validation_failed" => Ok(Self::ValidationFailed),
            "persist_failed" => Ok(Self::PersistFailed),
            "webhook_failed" => Ok(Self::WebhookFailed),
            "exhausted" => Ok(Self::Exhausted),
            other => Err(format!("unknown ErrorKind: {other}")),
        }
    }
}

#[derive(Error, Debug)]
pub enum BudwatchError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Scrape error ({kind}): {message}")]
    Scrape { kind: ErrorKind, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl BudwatchError {
    pub fn scrape(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Scrape {
            kind,
            message: message.into(),
        }
    }

    /// The wire-level kind for this error, when one applies.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Scrape { kind, .. } => Some(*kind),
            Self::Database(_) => Some(ErrorKind::PersistFailed),
            Self::Validation(_) => Some(ErrorKind::ValidationFailed),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BudwatchError {
    fn from(err: reqwest::Error) -> Self {
        BudwatchError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn error_kind_round_trips_through_strings() {
        for kind in [
            ErrorKind::BrowserUnavailable,
            ErrorKind::Blocked,
            ErrorKind::RateLimit,
            ErrorKind::Exhausted,
        ] {
            assert_eq!(ErrorKind::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn scrape_error_exposes_kind() {
        let err = BudwatchError::scrape(ErrorKind::Blocked, "cf-turnstile challenge");
        assert_eq!(err.kind(), Some(ErrorKind::Blocked));
        assert!(err.to_string().contains("blocked"));
    }
}
