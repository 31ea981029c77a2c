//! Application-wide error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FunnelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Email delivery rejected ({status}): {text}")]
    EmailRejected { status: u16, text: String },

    #[error("Conversions API rejected ({status}): {body}")]
    ConversionsRejected { status: u16, body: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl FunnelError {
    /// HTTP status reported by the remote side, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::EmailRejected { status, .. } | Self::ConversionsRejected { status, .. } => {
                Some(*status)
            }
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Diagnostic body text returned by the remote side, when there is one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::EmailRejected { text, .. } => Some(text),
            Self::ConversionsRejected { body, .. } => Some(body),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FunnelError>;
