//! Error types for routing and provider calls

use serde::Serialize;
use thiserror::Error;

/// Errors raised by [`Router::route`](crate::Router::route) before any
/// envelope can be produced.
///
/// Provider failures are never surfaced here: they are retried, then
/// handled by the fallback chain, and finally reported inside a
/// [`ResponseEnvelope::Error`](crate::ResponseEnvelope::Error).
#[derive(Debug, Error)]
pub enum RouterError {
    /// Empty conversation or a last message without any text
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Input exceeds the configured character limit
    #[error("prompt too long: {length} characters exceeds the limit of {limit}")]
    PromptTooLong { length: usize, limit: usize },

    /// The caller's cancellation token fired mid-request
    #[error("request cancelled")]
    Cancelled,
}

/// Diagnostic classification of a failed provider call.
///
/// Purely informational: every kind is retried the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    RateLimited,
    Network,
    Other,
    Cancelled,
}

impl ErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            _ => Self::Other,
        }
    }

    /// Classify a transport-level error from reqwest
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            return Self::Network;
        }
        match err.status() {
            Some(status) => Self::from_status(status.as_u16()),
            None if err.is_request() => Self::Network,
            None => Self::Other,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::NotFound => write!(f, "not found"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Network => write!(f, "network error"),
            Self::Other => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A failed call to one provider backend
#[derive(Debug, Clone, Error)]
#[error("{provider} {kind}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ErrorKind,
    /// HTTP status, when the provider answered at all
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Build from a non-success HTTP response
    pub fn from_status(provider: impl Into<String>, status: u16, body: &str) -> Self {
        Self {
            provider: provider.into(),
            kind: ErrorKind::from_status(status),
            status: Some(status),
            message: format!("API error: {status}: {}", truncate(body, 500)),
        }
    }

    /// Build from a reqwest transport error. The URL is stripped from the
    /// message since it can carry credentials.
    pub fn from_reqwest(provider: impl Into<String>, err: reqwest::Error) -> Self {
        let kind = ErrorKind::from_reqwest(&err);
        let status = err.status().map(|s| s.as_u16());
        Self {
            provider: provider.into(),
            kind,
            status,
            message: err.without_url().to_string(),
        }
    }

    pub fn cancelled(provider: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Cancelled, "request cancelled")
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_status() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::Other);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Other);
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::from_status("gemini", 429, "quota exceeded");
        assert_eq!(err.status, Some(429));
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(
            err.to_string(),
            "gemini rate limited: API error: 429: quota exceeded"
        );
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(2000);
        let err = ProviderError::from_status("openrouter", 500, &body);
        assert!(err.message.len() < 600);
    }

    #[test]
    fn test_router_error_messages() {
        let err = RouterError::PromptTooLong {
            length: 7000,
            limit: 6000,
        };
        assert_eq!(
            err.to_string(),
            "prompt too long: 7000 characters exceeds the limit of 6000"
        );
        assert_eq!(RouterError::Cancelled.to_string(), "request cancelled");
    }

    #[test]
    fn test_cancelled_kind() {
        let err = ProviderError::cancelled("gemini");
        assert!(err.is_cancelled());
        assert_eq!(err.kind.to_string(), "cancelled");
    }
}
