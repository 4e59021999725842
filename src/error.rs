// Error types shared by the session manager and every provider

use thiserror::Error;

/// Errors surfaced by session providers, stores and the manager
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad provider name, malformed config or backend connect failure
    #[error("Configuration error: {0}")]
    Config(String),

    /// The inbound request carried a malformed session identifier
    #[error("Transport error: {0}")]
    Transport(String),

    /// No record exists for the given session id
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The session id cannot be used by this backend
    #[error("Invalid session id: {0}")]
    InvalidId(String),

    /// Record payload could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// I/O or connection failure inside a backend
    #[error("Backend error: {0}")]
    Backend(String),

    /// The system random source could not fill an identifier
    #[error("Random source failure: {0}")]
    Entropy(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    pub(crate) fn poisoned<E: std::fmt::Display>(e: E) -> Self {
        SessionError::Backend(format!("Lock poisoned: {}", e))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Codec(e.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Backend(format!("I/O error: {}", e))
    }
}

impl From<redis::RedisError> for SessionError {
    fn from(e: redis::RedisError) -> Self {
        SessionError::Backend(format!("Redis error: {}", e))
    }
}

impl From<sqlx::Error> for SessionError {
    fn from(e: sqlx::Error) -> Self {
        SessionError::Backend(format!("Database error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = SessionError::NotFound("abc".to_string());
        assert_eq!(err.to_string(), "Session not found: abc");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_json_error_maps_to_codec() {
        let json_err = serde_json::from_slice::<serde_json::Value>(b"{oops").unwrap_err();
        let err: SessionError = json_err.into();
        assert!(matches!(err, SessionError::Codec(_)));
    }
}
