//! Error types for clipwatch.

use thiserror::Error;

/// Common error type for clipwatch.
#[derive(Error, Debug)]
pub enum ClipwatchError {
    /// Database error.
    ///
    /// Errors from sqlx are automatically converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for configuration or request input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Upstream (Twitch) API error.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Downstream webhook error.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// The operation was cancelled by a shutdown signal.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<sqlx::Error> for ClipwatchError {
    fn from(e: sqlx::Error) -> Self {
        ClipwatchError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for ClipwatchError {
    fn from(e: reqwest::Error) -> Self {
        ClipwatchError::Upstream(e.to_string())
    }
}

/// Result type alias for clipwatch operations.
pub type Result<T> = std::result::Result<T, ClipwatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_display() {
        let err = ClipwatchError::Upstream("HTTP 503".to_string());
        assert_eq!(err.to_string(), "upstream error: HTTP 503");
    }

    #[test]
    fn test_not_found_error_display() {
        let err = ClipwatchError::NotFound("broadcaster somebody".to_string());
        assert_eq!(err.to_string(), "broadcaster somebody not found");
    }

    #[test]
    fn test_cancelled_display() {
        assert_eq!(ClipwatchError::Cancelled.to_string(), "operation cancelled");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClipwatchError = io_err.into();
        assert!(matches!(err, ClipwatchError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let err: ClipwatchError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ClipwatchError::Database(_)));
    }
}
