//! Error types for the Turnstile admission core.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// Capacity exhaustion is not an error: a full limiter simply answers
/// [`Decision::Reject`](crate::gate::Decision::Reject).
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Invalid limiter, registry or file configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller identity was missing or could not be parsed
    #[error("Identity error: {0}")]
    Identity(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TurnstileError {
    /// HTTP status a transport layer should answer with for this error.
    pub fn status_code(&self) -> u16 {
        500
    }

    /// Whether this error came from identity extraction rather than setup.
    pub fn is_identity(&self) -> bool {
        matches!(self, TurnstileError::Identity(_))
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_error_maps_to_server_fault() {
        let err = TurnstileError::Identity("bad peer".to_string());
        assert!(err.is_identity());
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Identity error: bad peer");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TurnstileError = io.into();
        assert!(!err.is_identity());
        assert!(matches!(err, TurnstileError::Io(_)));
    }
}
