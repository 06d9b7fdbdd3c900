//! Crate-level error types for the publisher loop

use thiserror::Error;

/// Main error type for publisher operations
#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Transport error: {0}")]
    Transport(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("Startup failed: {message}")]
    Startup { message: String },
}

impl PublisherError {
    /// Wrap a messaging-service error
    pub fn transport<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Transport(Box::new(error))
    }

    /// Create a startup error
    pub fn startup<S: Into<String>>(message: S) -> Self {
        Self::Startup {
            message: message.into(),
        }
    }
}

/// Result type for publisher operations
pub type PublisherResult<T> = Result<T, PublisherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_error_display() {
        let error = PublisherError::startup("publisher not ready");
        assert_eq!(error.to_string(), "Startup failed: publisher not ready");
    }

    #[test]
    fn test_transport_error_wraps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = PublisherError::transport(io);
        assert!(matches!(error, PublisherError::Transport(_)));
        assert!(error.to_string().contains("refused"));
    }
}
