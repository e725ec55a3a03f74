use thiserror::Error;

/// Central error type for the progress engine
#[derive(Error, Debug)]
pub enum ProgressError {
    // ============================================================================
    // Catalog Errors
    // ============================================================================
    #[error("Invalid stage catalog: {0}")]
    InvalidCatalog(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Builder pattern validation error
    #[error("Builder error: {0}")]
    BuilderError(String),

    // ============================================================================
    // Status Transport Errors
    // ============================================================================
    #[error("Network error: {0}")]
    Network(String),

    #[error("Status endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Failed to decode status report: {0}")]
    Decode(String),

    #[error("Status request timed out after {0} ms")]
    Timeout(u64),

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mutex lock error")]
    LockError,

    #[error("Internal error: {0}")]
    Internal(String),
}

// Implement conversion from PoisonError for Mutex locks
impl<T> From<std::sync::PoisonError<T>> for ProgressError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ProgressError::LockError
    }
}

impl From<reqwest::Error> for ProgressError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProgressError::Decode(err.to_string())
        } else {
            ProgressError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for ProgressError {
    fn from(err: url::ParseError) -> Self {
        ProgressError::InvalidConfig(format!("Invalid status URL: {}", err))
    }
}

impl ProgressError {
    /// Whether the error is a transport hiccup that the next poll may recover from
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProgressError::Network(_)
                | ProgressError::HttpStatus { .. }
                | ProgressError::Decode(_)
                | ProgressError::Timeout(_)
        )
    }
}

// Helper type alias for Results
pub type ProgressResult<T> = Result<T, ProgressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProgressError::UnknownStage("labeler".to_string());
        assert_eq!(err.to_string(), "Unknown stage: labeler");
    }

    #[test]
    fn test_http_status_display() {
        let err = ProgressError::HttpStatus {
            status: 404,
            body: "Task not found".to_string(),
        };
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("Task not found"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ProgressError = io_err.into();
        assert!(matches!(err, ProgressError::Io(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProgressError::Network("reset".to_string()).is_transient());
        assert!(ProgressError::HttpStatus {
            status: 500,
            body: String::new()
        }
        .is_transient());
        assert!(ProgressError::Timeout(2000).is_transient());
        assert!(!ProgressError::InvalidCatalog("empty".to_string()).is_transient());
        assert!(!ProgressError::LockError.is_transient());
    }
}
