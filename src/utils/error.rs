use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Browser driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Element blocked: {selector}")]
    ElementBlocked { selector: String },

    #[error("Page no longer matches expectations: {0}")]
    NavigationStale(String),

    #[error("Timed out waiting for: {0}")]
    Timeout(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Session not ready: {0}")]
    SessionNotReady(String),

    #[error("Automation already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Recoverable errors are caught at the per-contact boundary; the
    /// polling loop continues. Everything else propagates to the worker.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::ElementNotFound { .. }
                | AppError::ElementBlocked { .. }
                | AppError::NavigationStale(_)
                | AppError::Timeout(_)
        )
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
