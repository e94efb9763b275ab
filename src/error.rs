//! Error types for the session orchestration engine
//!
//! Every internal failure is converted into one of these kinds before it
//! crosses into the orchestrator; the render layer never sees a raw error.

use thiserror::Error;

/// Session engine errors
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// Worker channel transport error (send failure, dropped response, timeout)
    #[error("Worker channel error: {0}")]
    Channel(String),

    /// Worker response did not match the expected envelope shape
    #[error("Invalid response format")]
    InvalidResponse,

    /// On-device AI is not available for this session
    #[error("AI capabilities unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Page content extraction yielded nothing usable
    #[error("Content extraction failed: {0}")]
    ExtractionFailed(String),

    /// Streaming operation failed before any data arrived
    #[error("Stream error: {0}")]
    Stream(String),

    /// A scoped AI operation (summarize, translate, rewrite, proofread) failed
    #[error("{operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Build an `OperationFailed` error for the named operation.
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        SessionError::OperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the session open (the user can dismiss and
    /// retry); non-recoverable errors end the session or require a manual
    /// continuation path.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Transport problems indicate the worker is gone
            SessionError::Channel(_) => false,
            // Malformed envelopes are caught at the boundary and retryable
            SessionError::InvalidResponse => true,
            // No AI means the automated workflow cannot run at all
            SessionError::CapabilityUnavailable(_) => false,
            // Nothing to reflect on
            SessionError::ExtractionFailed(_) => false,
            // A stream that died with zero chunks can be retried
            SessionError::Stream(_) => true,
            // Scoped to one operation; the rest of the session stays usable
            SessionError::OperationFailed { .. } => true,
            SessionError::Config(_) => false,
        }
    }

    /// Get a user-friendly description of the error
    ///
    /// Returns a message suitable for display in the overlay.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Channel(_) => {
                "Lost contact with the AI worker. Please reload and try again.".to_string()
            }
            SessionError::InvalidResponse => {
                "The AI worker returned an unexpected response. Please try again.".to_string()
            }
            SessionError::CapabilityUnavailable(_) => {
                "On-device AI is not available. You can continue in manual mode.".to_string()
            }
            SessionError::ExtractionFailed(_) => {
                "Could not find readable content on this page.".to_string()
            }
            SessionError::Stream(_) => {
                "Summary generation was interrupted. Please try again.".to_string()
            }
            SessionError::OperationFailed { operation, .. } => {
                format!("{} failed. Please try again.", operation)
            }
            SessionError::Config(_) => "Configuration error. Please check settings.".to_string(),
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
