use crate::summary::SessionSummary;
use crate::utterance::SessionId;

/// A convenience `Result` alias using [`ScreenError`].
pub type ScreenResult<T> = Result<T, ScreenError>;

/// Top-level error type for phqscreen.
///
/// Informational close outcomes (already closed, empty session) are not
/// errors; they are modelled by the session service's outcome type.
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    /// A summary was requested for a session that was never closed or never
    /// created.
    #[error("Session not found: {0}")]
    SessionUnknownOnRead(SessionId),

    /// An utterance was appended to a session that is already closed.
    #[error("Session {0} is closed and no longer accepts messages")]
    SessionClosed(SessionId),

    /// The classifier could not score a sentence.
    #[error("Classification error: {0}")]
    Classification(String),

    /// A summary was computed but could not be stored. The computed summary
    /// is carried so the write can be retried without reclassifying.
    #[error("Persistence error for session {}: {reason}", summary.session_id)]
    Persistence {
        /// The summary that failed to persist.
        summary: Box<SessionSummary>,
        /// Underlying storage failure.
        reason: String,
    },

    /// A second summary was offered for a session that already has one.
    #[error("Summary already exists for session {0}")]
    SummaryExists(SessionId),

    /// Caller-supplied input was rejected.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScreenError {
    /// Returns true for failures the caller can fix by retrying later
    /// (classifier outages and storage failures), as opposed to bad input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScreenError::Classification(_)
                | ScreenError::Persistence { .. }
                | ScreenError::Storage(_)
                | ScreenError::Http(_)
                | ScreenError::Io(_)
        )
    }
}
