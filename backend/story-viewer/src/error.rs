/// Error types for story-viewer
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A like toggle was attempted without a viewer identity
    #[error("Authentication required")]
    Unauthenticated,

    /// Like/unlike write was rejected by the backend; local state was rolled back
    #[error("Remote write failed: {0}")]
    RemoteWrite(String),

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// External navigation targeted a sequence that is not loaded
    #[error("No story sequence at index {0}")]
    UnknownSequence(usize),

    #[error("No active stories from owner {0}")]
    UnknownOwner(Uuid),

    /// A toggle for the same story is still waiting for its response
    #[error("Like toggle already in flight for story {0}")]
    ToggleInFlight(Uuid),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ViewerError {
    /// Short text suitable for a toast shown to the viewer.
    pub fn notice(&self) -> &'static str {
        match self {
            ViewerError::Unauthenticated => "Please sign in to like stories",
            ViewerError::RemoteWrite(_) | ViewerError::Timeout(_) => {
                "Couldn't update your like. Please try again"
            }
            ViewerError::ToggleInFlight(_) => "Still saving your last change",
            ViewerError::UnknownSequence(_) | ViewerError::UnknownOwner(_) => {
                "That story is no longer available"
            }
            ViewerError::Database(_) => "Couldn't load stories",
            ViewerError::Config(_) | ViewerError::Internal(_) => "Something went wrong",
        }
    }

    /// Whether the viewer can recover by retrying the action by hand.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ViewerError::Config(_) | ViewerError::Internal(_))
    }
}

/// Result type alias for story-viewer operations
pub type Result<T> = std::result::Result<T, ViewerError>;
