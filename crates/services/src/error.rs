//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::LessonId;
use storage::repository::StorageError;

/// Errors emitted while resolving the embedded player widget.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlayerError {
    #[error("player widget API did not become available")]
    WidgetUnavailable,

    #[error("lesson source carries no embeddable video id")]
    InvalidSource,

    #[error("player construction failed: {0}")]
    Construction(String),
}

/// Errors emitted by `ProgressTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    #[error("no user is signed in")]
    NotAuthenticated,

    #[error("unknown lesson: {0}")]
    UnknownLesson(LessonId),

    #[error("a player session is already attached for {0}")]
    SessionExists(LessonId),

    #[error(transparent)]
    Player(#[from] PlayerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AccountService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccountError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
