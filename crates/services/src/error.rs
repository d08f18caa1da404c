//! Shared error types for the services crate.

use thiserror::Error;

use learn_core::ValidationError;
use learn_core::model::{LessonId, UnitId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted when a progress mutation is rejected or cannot be settled.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MutationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("lesson {0} is not loaded")]
    UnknownLesson(LessonId),
    #[error("administrator capability required")]
    Forbidden,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("write for lesson {0} ended before reporting an outcome")]
    Interrupted(LessonId),
}

/// Errors emitted by `NoteBuffer::save`. The display text is meant for the learner.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NoteSaveError {
    #[error("lesson {0} is not loaded")]
    UnknownLesson(LessonId),
    #[error("couldn't save your note for lesson {lesson_id}: {source}")]
    Storage {
        lesson_id: LessonId,
        #[source]
        source: StorageError,
    },
    #[error("saving the note for lesson {0} was interrupted")]
    Interrupted(LessonId),
}

/// Errors emitted while evaluating one achievement rule.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AchievementError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while opening or reloading a tracker.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    #[error("unit {0} not found")]
    UnknownUnit(UnitId),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
