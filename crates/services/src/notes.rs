//! Per-lesson note drafts with explicit save.
//!
//! Edits stay local until `save`. A save goes through the lesson's write lane
//! so it cannot overtake queued progress writes, and it carries the lesson's
//! last confirmed completion and confidence so it never persists an
//! optimistic value that may still roll back.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use learn_core::model::{LessonId, ProgressPatch, UserId};
use storage::repository::{ProgressRepository, StorageError};

use crate::error::NoteSaveError;
use crate::notify::{Notice, Notifier};
use crate::state::{NoteStatus, SharedState, lock};
use crate::write_queue::WriteQueue;

#[derive(Clone)]
pub struct NoteBuffer {
    user: UserId,
    state: SharedState,
    queue: Arc<WriteQueue>,
    progress: Arc<dyn ProgressRepository>,
    notifier: Arc<dyn Notifier>,
}

impl NoteBuffer {
    pub(crate) fn new(
        user: UserId,
        state: SharedState,
        queue: Arc<WriteQueue>,
        progress: Arc<dyn ProgressRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            user,
            state,
            queue,
            progress,
            notifier,
        }
    }

    /// Replaces the local draft and marks it dirty. Never touches the store.
    ///
    /// # Errors
    ///
    /// Returns `NoteSaveError::UnknownLesson` if the lesson is not loaded.
    pub fn edit(&self, lesson: LessonId, text: impl Into<String>) -> Result<(), NoteSaveError> {
        let mut guard = lock(&self.state);
        let entry = guard
            .lessons
            .get_mut(&lesson)
            .ok_or(NoteSaveError::UnknownLesson(lesson))?;
        entry.note.text = Some(text.into());
        entry.note.status = NoteStatus::Dirty;
        entry.note.revision += 1;
        Ok(())
    }

    #[must_use]
    pub fn status(&self, lesson: LessonId) -> Option<NoteStatus> {
        lock(&self.state).lessons.get(&lesson).map(|e| e.note.status)
    }

    /// Current local text, saved or not.
    #[must_use]
    pub fn text(&self, lesson: LessonId) -> Option<String> {
        lock(&self.state)
            .lessons
            .get(&lesson)
            .and_then(|e| e.note.text.clone())
    }

    /// Drops the local draft in favour of the last saved note.
    ///
    /// # Errors
    ///
    /// Returns `NoteSaveError::UnknownLesson` if the lesson is not loaded.
    pub fn discard(&self, lesson: LessonId) -> Result<(), NoteSaveError> {
        let mut guard = lock(&self.state);
        let entry = guard
            .lessons
            .get_mut(&lesson)
            .ok_or(NoteSaveError::UnknownLesson(lesson))?;
        entry.note.text.clone_from(&entry.note.confirmed);
        entry.note.status = NoteStatus::Clean;
        entry.note.revision += 1;
        Ok(())
    }

    /// Persists the draft. Saving a clean note is a no-op.
    ///
    /// On failure the draft stays dirty with its text untouched, a
    /// `NoteSaveFailed` notice is raised, and nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns `NoteSaveError::Storage` if the store rejects the write, or
    /// `NoteSaveError::UnknownLesson` if the lesson is not loaded.
    pub async fn save(&self, lesson: LessonId) -> Result<(), NoteSaveError> {
        let (text, revision) = {
            let guard = lock(&self.state);
            let entry = guard
                .lessons
                .get(&lesson)
                .ok_or(NoteSaveError::UnknownLesson(lesson))?;
            if entry.note.status == NoteStatus::Clean {
                return Ok(());
            }
            (entry.note.text.clone(), entry.note.revision)
        };

        let (tx, rx) = oneshot::channel();
        let state = Arc::clone(&self.state);
        let progress = Arc::clone(&self.progress);
        let user = self.user;
        let note = text.filter(|t| !t.trim().is_empty());
        let stored = note.clone();
        self.queue.submit(lesson, async move {
            // read at execution time so earlier writes on this lane have settled
            let confirmed = lock(&state).lessons.get(&lesson).map(|e| e.confirmed);
            let result = match confirmed {
                Some(snapshot) => {
                    let patch = ProgressPatch::new()
                        .completed(snapshot.completed)
                        .confidence(snapshot.confidence)
                        .note(note);
                    progress.upsert_progress(user, lesson, &patch).await
                }
                None => Err(StorageError::NotFound),
            };
            let _ = tx.send(result);
        });

        let result = rx.await.map_err(|_| NoteSaveError::Interrupted(lesson))?;
        match result {
            Ok(()) => {
                let mut guard = lock(&self.state);
                if let Some(entry) = guard.lessons.get_mut(&lesson) {
                    entry.note.confirmed = stored;
                    if entry.note.revision == revision {
                        entry.note.status = NoteStatus::Clean;
                    } else {
                        debug!(lesson_id = %lesson, "note edited during save, stays dirty");
                    }
                }
                Ok(())
            }
            Err(source) => {
                let err = NoteSaveError::Storage {
                    lesson_id: lesson,
                    source,
                };
                warn!(lesson_id = %lesson, error = %err, "note save failed");
                self.notifier.notify(Notice::NoteSaveFailed {
                    lesson_id: lesson,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }
}
