//! Session facade for one signed-in learner.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::{info, warn};

use learn_core::model::{
    AchievementUnlock, Confidence, LessonId, SubjectId, TrackerSettings, UnitId, UnitRecord,
    UserId,
};
use learn_core::{Clock, GlobalAggregate, ProgressAggregates, SubjectAggregate, SubjectRef};
use storage::repository::Storage;

use crate::achievements::AchievementEvaluator;
use crate::error::{MutationError, TrackerError};
use crate::mutation::{Mutation, MutationController, PendingMutation};
use crate::notes::NoteBuffer;
use crate::notify::Notifier;
use crate::state::{LessonEntry, LessonView, SharedState, TrackerState, lock, refresh_if_quiescent};
use crate::write_queue::WriteQueue;

/// Owns the in-memory progress state for one user and wires the mutation
/// controller, note buffer and achievement evaluator to the same store.
pub struct ProgressTracker {
    user: UserId,
    storage: Storage,
    state: SharedState,
    queue: Arc<WriteQueue>,
    mutations: MutationController,
    notes: NoteBuffer,
}

impl ProgressTracker {
    /// Starts a session: loads completed progress and builds aggregates.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Storage` if completed progress cannot be fetched.
    pub async fn open(
        user: UserId,
        storage: Storage,
        settings: TrackerSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, TrackerError> {
        Self::open_with_clock(user, storage, settings, notifier, Clock::default()).await
    }

    /// Like [`ProgressTracker::open`], stamping unlocks with `clock`.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Storage` if completed progress cannot be fetched.
    pub async fn open_with_clock(
        user: UserId,
        storage: Storage,
        settings: TrackerSettings,
        notifier: Arc<dyn Notifier>,
        clock: Clock,
    ) -> Result<Self, TrackerError> {
        let rows = storage.progress.fetch_completed_progress(user).await?;
        let completed: Vec<_> = rows.iter().map(|r| r.to_completed_lesson()).collect();
        let aggregates = ProgressAggregates::build(&completed);
        info!(
            %user,
            completed = aggregates.global().completed,
            xp = aggregates.global().xp,
            "progress loaded"
        );

        let state: SharedState = Arc::new(Mutex::new(TrackerState::new(aggregates)));
        let queue = Arc::new(WriteQueue::new(Handle::current()));
        let evaluator = Arc::new(
            AchievementEvaluator::new(
                settings.clone(),
                Arc::clone(&storage.achievements),
                Arc::clone(&storage.catalog),
                Arc::clone(&notifier),
            )
            .with_clock(clock),
        );
        let mutations = MutationController::new(
            user,
            settings,
            Arc::clone(&state),
            Arc::clone(&queue),
            Arc::clone(&storage.progress),
            evaluator,
            Arc::clone(&notifier),
        );
        let notes = NoteBuffer::new(
            user,
            Arc::clone(&state),
            Arc::clone(&queue),
            Arc::clone(&storage.progress),
            notifier,
        );

        Ok(Self {
            user,
            storage,
            state,
            queue,
            mutations,
            notes,
        })
    }

    /// Connects to `SQLite`, runs migrations and opens a session.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` if the database or the initial load fails.
    pub async fn open_sqlite(
        db_url: &str,
        user: UserId,
        settings: TrackerSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, TrackerError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::open(user, storage, settings, notifier).await
    }

    #[must_use]
    pub fn user(&self) -> UserId {
        self.user
    }

    /// Loads a unit's lessons in order, joined with the user's progress.
    ///
    /// Lessons with unsettled local changes, or changed while the progress
    /// fetch was running, keep their local values.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::UnknownUnit` if the unit does not exist, or
    /// `TrackerError::Storage` if any read fails.
    pub async fn load_unit(&self, unit_id: UnitId) -> Result<Vec<LessonView>, TrackerError> {
        let unit = self
            .storage
            .catalog
            .get_unit(unit_id)
            .await?
            .ok_or(TrackerError::UnknownUnit(unit_id))?;
        let subject = self.unit_subject(&unit).await?;
        let lessons = self.storage.catalog.list_unit_lessons(unit_id).await?;
        let ids: Vec<LessonId> = lessons.iter().map(|l| l.id).collect();
        // lessons settled before the fetch; only these may take the fetched record
        let settled: HashMap<LessonId, (u64, u64)> = {
            let guard = lock(&self.state);
            ids.iter()
                .filter_map(|id| guard.lessons.get(id).map(|e| (*id, e)))
                .filter(|(_, e)| e.is_settled())
                .map(|(id, e)| (id, (e.version, e.note.revision)))
                .collect()
        };
        let mut records: HashMap<_, _> = self
            .storage
            .progress
            .list_progress(self.user, &ids)
            .await?
            .into_iter()
            .map(|r| (r.lesson_id, r))
            .collect();

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        for lesson in lessons {
            let record = records.remove(&lesson.id);
            let keep_local = state
                .lessons
                .get(&lesson.id)
                .is_some_and(|e| {
                    !e.is_settled()
                        || settled.get(&lesson.id) != Some(&(e.version, e.note.revision))
                });
            if keep_local {
                if let Some(entry) = state.lessons.get_mut(&lesson.id) {
                    entry.lesson = lesson;
                    entry.subject.clone_from(&subject);
                }
            } else {
                let entry = LessonEntry::from_record(lesson, subject.clone(), record);
                state.lessons.insert(entry.lesson.id, entry);
            }
        }
        info!(user = %self.user, unit = %unit_id, lessons = ids.len(), "unit loaded");
        state.unit = Some(unit);
        state.unit_order = ids;

        Ok(state
            .unit_order
            .iter()
            .filter_map(|id| state.lessons.get(id).map(LessonEntry::view))
            .collect())
    }

    /// `None` when the unit or its subject is missing; such lessons move no XP.
    async fn unit_subject(&self, unit: &UnitRecord) -> Result<Option<SubjectRef>, TrackerError> {
        let Some(subject_id) = unit.subject_id else {
            return Ok(None);
        };
        Ok(self
            .storage
            .catalog
            .get_subject(subject_id)
            .await?
            .map(|s| SubjectRef::new(s.id, s.name)))
    }

    /// Re-fetches completed progress and rebuilds aggregates if nothing is
    /// in flight. Returns whether the aggregates were replaced.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Storage` if the fetch fails.
    pub async fn refresh(&self) -> Result<bool, TrackerError> {
        let replaced =
            refresh_if_quiescent(&self.state, self.storage.progress.as_ref(), self.user).await?;
        if !replaced {
            warn!(user = %self.user, "refresh skipped, local changes pending");
        }
        Ok(replaced)
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// See [`MutationController::apply`].
    pub fn apply(&self, mutation: Mutation) -> Result<PendingMutation, MutationError> {
        self.mutations.apply(mutation)
    }

    /// # Errors
    ///
    /// Returns `MutationError::UnknownLesson` if the lesson is not loaded.
    pub fn toggle_completion(&self, lesson: LessonId) -> Result<PendingMutation, MutationError> {
        self.apply(Mutation::ToggleCompletion(lesson))
    }

    /// # Errors
    ///
    /// Returns `MutationError::UnknownLesson` if the lesson is not loaded.
    pub fn change_confidence(
        &self,
        lesson: LessonId,
        confidence: Confidence,
    ) -> Result<PendingMutation, MutationError> {
        self.apply(Mutation::ChangeConfidence(lesson, confidence))
    }

    #[must_use]
    pub fn notes(&self) -> &NoteBuffer {
        &self.notes
    }

    /// Deletes a lesson from the catalog. Administrators only.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::Forbidden` if the user's profile is missing or
    /// not an administrator, and `MutationError::Storage` if the delete fails.
    pub async fn delete_lesson(&self, lesson: LessonId) -> Result<(), MutationError> {
        let is_admin = self
            .storage
            .profiles
            .get_profile(self.user)
            .await?
            .is_some_and(|p| p.is_admin);
        if !is_admin {
            warn!(user = %self.user, lesson_id = %lesson, "lesson delete refused");
            return Err(MutationError::Forbidden);
        }

        self.storage.catalog.delete_lesson(lesson).await?;
        {
            let mut guard = lock(&self.state);
            guard.lessons.remove(&lesson);
            guard.unit_order.retain(|id| *id != lesson);
            guard.needs_refresh = true;
        }
        self.queue.close(lesson);
        info!(user = %self.user, lesson_id = %lesson, "lesson deleted");

        if let Err(e) =
            refresh_if_quiescent(&self.state, self.storage.progress.as_ref(), self.user).await
        {
            warn!(user = %self.user, error = %e, "refresh after delete failed");
        }
        Ok(())
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn aggregates(&self) -> ProgressAggregates {
        lock(&self.state).aggregates.clone()
    }

    #[must_use]
    pub fn global(&self) -> GlobalAggregate {
        lock(&self.state).aggregates.global()
    }

    #[must_use]
    pub fn subject(&self, id: SubjectId) -> Option<SubjectAggregate> {
        lock(&self.state).aggregates.subject(id).cloned()
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<LessonView> {
        lock(&self.state).lessons.get(&id).map(LessonEntry::view)
    }

    /// Lessons of the last loaded unit, in unit order.
    #[must_use]
    pub fn lessons(&self) -> Vec<LessonView> {
        let guard = lock(&self.state);
        guard
            .unit_order
            .iter()
            .filter_map(|id| guard.lessons.get(id).map(LessonEntry::view))
            .collect()
    }

    #[must_use]
    pub fn current_unit(&self) -> Option<UnitRecord> {
        lock(&self.state).unit.clone()
    }

    /// # Errors
    ///
    /// Returns `TrackerError::Storage` if the unlocks cannot be read.
    pub async fn unlocked_achievements(&self) -> Result<Vec<AchievementUnlock>, TrackerError> {
        Ok(self.storage.achievements.list_unlocks(self.user).await?)
    }
}
