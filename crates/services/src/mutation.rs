//! Optimistic progress mutations.
//!
//! `apply` validates, changes local state and aggregates synchronously, then
//! queues the remote upsert on the lesson's write lane. The lane worker settles
//! the command: it confirms on success, and on failure either ignores it
//! (superseded by a newer write for the same lesson) or rolls the lesson back
//! to its last store-acknowledged values.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use learn_core::model::{Confidence, LessonId, ProgressPatch, TrackerSettings, UserId};
use storage::repository::{ProgressRepository, StorageError};

use crate::achievements::{AchievementEvaluator, UnlockedAchievement};
use crate::command::{Command, compensation};
use crate::error::MutationError;
use crate::notify::{Notice, Notifier};
use crate::state::{SharedState, Snapshot, lock, refresh_if_quiescent};
use crate::write_queue::WriteQueue;

//
// ─── MUTATIONS ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Flip the lesson's completed flag and move its XP with it.
    ToggleCompletion(LessonId),
    /// Set the self-reported confidence. No XP effect.
    ChangeConfidence(LessonId, Confidence),
}

impl Mutation {
    /// Builds a confidence change from a user-supplied level code.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::Validation` if `raw` is not a known level.
    pub fn change_confidence(lesson: LessonId, raw: &str) -> Result<Self, MutationError> {
        Ok(Self::ChangeConfidence(lesson, raw.parse()?))
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        match *self {
            Mutation::ToggleCompletion(id) | Mutation::ChangeConfidence(id, _) => id,
        }
    }

    fn target(&self, current: Snapshot) -> Snapshot {
        match *self {
            Mutation::ToggleCompletion(_) => Snapshot {
                completed: !current.completed,
                ..current
            },
            Mutation::ChangeConfidence(_, confidence) => Snapshot {
                confidence: Some(confidence),
                ..current
            },
        }
    }
}

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MutationOutcome {
    /// The store accepted the write. `unlocked` lists achievements it earned.
    Persisted { unlocked: Vec<UnlockedAchievement> },
    /// The write failed and the lesson was restored to its confirmed values.
    RolledBack { reason: String },
    /// The write failed but a newer write for the same lesson carries the
    /// current values, or the store already holds them.
    Superseded,
}

/// Handle to a mutation whose remote write is queued or running.
#[derive(Debug)]
pub struct PendingMutation {
    lesson_id: LessonId,
    version: u64,
    rx: oneshot::Receiver<MutationOutcome>,
}

impl PendingMutation {
    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    /// Local version stamp this mutation produced.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Waits for the write to settle.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::Interrupted` if the worker stopped before
    /// reporting, e.g. because the runtime shut down.
    pub async fn outcome(self) -> Result<MutationOutcome, MutationError> {
        self.rx
            .await
            .map_err(|_| MutationError::Interrupted(self.lesson_id))
    }
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Result of settling one command, decided under the state lock.
enum Settlement {
    Persisted { completed_lesson: bool },
    RolledBack { reason: String },
    Superseded,
}

#[derive(Clone)]
pub struct MutationController {
    user: UserId,
    settings: TrackerSettings,
    state: SharedState,
    queue: Arc<WriteQueue>,
    progress: Arc<dyn ProgressRepository>,
    evaluator: Arc<AchievementEvaluator>,
    notifier: Arc<dyn Notifier>,
}

impl MutationController {
    pub(crate) fn new(
        user: UserId,
        settings: TrackerSettings,
        state: SharedState,
        queue: Arc<WriteQueue>,
        progress: Arc<dyn ProgressRepository>,
        evaluator: Arc<AchievementEvaluator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            user,
            settings,
            state,
            queue,
            progress,
            evaluator,
            notifier,
        }
    }

    /// Applies `mutation` locally and queues its remote write.
    ///
    /// Returns as soon as local state is updated; await
    /// [`PendingMutation::outcome`] to observe the remote result.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::UnknownLesson` if the lesson has not been loaded.
    /// Nothing local or remote changes in that case.
    pub fn apply(&self, mutation: Mutation) -> Result<PendingMutation, MutationError> {
        let lesson_id = mutation.lesson_id();
        let command = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let entry = state
                .lessons
                .get_mut(&lesson_id)
                .ok_or(MutationError::UnknownLesson(lesson_id))?;

            entry.version += 1;
            let command = Command::new(entry, mutation.target(entry.current), entry.version);
            command.forward.apply(entry, &mut state.aggregates);
            entry.pending_writes += 1;
            state.in_flight += 1;
            state.epoch += 1;
            command
        };
        debug!(
            lesson_id = %lesson_id,
            version = command.version,
            completed = command.forward.snapshot.completed,
            "mutation applied locally"
        );

        let (tx, rx) = oneshot::channel();
        let version = command.version;
        let this = self.clone();
        self.queue.submit(lesson_id, async move {
            let outcome = this.persist(command).await;
            // the caller may have dropped its handle
            let _ = tx.send(outcome);
        });

        Ok(PendingMutation {
            lesson_id,
            version,
            rx,
        })
    }

    async fn persist(&self, command: Command) -> MutationOutcome {
        let target = command.forward.snapshot;
        let patch = ProgressPatch::new()
            .completed(target.completed)
            .confidence(target.confidence);
        let result = self
            .progress
            .upsert_progress(self.user, command.lesson_id, &patch)
            .await;

        let outcome = match self.settle(&command, result) {
            Settlement::Persisted { completed_lesson } => {
                let unlocked = if completed_lesson {
                    self.after_completion(&command).await
                } else {
                    Vec::new()
                };
                MutationOutcome::Persisted { unlocked }
            }
            Settlement::RolledBack { reason } => {
                self.notifier.notify(Notice::MutationRolledBack {
                    lesson_id: command.lesson_id,
                    reason: reason.clone(),
                });
                MutationOutcome::RolledBack { reason }
            }
            Settlement::Superseded => MutationOutcome::Superseded,
        };
        self.refresh_if_stale(command.lesson_id).await;
        outcome
    }

    /// Runs a deferred refresh once the last write has settled.
    async fn refresh_if_stale(&self, lesson_id: LessonId) {
        if !lock(&self.state).needs_refresh {
            return;
        }
        match refresh_if_quiescent(&self.state, self.progress.as_ref(), self.user).await {
            Ok(true) => debug!(%lesson_id, "stale aggregates rebuilt"),
            Ok(false) => {}
            Err(e) => warn!(%lesson_id, error = %e, "deferred refresh failed"),
        }
    }

    fn settle(&self, command: &Command, result: Result<(), StorageError>) -> Settlement {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        state.in_flight = state.in_flight.saturating_sub(1);

        let Some(entry) = state.lessons.get_mut(&command.lesson_id) else {
            // the lesson was deleted; its progress is gone from the store too
            if let Some(delta) = &command.forward.xp {
                state.aggregates.apply_delta(&delta.inverse());
            }
            state.epoch += 1;
            state.needs_refresh = true;
            debug!(lesson_id = %command.lesson_id, "lesson removed before its write settled");
            return match result {
                Ok(()) => Settlement::Persisted {
                    completed_lesson: false,
                },
                Err(_) => Settlement::Superseded,
            };
        };
        entry.pending_writes = entry.pending_writes.saturating_sub(1);

        let err = match result {
            Ok(()) => {
                entry.confirmed = command.forward.snapshot;
                debug!(lesson_id = %command.lesson_id, version = command.version, "write confirmed");
                return Settlement::Persisted {
                    completed_lesson: command.completes_lesson(),
                };
            }
            Err(err) => err,
        };

        if entry.version != command.version {
            debug!(
                lesson_id = %command.lesson_id,
                version = command.version,
                latest = entry.version,
                error = %err,
                "failed write superseded by a newer one"
            );
            return Settlement::Superseded;
        }
        if entry.confirmed == command.forward.snapshot {
            debug!(lesson_id = %command.lesson_id, error = %err, "store already holds these values");
            return Settlement::Superseded;
        }

        let undo = if entry.confirmed == command.origin {
            command.inverse.clone()
        } else {
            compensation(entry)
        };
        undo.apply(entry, &mut state.aggregates);
        state.epoch += 1;

        warn!(
            lesson_id = %command.lesson_id,
            version = command.version,
            error = %err,
            transient = err.is_transient(),
            "write failed, local change rolled back"
        );
        Settlement::RolledBack {
            reason: err.to_string(),
        }
    }

    async fn after_completion(&self, command: &Command) -> Vec<UnlockedAchievement> {
        let unlocked = self.evaluator.evaluate(self.user, command.unit_id).await;

        if self.settings.refresh_after_completion() {
            match refresh_if_quiescent(&self.state, self.progress.as_ref(), self.user).await {
                Ok(true) => debug!(lesson_id = %command.lesson_id, "aggregates refreshed"),
                Ok(false) => {}
                Err(e) => warn!(lesson_id = %command.lesson_id, error = %e, "aggregate refresh failed"),
            }
        }
        unlocked
    }
}
