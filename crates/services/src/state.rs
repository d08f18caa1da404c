//! In-memory tracker state shared by the mutation controller, the note
//! buffer and the worker tasks.
//!
//! Everything lives behind one `std::sync::Mutex`. Callers take the lock for
//! short synchronous sections only and never hold it across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::debug;

use learn_core::model::{Confidence, LessonId, LessonRecord, ProgressRecord, UnitRecord, UserId};
use learn_core::{ProgressAggregates, SubjectRef};
use storage::repository::{ProgressRepository, StorageError};

//
// ─── LESSON STATE ──────────────────────────────────────────────────────────────
//

/// The persisted-progress fields a progress write carries in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Snapshot {
    pub completed: bool,
    pub confidence: Option<Confidence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    #[default]
    Clean,
    Dirty,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct NoteDraft {
    pub text: Option<String>,
    /// Last note known to be stored remotely.
    pub confirmed: Option<String>,
    pub status: NoteStatus,
    /// Bumped on every local edit; a save only cleans the revision it sent.
    pub revision: u64,
}

impl NoteDraft {
    fn seeded(note: Option<String>) -> Self {
        Self {
            text: note.clone(),
            confirmed: note,
            status: NoteStatus::Clean,
            revision: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LessonEntry {
    pub lesson: LessonRecord,
    pub subject: Option<SubjectRef>,
    /// Local, possibly optimistic, values.
    pub current: Snapshot,
    /// Last values the store acknowledged.
    pub confirmed: Snapshot,
    /// Bumped on every local progress change.
    pub version: u64,
    pub pending_writes: u32,
    pub note: NoteDraft,
}

impl LessonEntry {
    pub fn from_record(
        lesson: LessonRecord,
        subject: Option<SubjectRef>,
        record: Option<ProgressRecord>,
    ) -> Self {
        let (snapshot, note) = match record {
            Some(r) => (
                Snapshot {
                    completed: r.completed,
                    confidence: r.confidence,
                },
                r.note,
            ),
            None => (Snapshot::default(), None),
        };
        Self {
            lesson,
            subject,
            current: snapshot,
            confirmed: snapshot,
            version: 0,
            pending_writes: 0,
            note: NoteDraft::seeded(note),
        }
    }

    /// True when nothing local is waiting on the store.
    pub fn is_settled(&self) -> bool {
        self.pending_writes == 0 && self.note.status == NoteStatus::Clean
    }

    pub fn view(&self) -> LessonView {
        LessonView {
            lesson: self.lesson.clone(),
            subject: self.subject.clone(),
            completed: self.current.completed,
            confidence: self.current.confidence,
            note: self.note.text.clone(),
            note_status: self.note.status,
            pending: self.pending_writes > 0,
        }
    }
}

/// Read-only copy of one lesson as the learner currently sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonView {
    pub lesson: LessonRecord,
    pub subject: Option<SubjectRef>,
    pub completed: bool,
    pub confidence: Option<Confidence>,
    pub note: Option<String>,
    pub note_status: NoteStatus,
    /// A progress write for this lesson has not settled yet.
    pub pending: bool,
}

//
// ─── TRACKER STATE ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Default)]
pub(crate) struct TrackerState {
    pub aggregates: ProgressAggregates,
    pub lessons: HashMap<LessonId, LessonEntry>,
    pub unit: Option<UnitRecord>,
    /// Lesson ids of `unit`, in display order.
    pub unit_order: Vec<LessonId>,
    /// Bumped whenever aggregates change locally.
    pub epoch: u64,
    /// Progress writes issued but not yet settled, across all lessons.
    pub in_flight: usize,
    /// Aggregates may disagree with the store; rebuild once quiescent.
    pub needs_refresh: bool,
}

impl TrackerState {
    pub fn new(aggregates: ProgressAggregates) -> Self {
        Self {
            aggregates,
            ..Self::default()
        }
    }

    pub fn is_quiescent(&self) -> bool {
        self.in_flight == 0
    }
}

pub(crate) type SharedState = Arc<Mutex<TrackerState>>;

/// Locks the state, recovering the guard if a previous holder panicked.
pub(crate) fn lock(state: &Mutex<TrackerState>) -> MutexGuard<'_, TrackerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rebuilds aggregates from the store if no local change is in flight.
///
/// The check runs both before the fetch and after it; a mutation that started
/// while the fetch was pending leaves the current aggregates in place.
/// Returns whether the aggregates were replaced.
pub(crate) async fn refresh_if_quiescent(
    state: &SharedState,
    progress: &dyn ProgressRepository,
    user: UserId,
) -> Result<bool, StorageError> {
    let epoch = {
        let guard = lock(state);
        if !guard.is_quiescent() {
            debug!(in_flight = guard.in_flight, "refresh skipped, writes in flight");
            return Ok(false);
        }
        guard.epoch
    };

    let rows = progress.fetch_completed_progress(user).await?;
    let completed: Vec<_> = rows.iter().map(|r| r.to_completed_lesson()).collect();
    let fresh = ProgressAggregates::build(&completed);

    let mut guard = lock(state);
    if !guard.is_quiescent() || guard.epoch != epoch {
        debug!("refresh discarded, local state changed during fetch");
        return Ok(false);
    }
    guard.aggregates = fresh;
    guard.needs_refresh = false;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::{SubjectId, SubjectRecord, UnitId};
    use storage::repository::{CatalogRepository, InMemoryRepository};

    fn lesson(id: u64) -> LessonRecord {
        LessonRecord::new(LessonId::new(id), UnitId::new(1), format!("L{id}"), Some(10), 1)
            .unwrap()
    }

    #[test]
    fn entry_seeds_both_snapshots_from_the_record() {
        let user = UserId::random();
        let record = ProgressRecord {
            user_id: user,
            lesson_id: LessonId::new(1),
            completed: true,
            confidence: Some(Confidence::Good),
            note: Some("n".into()),
        };
        let entry = LessonEntry::from_record(lesson(1), None, Some(record));
        assert_eq!(entry.current, entry.confirmed);
        assert!(entry.current.completed);
        assert_eq!(entry.note.text.as_deref(), Some("n"));
        assert!(entry.is_settled());

        let fresh = LessonEntry::from_record(lesson(2), None, None);
        assert_eq!(fresh.current, Snapshot::default());
        assert!(fresh.note.text.is_none());
    }

    #[tokio::test]
    async fn refresh_is_skipped_while_writes_are_in_flight() {
        let repo = InMemoryRepository::new();
        let subject = SubjectRecord::new(SubjectId::new(1), "Math").unwrap();
        repo.upsert_subject(&subject).await.unwrap();

        let state: SharedState = Arc::new(Mutex::new(TrackerState::default()));
        lock(&state).in_flight = 1;
        let replaced = refresh_if_quiescent(&state, &repo, UserId::random())
            .await
            .unwrap();
        assert!(!replaced);

        lock(&state).in_flight = 0;
        let replaced = refresh_if_quiescent(&state, &repo, UserId::random())
            .await
            .unwrap();
        assert!(replaced);
    }
}
