#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc, oneshot};

use learn_core::model::{
    AchievementDefinition, AchievementId, LessonId, LessonRecord, Profile, ProgressPatch,
    ProgressRecord, SubjectId, SubjectRecord, UnitId, UnitRecord, UserId, builtin,
};
use storage::repository::{
    CatalogRepository, CompletedProgressRow, InMemoryRepository, ProfileRepository,
    ProgressRepository, Storage, StorageError,
};

pub const BASICS: UnitId = UnitId::new(1);
pub const MORE: UnitId = UnitId::new(2);
pub const LOOSE: UnitId = UnitId::new(3);
pub const MATH: SubjectId = SubjectId::new(1);
pub const BASICS_DONE: &str = "basics_done";

/// Math subject with three units:
/// - `BASICS` (linked to `basics_done`): lessons 1 (5 xp), 2 (20 xp), 3 (10 xp)
/// - `MORE`: lessons 4..=9, 10 xp each
/// - `LOOSE` (no subject): lesson 10, 50 xp
pub async fn seeded_repo() -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.upsert_subject(&SubjectRecord::new(MATH, "Math").unwrap())
        .await
        .unwrap();

    for (key, title) in [
        (builtin::FIRST_SPARK, "First Spark"),
        (builtin::FIVE_LESSONS, "High Five"),
        (BASICS_DONE, "Basics Done"),
    ] {
        repo.upsert_achievement(
            &AchievementDefinition::new(AchievementId::from_static(key), title, None).unwrap(),
        )
        .await
        .unwrap();
    }

    repo.upsert_unit(
        &UnitRecord::new(BASICS, Some(MATH), "Basics", 1)
            .unwrap()
            .with_achievement(AchievementId::from_static(BASICS_DONE)),
    )
    .await
    .unwrap();
    repo.upsert_unit(&UnitRecord::new(MORE, Some(MATH), "More", 2).unwrap())
        .await
        .unwrap();
    repo.upsert_unit(&UnitRecord::new(LOOSE, None, "Loose", 3).unwrap())
        .await
        .unwrap();

    let mut lessons = vec![(1, BASICS, 5), (2, BASICS, 20), (3, BASICS, 10)];
    lessons.extend((4..=9).map(|id| (id, MORE, 10)));
    lessons.push((10, LOOSE, 50));
    for (order, (id, unit, xp)) in (1_u32..).zip(lessons) {
        repo.upsert_lesson(
            &LessonRecord::new(LessonId::new(id), unit, format!("Lesson {id}"), Some(xp), order)
                .unwrap(),
        )
        .await
        .unwrap();
    }
    repo
}

pub async fn complete(repo: &InMemoryRepository, user: UserId, ids: impl IntoIterator<Item = u64>) {
    for id in ids {
        repo.upsert_progress(user, LessonId::new(id), &ProgressPatch::new().completed(true))
            .await
            .unwrap();
    }
}

pub async fn make_admin(repo: &InMemoryRepository, user: UserId) {
    repo.upsert_profile(&Profile {
        is_admin: true,
        ..Profile::learner(user)
    })
    .await
    .unwrap();
}

//
// ─── SCRIPTED PROGRESS STORE ──────────────────────────────────────────────────
//

/// One `upsert_progress` call waiting for the test to decide its result.
pub struct PendingCall {
    pub lesson: LessonId,
    pub patch: ProgressPatch,
    reply: oneshot::Sender<Result<(), StorageError>>,
}

impl PendingCall {
    pub fn succeed(self) {
        let _ = self.reply.send(Ok(()));
    }

    pub fn fail(self) {
        let _ = self
            .reply
            .send(Err(StorageError::Connection("network unreachable".into())));
    }
}

/// Progress store whose writes block until the test answers them.
pub struct ScriptedProgress {
    inner: InMemoryRepository,
    calls: mpsc::UnboundedSender<PendingCall>,
}

#[async_trait]
impl ProgressRepository for ScriptedProgress {
    async fn fetch_completed_progress(
        &self,
        user: UserId,
    ) -> Result<Vec<CompletedProgressRow>, StorageError> {
        self.inner.fetch_completed_progress(user).await
    }

    async fn list_progress(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        self.inner.list_progress(user, lessons).await
    }

    async fn upsert_progress(
        &self,
        user: UserId,
        lesson: LessonId,
        patch: &ProgressPatch,
    ) -> Result<(), StorageError> {
        let (reply, decision) = oneshot::channel();
        self.calls
            .send(PendingCall {
                lesson,
                patch: patch.clone(),
                reply,
            })
            .map_err(|_| StorageError::Connection("script closed".into()))?;
        decision
            .await
            .map_err(|_| StorageError::Connection("script dropped".into()))??;
        self.inner.upsert_progress(user, lesson, patch).await
    }
}

/// Storage whose progress writes are answered through the returned receiver.
pub fn scripted_storage(
    repo: &InMemoryRepository,
) -> (Storage, mpsc::UnboundedReceiver<PendingCall>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut storage = Storage::from_in_memory(repo.clone());
    storage.progress = Arc::new(ScriptedProgress {
        inner: repo.clone(),
        calls: tx,
    });
    (storage, rx)
}

//
// ─── GATED LIST STORE ─────────────────────────────────────────────────────────
//

/// Lets a test hold the next `list_progress` call open.
#[derive(Clone, Default)]
pub struct ListGate {
    armed: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    entered: Arc<Notify>,
}

impl ListGate {
    /// Holds the next `list_progress` until the returned sender fires.
    pub fn arm(&self) -> oneshot::Sender<()> {
        let (release, held) = oneshot::channel();
        *self.armed.lock().unwrap() = Some(held);
        release
    }

    /// Waits until a held `list_progress` call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }
}

/// Progress store that writes straight through but can hold list reads.
pub struct GatedList {
    inner: InMemoryRepository,
    gate: ListGate,
}

#[async_trait]
impl ProgressRepository for GatedList {
    async fn fetch_completed_progress(
        &self,
        user: UserId,
    ) -> Result<Vec<CompletedProgressRow>, StorageError> {
        self.inner.fetch_completed_progress(user).await
    }

    async fn list_progress(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        // read before holding: the fetched rows predate anything done meanwhile
        let rows = self.inner.list_progress(user, lessons).await;
        let held = self.gate.armed.lock().unwrap().take();
        if let Some(held) = held {
            self.gate.entered.notify_one();
            let _ = held.await;
        }
        rows
    }

    async fn upsert_progress(
        &self,
        user: UserId,
        lesson: LessonId,
        patch: &ProgressPatch,
    ) -> Result<(), StorageError> {
        self.inner.upsert_progress(user, lesson, patch).await
    }
}

/// Storage whose progress list reads can be held through the returned gate.
pub fn gated_list_storage(repo: &InMemoryRepository) -> (Storage, ListGate) {
    let gate = ListGate::default();
    let mut storage = Storage::from_in_memory(repo.clone());
    storage.progress = Arc::new(GatedList {
        inner: repo.clone(),
        gate: gate.clone(),
    });
    (storage, gate)
}
