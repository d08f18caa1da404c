use async_trait::async_trait;
use learn_core::model::{
    AchievementDefinition, AchievementId, AchievementUnlock, Confidence, LessonId, LessonRecord,
    Profile, ProgressPatch, ProgressRecord, SubjectId, SubjectRecord, UnitId, UnitRecord, UserId,
};
use learn_core::{CompletedLesson, SubjectRef};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Network or availability failures that a later attempt may not hit.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Connection(_))
    }
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// A completed progress row joined to its lesson, unit and subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedProgressRow {
    pub lesson_id: LessonId,
    pub completed: bool,
    pub note: Option<String>,
    pub confidence: Option<Confidence>,
    pub xp_value: Option<u32>,
    /// `None` when the lesson, its unit, or the unit's subject is missing.
    pub subject: Option<SubjectRef>,
}

impl CompletedProgressRow {
    #[must_use]
    pub fn to_completed_lesson(&self) -> CompletedLesson {
        CompletedLesson {
            lesson_id: self.lesson_id,
            xp_value: self.xp_value,
            subject: self.subject.clone(),
        }
    }
}

/// Result of an idempotent unlock insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockInsert {
    Created,
    AlreadyExists,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Per-user lesson progress, keyed by `(user, lesson)`.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Completed progress for a user, joined to xp value and subject.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn fetch_completed_progress(
        &self,
        user: UserId,
    ) -> Result<Vec<CompletedProgressRow>, StorageError>;

    /// Progress records for the given lessons. Lessons without a record are omitted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn list_progress(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<Vec<ProgressRecord>, StorageError>;

    /// Insert or update the fields present in `patch`. Safe to retry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_progress(
        &self,
        user: UserId,
        lesson: LessonId,
        patch: &ProgressPatch,
    ) -> Result<(), StorageError>;
}

/// Read-mostly course content: subjects, units, lessons and achievements.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the subject cannot be stored.
    async fn upsert_subject(&self, subject: &SubjectRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the unit cannot be stored.
    async fn upsert_unit(&self, unit: &UnitRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the unit does not exist, or other storage errors.
    async fn upsert_lesson(&self, lesson: &LessonRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the achievement cannot be stored.
    async fn upsert_achievement(
        &self,
        achievement: &AchievementDefinition,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn get_subject(&self, id: SubjectId) -> Result<Option<SubjectRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn get_unit(&self, id: UnitId) -> Result<Option<UnitRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn get_lesson(&self, id: LessonId) -> Result<Option<LessonRecord>, StorageError>;

    /// Every subject, ordered by name then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn list_subjects(&self) -> Result<Vec<SubjectRecord>, StorageError>;

    /// Units of a subject in display order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn list_subject_units(&self, subject: SubjectId)
    -> Result<Vec<UnitRecord>, StorageError>;

    /// Lessons of a unit in display order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn list_unit_lessons(&self, unit: UnitId) -> Result<Vec<LessonRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn get_unit_lesson_count(&self, unit: UnitId) -> Result<u64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn get_achievement(
        &self,
        id: &AchievementId,
    ) -> Result<Option<AchievementDefinition>, StorageError>;

    /// Remove a lesson and its progress rows. Callers gate this on the
    /// administrator capability.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the lesson does not exist.
    async fn delete_lesson(&self, id: LessonId) -> Result<(), StorageError>;
}

/// Completion counts and one-time unlock records.
#[async_trait]
pub trait AchievementRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn count_completed(&self, user: UserId) -> Result<u64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn count_completed_in_unit(&self, user: UserId, unit: UnitId)
    -> Result<u64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn has_unlock(&self, user: UserId, id: &AchievementId) -> Result<bool, StorageError>;

    /// Insert the unlock unless `(user, achievement)` already exists.
    ///
    /// This is the only authority on uniqueness; callers must not rely on a
    /// preceding `has_unlock`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn insert_unlock_if_absent(
        &self,
        unlock: &AchievementUnlock,
    ) -> Result<UnlockInsert, StorageError>;

    /// Unlocks of a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn list_unlocks(&self, user: UserId) -> Result<Vec<AchievementUnlock>, StorageError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be queried.
    async fn get_profile(&self, user: UserId) -> Result<Option<Profile>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be stored.
    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct Catalog {
    subjects: HashMap<SubjectId, SubjectRecord>,
    units: HashMap<UnitId, UnitRecord>,
    lessons: HashMap<LessonId, LessonRecord>,
    achievements: HashMap<AchievementId, AchievementDefinition>,
}

impl Catalog {
    fn subject_of(&self, lesson: &LessonRecord) -> Option<SubjectRef> {
        let unit = self.units.get(&lesson.unit_id)?;
        let subject = self.subjects.get(&unit.subject_id?)?;
        Some(SubjectRef::new(subject.id, subject.name.clone()))
    }
}

#[derive(Default)]
struct Faults {
    offline: bool,
    failing_upserts: u32,
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Supports fault injection so callers can exercise rollback paths.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    catalog: Arc<Mutex<Catalog>>,
    progress: Arc<Mutex<HashMap<(UserId, LessonId), ProgressRecord>>>,
    unlocks: Arc<Mutex<Vec<AchievementUnlock>>>,
    profiles: Arc<Mutex<HashMap<UserId, Profile>>>,
    faults: Arc<Mutex<Faults>>,
    upsert_log: Arc<Mutex<Vec<(LessonId, ProgressPatch)>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When offline every operation fails with `StorageError::Connection`.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.offline = offline;
        }
    }

    /// Fail the next `count` progress upserts.
    pub fn fail_next_upserts(&self, count: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_upserts = count;
        }
    }

    /// Patches accepted by `upsert_progress`, in arrival order.
    #[must_use]
    pub fn upsert_log(&self) -> Vec<(LessonId, ProgressPatch)> {
        self.upsert_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if lock(&self.faults)?.offline {
            return Err(StorageError::Connection("store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn fetch_completed_progress(
        &self,
        user: UserId,
    ) -> Result<Vec<CompletedProgressRow>, StorageError> {
        self.check_online()?;
        let catalog = lock(&self.catalog)?;
        let progress = lock(&self.progress)?;

        let mut rows: Vec<_> = progress
            .values()
            .filter(|p| p.user_id == user && p.completed)
            .map(|p| {
                let lesson = catalog.lessons.get(&p.lesson_id);
                CompletedProgressRow {
                    lesson_id: p.lesson_id,
                    completed: p.completed,
                    note: p.note.clone(),
                    confidence: p.confidence,
                    xp_value: lesson.and_then(|l| l.xp_value),
                    subject: lesson.and_then(|l| catalog.subject_of(l)),
                }
            })
            .collect();
        rows.sort_by_key(|r| r.lesson_id);
        Ok(rows)
    }

    async fn list_progress(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        self.check_online()?;
        let progress = lock(&self.progress)?;
        Ok(lessons
            .iter()
            .filter_map(|lesson| progress.get(&(user, *lesson)).cloned())
            .collect())
    }

    async fn upsert_progress(
        &self,
        user: UserId,
        lesson: LessonId,
        patch: &ProgressPatch,
    ) -> Result<(), StorageError> {
        self.check_online()?;
        {
            let mut faults = lock(&self.faults)?;
            if faults.failing_upserts > 0 {
                faults.failing_upserts -= 1;
                return Err(StorageError::Connection("injected upsert failure".into()));
            }
        }
        if !lock(&self.catalog)?.lessons.contains_key(&lesson) {
            return Err(StorageError::Conflict);
        }

        let mut progress = lock(&self.progress)?;
        progress
            .entry((user, lesson))
            .or_insert_with(|| ProgressRecord::untouched(user, lesson))
            .apply(patch);
        lock(&self.upsert_log)?.push((lesson, patch.clone()));
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_subject(&self, subject: &SubjectRecord) -> Result<(), StorageError> {
        lock(&self.catalog)?
            .subjects
            .insert(subject.id, subject.clone());
        Ok(())
    }

    async fn upsert_unit(&self, unit: &UnitRecord) -> Result<(), StorageError> {
        lock(&self.catalog)?.units.insert(unit.id, unit.clone());
        Ok(())
    }

    async fn upsert_lesson(&self, lesson: &LessonRecord) -> Result<(), StorageError> {
        let mut catalog = lock(&self.catalog)?;
        if !catalog.units.contains_key(&lesson.unit_id) {
            return Err(StorageError::Conflict);
        }
        catalog.lessons.insert(lesson.id, lesson.clone());
        Ok(())
    }

    async fn upsert_achievement(
        &self,
        achievement: &AchievementDefinition,
    ) -> Result<(), StorageError> {
        lock(&self.catalog)?
            .achievements
            .insert(achievement.id.clone(), achievement.clone());
        Ok(())
    }

    async fn get_subject(&self, id: SubjectId) -> Result<Option<SubjectRecord>, StorageError> {
        self.check_online()?;
        Ok(lock(&self.catalog)?.subjects.get(&id).cloned())
    }

    async fn get_unit(&self, id: UnitId) -> Result<Option<UnitRecord>, StorageError> {
        self.check_online()?;
        Ok(lock(&self.catalog)?.units.get(&id).cloned())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<LessonRecord>, StorageError> {
        self.check_online()?;
        Ok(lock(&self.catalog)?.lessons.get(&id).cloned())
    }

    async fn list_subjects(&self) -> Result<Vec<SubjectRecord>, StorageError> {
        self.check_online()?;
        let mut subjects: Vec<_> = lock(&self.catalog)?.subjects.values().cloned().collect();
        subjects.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(subjects)
    }

    async fn list_subject_units(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<UnitRecord>, StorageError> {
        self.check_online()?;
        let catalog = lock(&self.catalog)?;
        let mut units: Vec<_> = catalog
            .units
            .values()
            .filter(|u| u.subject_id == Some(subject))
            .cloned()
            .collect();
        units.sort_by_key(|u| (u.order, u.id));
        Ok(units)
    }

    async fn list_unit_lessons(&self, unit: UnitId) -> Result<Vec<LessonRecord>, StorageError> {
        self.check_online()?;
        let catalog = lock(&self.catalog)?;
        let mut lessons: Vec<_> = catalog
            .lessons
            .values()
            .filter(|l| l.unit_id == unit)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| (l.order, l.id));
        Ok(lessons)
    }

    async fn get_unit_lesson_count(&self, unit: UnitId) -> Result<u64, StorageError> {
        self.check_online()?;
        let catalog = lock(&self.catalog)?;
        Ok(catalog.lessons.values().filter(|l| l.unit_id == unit).count() as u64)
    }

    async fn get_achievement(
        &self,
        id: &AchievementId,
    ) -> Result<Option<AchievementDefinition>, StorageError> {
        self.check_online()?;
        Ok(lock(&self.catalog)?.achievements.get(id).cloned())
    }

    async fn delete_lesson(&self, id: LessonId) -> Result<(), StorageError> {
        self.check_online()?;
        if lock(&self.catalog)?.lessons.remove(&id).is_none() {
            return Err(StorageError::NotFound);
        }
        lock(&self.progress)?.retain(|(_, lesson), _| *lesson != id);
        Ok(())
    }
}

#[async_trait]
impl AchievementRepository for InMemoryRepository {
    async fn count_completed(&self, user: UserId) -> Result<u64, StorageError> {
        self.check_online()?;
        let progress = lock(&self.progress)?;
        Ok(progress
            .values()
            .filter(|p| p.user_id == user && p.completed)
            .count() as u64)
    }

    async fn count_completed_in_unit(
        &self,
        user: UserId,
        unit: UnitId,
    ) -> Result<u64, StorageError> {
        self.check_online()?;
        let catalog = lock(&self.catalog)?;
        let progress = lock(&self.progress)?;
        Ok(progress
            .values()
            .filter(|p| p.user_id == user && p.completed)
            .filter(|p| {
                catalog
                    .lessons
                    .get(&p.lesson_id)
                    .is_some_and(|l| l.unit_id == unit)
            })
            .count() as u64)
    }

    async fn has_unlock(&self, user: UserId, id: &AchievementId) -> Result<bool, StorageError> {
        self.check_online()?;
        Ok(lock(&self.unlocks)?
            .iter()
            .any(|u| u.user_id == user && &u.achievement_id == id))
    }

    async fn insert_unlock_if_absent(
        &self,
        unlock: &AchievementUnlock,
    ) -> Result<UnlockInsert, StorageError> {
        self.check_online()?;
        let mut unlocks = lock(&self.unlocks)?;
        let exists = unlocks
            .iter()
            .any(|u| u.user_id == unlock.user_id && u.achievement_id == unlock.achievement_id);
        if exists {
            return Ok(UnlockInsert::AlreadyExists);
        }
        unlocks.push(unlock.clone());
        Ok(UnlockInsert::Created)
    }

    async fn list_unlocks(&self, user: UserId) -> Result<Vec<AchievementUnlock>, StorageError> {
        self.check_online()?;
        Ok(lock(&self.unlocks)?
            .iter()
            .filter(|u| u.user_id == user)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_profile(&self, user: UserId) -> Result<Option<Profile>, StorageError> {
        self.check_online()?;
        Ok(lock(&self.profiles)?.get(&user).cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        lock(&self.profiles)?.insert(profile.user_id, profile.clone());
        Ok(())
    }
}

/// Bundles the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub achievements: Arc<dyn AchievementRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryRepository::new())
    }

    /// Wrap an existing in-memory repository (keeps a handle for fault injection).
    #[must_use]
    pub fn from_in_memory(repo: InMemoryRepository) -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let achievements: Arc<dyn AchievementRepository> = Arc::new(repo.clone());
        let profiles: Arc<dyn ProfileRepository> = Arc::new(repo);
        Self {
            progress,
            catalog,
            achievements,
            profiles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::time::fixed_now;

    async fn seeded() -> (InMemoryRepository, UnitId) {
        let repo = InMemoryRepository::new();
        let subject = SubjectRecord::new(SubjectId::new(1), "Math").unwrap();
        let unit = UnitRecord::new(UnitId::new(10), Some(subject.id), "Algebra", 1).unwrap();
        repo.upsert_subject(&subject).await.unwrap();
        repo.upsert_unit(&unit).await.unwrap();
        for id in 1..=3 {
            let lesson =
                LessonRecord::new(LessonId::new(id), unit.id, format!("L{id}"), Some(10), id as u32)
                    .unwrap();
            repo.upsert_lesson(&lesson).await.unwrap();
        }
        (repo, unit.id)
    }

    #[tokio::test]
    async fn upsert_creates_then_patches_progress() {
        let (repo, _) = seeded().await;
        let user = UserId::random();
        let lesson = LessonId::new(1);

        repo.upsert_progress(user, lesson, &ProgressPatch::new().note(Some("hi".into())))
            .await
            .unwrap();
        repo.upsert_progress(user, lesson, &ProgressPatch::new().completed(true))
            .await
            .unwrap();
        // retrying the same write is harmless
        repo.upsert_progress(user, lesson, &ProgressPatch::new().completed(true))
            .await
            .unwrap();

        let records = repo.list_progress(user, &[lesson]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].completed);
        assert_eq!(records[0].note.as_deref(), Some("hi"));
        assert_eq!(repo.count_completed(user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn completed_rows_carry_subject_join() {
        let (repo, unit) = seeded().await;
        let user = UserId::random();
        for id in [1, 2] {
            repo.upsert_progress(user, LessonId::new(id), &ProgressPatch::new().completed(true))
                .await
                .unwrap();
        }

        let rows = repo.fetch_completed_progress(user).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.subject.as_ref().map(|s| s.name.as_str()) == Some("Math")));
        assert_eq!(repo.count_completed_in_unit(user, unit).await.unwrap(), 2);
        assert_eq!(repo.get_unit_lesson_count(unit).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn unlinked_lessons_still_count_as_completed() {
        let (repo, _) = seeded().await;
        let loose = UnitRecord::new(UnitId::new(20), None, "Loose", 2).unwrap();
        repo.upsert_unit(&loose).await.unwrap();
        repo.upsert_lesson(&LessonRecord::new(LessonId::new(9), loose.id, "Stray", None, 1).unwrap())
            .await
            .unwrap();
        let user = UserId::random();
        for id in [1, 9] {
            repo.upsert_progress(user, LessonId::new(id), &ProgressPatch::new().completed(true))
                .await
                .unwrap();
        }

        let rows = repo.fetch_completed_progress(user).await.unwrap();
        assert_eq!(rows.iter().filter(|r| r.subject.is_none()).count(), 1);
        assert_eq!(repo.count_completed(user).await.unwrap(), 2);
        assert_eq!(repo.count_completed_in_unit(user, loose.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unlock_insert_is_idempotent() {
        let repo = InMemoryRepository::new();
        let unlock = AchievementUnlock {
            user_id: UserId::random(),
            achievement_id: AchievementId::from_static("first_spark"),
            unlocked_at: fixed_now(),
        };

        assert_eq!(
            repo.insert_unlock_if_absent(&unlock).await.unwrap(),
            UnlockInsert::Created
        );
        assert_eq!(
            repo.insert_unlock_if_absent(&unlock).await.unwrap(),
            UnlockInsert::AlreadyExists
        );
        assert_eq!(repo.list_unlocks(unlock.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_counted() {
        let (repo, _) = seeded().await;
        let user = UserId::random();
        repo.fail_next_upserts(1);

        let err = repo
            .upsert_progress(user, LessonId::new(1), &ProgressPatch::new().completed(true))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(repo.upsert_log().is_empty());

        repo.upsert_progress(user, LessonId::new(1), &ProgressPatch::new().completed(true))
            .await
            .unwrap();
        assert_eq!(repo.upsert_log().len(), 1);

        repo.set_offline(true);
        assert!(repo.count_completed(user).await.is_err());
    }

    #[tokio::test]
    async fn deleting_a_lesson_drops_its_progress() {
        let (repo, unit) = seeded().await;
        let user = UserId::random();
        repo.upsert_progress(user, LessonId::new(3), &ProgressPatch::new().completed(true))
            .await
            .unwrap();

        repo.delete_lesson(LessonId::new(3)).await.unwrap();
        assert_eq!(repo.count_completed(user).await.unwrap(), 0);
        assert_eq!(repo.get_unit_lesson_count(unit).await.unwrap(), 2);
        assert!(matches!(
            repo.delete_lesson(LessonId::new(3)).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn subjects_and_units_list_in_display_order() {
        let (repo, unit) = seeded().await;
        repo.upsert_subject(&SubjectRecord::new(SubjectId::new(2), "Art").unwrap())
            .await
            .unwrap();
        let early = UnitRecord::new(UnitId::new(5), Some(SubjectId::new(1)), "Numbers", 0).unwrap();
        let loose = UnitRecord::new(UnitId::new(6), None, "Loose", 0).unwrap();
        repo.upsert_unit(&early).await.unwrap();
        repo.upsert_unit(&loose).await.unwrap();

        let names: Vec<_> = repo
            .list_subjects()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Art", "Math"]);

        let units: Vec<_> = repo
            .list_subject_units(SubjectId::new(1))
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(units, vec![early.id, unit]);
        assert!(repo.list_subject_units(SubjectId::new(2)).await.unwrap().is_empty());
    }
}
