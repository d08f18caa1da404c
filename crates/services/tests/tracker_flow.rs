mod support;

use std::sync::Arc;

use learn_core::model::{
    AchievementId, Confidence, LessonId, ProgressPatch, TrackerSettings, UserId, builtin,
};
use services::{
    CollectingNotifier, MutationError, MutationOutcome, Notice, NoteStatus, ProgressTracker,
    TrackerError,
};
use storage::repository::{InMemoryRepository, ProgressRepository, Storage};

use support::{
    BASICS, BASICS_DONE, LOOSE, MATH, MORE, complete, gated_list_storage, make_admin, seeded_repo,
};

async fn open(repo: &InMemoryRepository, user: UserId) -> (ProgressTracker, CollectingNotifier) {
    let notifier = CollectingNotifier::new();
    let tracker = ProgressTracker::open(
        user,
        Storage::from_in_memory(repo.clone()),
        TrackerSettings::default(),
        Arc::new(notifier.clone()),
    )
    .await
    .expect("open tracker");
    (tracker, notifier)
}

fn unlocked_ids(outcome: &MutationOutcome) -> Vec<&str> {
    match outcome {
        MutationOutcome::Persisted { unlocked } => unlocked.iter().map(|u| u.id.as_str()).collect(),
        other => panic!("expected Persisted, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_toggle_restores_subject_and_global_xp() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    complete(&repo, user, [1]).await;
    let (tracker, notifier) = open(&repo, user).await;
    tracker.load_unit(BASICS).await.unwrap();

    let before = tracker.aggregates();
    assert_eq!(tracker.subject(MATH).unwrap().xp, 5);

    repo.fail_next_upserts(1);
    let pending = tracker.toggle_completion(LessonId::new(2)).unwrap();

    // optimistic change is visible before the write settles
    assert_eq!(tracker.subject(MATH).unwrap().xp, 25);
    assert_eq!(tracker.global().xp, 25);
    assert!(tracker.lesson(LessonId::new(2)).unwrap().pending);

    let outcome = pending.outcome().await.unwrap();
    assert!(matches!(outcome, MutationOutcome::RolledBack { .. }));
    assert_eq!(tracker.aggregates(), before);
    assert_eq!(tracker.subject(MATH).unwrap().xp, 5);

    let lesson = tracker.lesson(LessonId::new(2)).unwrap();
    assert!(!lesson.completed);
    assert!(!lesson.pending);

    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert!(matches!(
        &notices[0],
        Notice::MutationRolledBack { lesson_id, .. } if *lesson_id == LessonId::new(2)
    ));
}

#[tokio::test]
async fn first_completion_unlocks_first_spark_and_refreshes() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    let (tracker, notifier) = open(&repo, user).await;
    tracker.load_unit(BASICS).await.unwrap();

    let outcome = tracker
        .toggle_completion(LessonId::new(1))
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert_eq!(unlocked_ids(&outcome), vec![builtin::FIRST_SPARK]);
    assert_eq!(
        notifier.notices(),
        vec![Notice::AchievementUnlocked {
            id: AchievementId::from_static(builtin::FIRST_SPARK),
            title: "First Spark".into(),
        }]
    );

    let global = tracker.global();
    assert_eq!((global.xp, global.completed, global.level), (5, 1, 1));
    assert!(tracker.aggregates().is_consistent());
    assert_eq!(tracker.unlocked_achievements().await.unwrap().len(), 1);
}

#[tokio::test]
async fn fifth_completion_unlocks_five_lessons() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    complete(&repo, user, 4..=7).await;
    let (tracker, _) = open(&repo, user).await;
    tracker.load_unit(MORE).await.unwrap();

    let outcome = tracker
        .toggle_completion(LessonId::new(8))
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert_eq!(unlocked_ids(&outcome), vec![builtin::FIVE_LESSONS]);
}

#[tokio::test]
async fn unit_achievement_needs_every_lesson() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    complete(&repo, user, [1]).await;
    let (tracker, _) = open(&repo, user).await;
    tracker.load_unit(BASICS).await.unwrap();

    let second = tracker
        .toggle_completion(LessonId::new(2))
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert!(unlocked_ids(&second).is_empty());

    let third = tracker
        .toggle_completion(LessonId::new(3))
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert_eq!(unlocked_ids(&third), vec![BASICS_DONE]);

    // un-completing and completing again never unlocks twice
    for _ in 0..2 {
        let again = tracker
            .toggle_completion(LessonId::new(3))
            .unwrap()
            .outcome()
            .await
            .unwrap();
        assert!(unlocked_ids(&again).is_empty());
    }
    let unlocks = tracker.unlocked_achievements().await.unwrap();
    assert_eq!(
        unlocks
            .iter()
            .filter(|u| u.achievement_id.as_str() == BASICS_DONE)
            .count(),
        1
    );
}

#[tokio::test]
async fn unlinked_lesson_completes_without_moving_xp() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    let (tracker, _) = open(&repo, user).await;
    let lessons = tracker.load_unit(LOOSE).await.unwrap();
    assert!(lessons[0].subject.is_none());

    let outcome = tracker
        .toggle_completion(LessonId::new(10))
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert!(matches!(outcome, MutationOutcome::Persisted { .. }));
    assert!(tracker.lesson(LessonId::new(10)).unwrap().completed);
    assert_eq!(tracker.global().xp, 0);
    assert!(tracker.aggregates().subjects().is_empty());
}

#[tokio::test]
async fn confidence_change_persists_without_xp() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    let (tracker, _) = open(&repo, user).await;
    tracker.load_unit(BASICS).await.unwrap();

    let outcome = tracker
        .change_confidence(LessonId::new(2), Confidence::Unsure)
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert_eq!(outcome, MutationOutcome::Persisted { unlocked: vec![] });
    assert_eq!(tracker.global().xp, 0);

    let stored = repo.list_progress(user, &[LessonId::new(2)]).await.unwrap();
    assert_eq!(stored[0].confidence, Some(Confidence::Unsure));
    assert!(!stored[0].completed);
}

#[tokio::test]
async fn unknown_lesson_is_rejected_before_any_change() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    let (tracker, _) = open(&repo, user).await;
    tracker.load_unit(BASICS).await.unwrap();
    let before = tracker.aggregates();

    let err = tracker.toggle_completion(LessonId::new(99)).unwrap_err();
    assert!(matches!(err, MutationError::UnknownLesson(id) if id == LessonId::new(99)));
    assert_eq!(tracker.aggregates(), before);
    assert!(repo.upsert_log().is_empty());
}

#[tokio::test]
async fn load_unit_orders_lessons_and_rejects_unknown_units() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    complete(&repo, user, [2]).await;
    let (tracker, _) = open(&repo, user).await;

    let lessons = tracker.load_unit(BASICS).await.unwrap();
    let ids: Vec<_> = lessons.iter().map(|l| l.lesson.id.value()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(lessons[1].completed);
    assert_eq!(lessons[0].note_status, NoteStatus::Clean);
    assert_eq!(tracker.current_unit().unwrap().id, BASICS);

    let err = tracker
        .load_unit(learn_core::model::UnitId::new(77))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::UnknownUnit(_)));
}

#[tokio::test]
async fn reload_keeps_unsaved_local_drafts() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    let (tracker, _) = open(&repo, user).await;
    tracker.load_unit(BASICS).await.unwrap();

    tracker.notes().edit(LessonId::new(1), "half-written").unwrap();
    tracker.load_unit(BASICS).await.unwrap();

    let lesson = tracker.lesson(LessonId::new(1)).unwrap();
    assert_eq!(lesson.note.as_deref(), Some("half-written"));
    assert_eq!(lesson.note_status, NoteStatus::Dirty);
}

#[tokio::test]
async fn refresh_picks_up_remote_changes_when_quiescent() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    let (tracker, _) = open(&repo, user).await;
    assert_eq!(tracker.global().xp, 0);

    repo.upsert_progress(user, LessonId::new(2), &ProgressPatch::new().completed(true))
        .await
        .unwrap();
    assert!(tracker.refresh().await.unwrap());
    assert_eq!(tracker.global().xp, 20);
    assert_eq!(tracker.subject(MATH).unwrap().level, 1);
}

#[tokio::test]
async fn deleting_lessons_requires_admin() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    complete(&repo, user, [1, 2]).await;
    let (tracker, _) = open(&repo, user).await;
    tracker.load_unit(BASICS).await.unwrap();

    let err = tracker.delete_lesson(LessonId::new(2)).await.unwrap_err();
    assert!(matches!(err, MutationError::Forbidden));
    assert!(tracker.lesson(LessonId::new(2)).is_some());

    make_admin(&repo, user).await;
    tracker.delete_lesson(LessonId::new(2)).await.unwrap();
    assert!(tracker.lesson(LessonId::new(2)).is_none());
    assert_eq!(tracker.lessons().len(), 2);
    assert_eq!(tracker.global().xp, 5);
}

#[tokio::test]
async fn lesson_settled_during_reload_keeps_its_local_values() {
    let repo = seeded_repo().await;
    let user = UserId::random();
    let (storage, gate) = gated_list_storage(&repo);
    let tracker = Arc::new(
        ProgressTracker::open(
            user,
            storage,
            TrackerSettings::default(),
            Arc::new(CollectingNotifier::new()),
        )
        .await
        .unwrap(),
    );
    tracker.load_unit(BASICS).await.unwrap();

    let release = gate.arm();
    let reload = tokio::spawn({
        let tracker = Arc::clone(&tracker);
        async move { tracker.load_unit(BASICS).await }
    });
    gate.entered().await;

    let lesson = LessonId::new(2);
    let outcome = tracker.toggle_completion(lesson).unwrap().outcome().await.unwrap();
    assert!(matches!(outcome, MutationOutcome::Persisted { .. }));
    release.send(()).unwrap();
    reload.await.unwrap().unwrap();

    assert!(tracker.lesson(lesson).unwrap().completed);
    assert_eq!(tracker.global().xp, 20);

    tracker.toggle_completion(lesson).unwrap().outcome().await.unwrap();
    assert_eq!(tracker.global().xp, 0);
    let stored = repo.fetch_completed_progress(user).await.unwrap();
    assert!(stored.iter().all(|row| !row.completed));
}
