//! User-facing notices raised by background work.
//!
//! Mutations settle on worker tasks, so their outcomes reach the learner
//! through a [`Notifier`] rather than a return value.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

use learn_core::model::{AchievementId, LessonId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    AchievementUnlocked { id: AchievementId, title: String },
    NoteSaveFailed { lesson_id: LessonId, message: String },
    MutationRolledBack { lesson_id: LessonId, reason: String },
}

/// Sink for notices. Called from worker tasks, so it must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::AchievementUnlocked { id, title } => {
                info!(achievement_id = %id, %title, "achievement unlocked");
            }
            Notice::NoteSaveFailed { lesson_id, message } => {
                warn!(%lesson_id, %message, "note save failed");
            }
            Notice::MutationRolledBack { lesson_id, reason } => {
                warn!(%lesson_id, %reason, "change rolled back");
            }
        }
    }
}

/// Keeps every notice in memory until drained.
#[derive(Debug, Clone, Default)]
pub struct CollectingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl CollectingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything collected so far.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drains collected notices.
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}
