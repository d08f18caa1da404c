//! Achievement evaluation after a lesson is completed.
//!
//! Count rules and the unit rule are checked independently. The optional
//! `has_unlock` pre-check only saves a write; `insert_unlock_if_absent` is the
//! sole authority, so racing evaluations still yield one unlock record.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use learn_core::Clock;
use learn_core::model::{AchievementId, AchievementUnlock, TrackerSettings, UnitId, UserId};
use storage::repository::{AchievementRepository, CatalogRepository, UnlockInsert};

use crate::error::AchievementError;
use crate::notify::{Notice, Notifier};

/// An achievement newly unlocked by one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockedAchievement {
    pub id: AchievementId,
    pub title: String,
}

pub struct AchievementEvaluator {
    clock: Clock,
    settings: TrackerSettings,
    achievements: Arc<dyn AchievementRepository>,
    catalog: Arc<dyn CatalogRepository>,
    notifier: Arc<dyn Notifier>,
}

impl AchievementEvaluator {
    #[must_use]
    pub fn new(
        settings: TrackerSettings,
        achievements: Arc<dyn AchievementRepository>,
        catalog: Arc<dyn CatalogRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock: Clock::default(),
            settings,
            achievements,
            catalog,
            notifier,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Evaluates every rule for `user` after a completion inside `unit`.
    ///
    /// Never fails as a whole: a rule whose store calls fail is logged and
    /// skipped. Returns the achievements this call created.
    pub async fn evaluate(&self, user: UserId, unit: UnitId) -> Vec<UnlockedAchievement> {
        let mut candidates = match self.count_candidates(user).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(%user, error = %e, "count rules skipped");
                Vec::new()
            }
        };
        match self.unit_candidate(user, unit).await {
            Ok(Some(id)) => candidates.push(id),
            Ok(None) => {}
            Err(e) => warn!(%user, %unit, error = %e, "unit rule skipped"),
        }

        let mut unlocked = Vec::new();
        for id in candidates {
            match self.unlock(user, &id).await {
                Ok(Some(achievement)) => unlocked.push(achievement),
                Ok(None) => {}
                Err(e) => warn!(%user, achievement_id = %id, error = %e, "unlock failed"),
            }
        }
        unlocked
    }

    /// Count-rule achievements the user's completed total currently satisfies.
    ///
    /// # Errors
    ///
    /// Returns `AchievementError::Storage` if the count cannot be read.
    pub async fn count_candidates(
        &self,
        user: UserId,
    ) -> Result<Vec<AchievementId>, AchievementError> {
        let count = self.achievements.count_completed(user).await?;
        let policy = self.settings.threshold_policy();
        let ids = self
            .settings
            .count_rules()
            .iter()
            .filter(|rule| policy.matches(count, rule.threshold))
            .map(|rule| rule.achievement.clone())
            .collect::<Vec<_>>();
        debug!(%user, count, %policy, matched = ids.len(), "count rules evaluated");
        Ok(ids)
    }

    /// The unit's linked achievement, if every lesson in it is completed.
    ///
    /// Units without a linked achievement or without lessons never fire.
    ///
    /// # Errors
    ///
    /// Returns `AchievementError::Storage` if the unit or its counts cannot be read.
    pub async fn unit_candidate(
        &self,
        user: UserId,
        unit: UnitId,
    ) -> Result<Option<AchievementId>, AchievementError> {
        let Some(record) = self.catalog.get_unit(unit).await? else {
            return Ok(None);
        };
        let Some(linked) = record.linked_achievement else {
            return Ok(None);
        };

        let total = self.catalog.get_unit_lesson_count(unit).await?;
        if total == 0 {
            return Ok(None);
        }
        let done = self.achievements.count_completed_in_unit(user, unit).await?;
        debug!(%user, %unit, done, total, "unit rule evaluated");
        Ok((done == total).then_some(linked))
    }

    async fn unlock(
        &self,
        user: UserId,
        id: &AchievementId,
    ) -> Result<Option<UnlockedAchievement>, AchievementError> {
        if self.settings.precheck_unlocks() && self.achievements.has_unlock(user, id).await? {
            return Ok(None);
        }

        let unlock = AchievementUnlock {
            user_id: user,
            achievement_id: id.clone(),
            unlocked_at: self.clock.now(),
        };
        match self.achievements.insert_unlock_if_absent(&unlock).await? {
            UnlockInsert::AlreadyExists => {
                debug!(%user, achievement_id = %id, "already unlocked");
                Ok(None)
            }
            UnlockInsert::Created => {
                let title = self.display_title(id).await;
                info!(%user, achievement_id = %id, %title, "achievement unlocked");
                self.notifier.notify(Notice::AchievementUnlocked {
                    id: id.clone(),
                    title: title.clone(),
                });
                Ok(Some(UnlockedAchievement {
                    id: id.clone(),
                    title,
                }))
            }
        }
    }

    /// Definition title, or the raw id when the definition can't be read.
    async fn display_title(&self, id: &AchievementId) -> String {
        match self.catalog.get_achievement(id).await {
            Ok(Some(def)) => def.title,
            Ok(None) => id.to_string(),
            Err(e) => {
                debug!(achievement_id = %id, error = %e, "title lookup failed");
                id.to_string()
            }
        }
    }
}
