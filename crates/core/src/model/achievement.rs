use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ValidationError;
use crate::model::ids::{AchievementId, UserId};

/// Keys of the achievements the count rules unlock by default.
pub mod builtin {
    pub const FIRST_SPARK: &str = "first_spark";
    pub const FIVE_LESSONS: &str = "five_lessons";
    pub const TEN_LESSONS: &str = "ten_lessons";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementDefinition {
    pub id: AchievementId,
    pub title: String,
    pub description: Option<String>,
}

impl AchievementDefinition {
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyTitle` if the title is blank.
    pub fn new(
        id: AchievementId,
        title: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self, ValidationError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle("achievement"));
        }
        Ok(Self {
            id,
            title: title.trim().to_string(),
            description,
        })
    }
}

/// One-time unlock event, unique per `(user_id, achievement_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementUnlock {
    pub user_id: UserId,
    pub achievement_id: AchievementId,
    pub unlocked_at: DateTime<Utc>,
}
