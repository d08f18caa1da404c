use serde::Serialize;

use crate::error::ValidationError;
use crate::model::ids::{AchievementId, LessonId, SubjectId, UnitId};

fn require_title(kind: &'static str, title: String) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle(kind));
    }
    Ok(trimmed.to_string())
}

//
// ─── SUBJECT ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectRecord {
    pub id: SubjectId,
    pub name: String,
}

impl SubjectRecord {
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyTitle` if the name is blank.
    pub fn new(id: SubjectId, name: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            id,
            name: require_title("subject", name.into())?,
        })
    }
}

//
// ─── UNIT ──────────────────────────────────────────────────────────────────────
//

/// Ordered group of lessons inside a subject.
///
/// `subject_id` is optional because content can be authored before it is
/// attached to a subject; lessons of an unlinked unit never count toward XP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitRecord {
    pub id: UnitId,
    pub subject_id: Option<SubjectId>,
    pub title: String,
    pub order: u32,
    /// Achievement unlocked once every lesson in the unit is completed.
    pub linked_achievement: Option<AchievementId>,
}

impl UnitRecord {
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyTitle` if the title is blank.
    pub fn new(
        id: UnitId,
        subject_id: Option<SubjectId>,
        title: impl Into<String>,
        order: u32,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id,
            subject_id,
            title: require_title("unit", title.into())?,
            order,
            linked_achievement: None,
        })
    }

    #[must_use]
    pub fn with_achievement(mut self, achievement: AchievementId) -> Self {
        self.linked_achievement = Some(achievement);
        self
    }
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonRecord {
    pub id: LessonId,
    pub unit_id: UnitId,
    pub title: String,
    /// Missing values count as zero XP.
    pub xp_value: Option<u32>,
    pub order: u32,
}

impl LessonRecord {
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyTitle` if the title is blank.
    pub fn new(
        id: LessonId,
        unit_id: UnitId,
        title: impl Into<String>,
        xp_value: Option<u32>,
        order: u32,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id,
            unit_id,
            title: require_title("lesson", title.into())?,
            xp_value,
            order,
        })
    }

    #[must_use]
    pub fn xp(&self) -> u32 {
        self.xp_value.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_trimmed_and_required() {
        let lesson = LessonRecord::new(LessonId::new(1), UnitId::new(1), "  Limits ", Some(10), 1)
            .unwrap();
        assert_eq!(lesson.title, "Limits");

        let err = UnitRecord::new(UnitId::new(1), None, "   ", 0).unwrap_err();
        assert_eq!(err, ValidationError::EmptyTitle("unit"));
        assert!(SubjectRecord::new(SubjectId::new(1), "").is_err());
    }

    #[test]
    fn missing_xp_counts_as_zero() {
        let lesson = LessonRecord::new(LessonId::new(1), UnitId::new(1), "Intro", None, 1).unwrap();
        assert_eq!(lesson.xp(), 0);
    }

    #[test]
    fn unit_links_achievement() {
        let unit = UnitRecord::new(UnitId::new(3), Some(SubjectId::new(1)), "Vectors", 2)
            .unwrap()
            .with_achievement(AchievementId::from_static("vector_master"));
        assert_eq!(
            unit.linked_achievement.as_ref().map(AchievementId::as_str),
            Some("vector_master")
        );
    }
}
