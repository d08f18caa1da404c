use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::ids::{LessonId, UserId};

//
// ─── CONFIDENCE ────────────────────────────────────────────────────────────────
//

/// Self-reported understanding of a lesson, from lost to confident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Lost,
    Unsure,
    Neutral,
    Good,
    Confident,
}

impl Confidence {
    pub const ALL: [Confidence; 5] = [
        Confidence::Lost,
        Confidence::Unsure,
        Confidence::Neutral,
        Confidence::Good,
        Confidence::Confident,
    ];

    /// Stable storage code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Lost => "lost",
            Confidence::Unsure => "unsure",
            Confidence::Neutral => "neutral",
            Confidence::Good => "good",
            Confidence::Confident => "confident",
        }
    }

    /// Marker shown next to the level in the lesson list.
    #[must_use]
    pub fn emoji(self) -> &'static str {
        match self {
            Confidence::Lost => "🤯",
            Confidence::Unsure => "🤔",
            Confidence::Neutral => "😐",
            Confidence::Good => "🙂",
            Confidence::Confident => "😎",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = ValidationError;

    /// Accepts storage codes (case-insensitive) and the emoji markers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Confidence::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed) || c.emoji() == trimmed)
            .ok_or_else(|| ValidationError::InvalidConfidence(s.to_string()))
    }
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Per-user state of one lesson. Unique per `(user_id, lesson_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressRecord {
    pub user_id: UserId,
    pub lesson_id: LessonId,
    pub completed: bool,
    pub confidence: Option<Confidence>,
    pub note: Option<String>,
}

impl ProgressRecord {
    /// The implicit record of a lesson the user has never touched.
    #[must_use]
    pub fn untouched(user_id: UserId, lesson_id: LessonId) -> Self {
        Self {
            user_id,
            lesson_id,
            completed: false,
            confidence: None,
            note: None,
        }
    }

    /// Overwrites the fields present in `patch`.
    pub fn apply(&mut self, patch: &ProgressPatch) {
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(confidence) = patch.confidence {
            self.confidence = confidence;
        }
        if let Some(note) = &patch.note {
            self.note.clone_from(note);
        }
    }
}

/// Partial update for an upsert keyed by `(user, lesson)`.
///
/// `None` leaves the stored field untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressPatch {
    pub completed: Option<bool>,
    pub confidence: Option<Option<Confidence>>,
    pub note: Option<Option<String>>,
}

impl ProgressPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    #[must_use]
    pub fn confidence(mut self, confidence: Option<Confidence>) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[must_use]
    pub fn note(mut self, note: Option<String>) -> Self {
        self.note = Some(note);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_none() && self.confidence.is_none() && self.note.is_none()
    }
}
