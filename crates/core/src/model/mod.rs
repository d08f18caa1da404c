mod achievement;
mod catalog;
mod ids;
mod profile;
mod progress;
mod settings;

pub use ids::{AchievementId, LessonId, ParseIdError, SubjectId, UnitId, UserId};

pub use achievement::{AchievementDefinition, AchievementUnlock, builtin};
pub use catalog::{LessonRecord, SubjectRecord, UnitRecord};
pub use profile::Profile;
pub use progress::{Confidence, ProgressPatch, ProgressRecord};
pub use settings::{CountRule, SettingsError, ThresholdPolicy, TrackerSettings};
