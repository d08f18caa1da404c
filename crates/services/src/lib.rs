#![forbid(unsafe_code)]

pub mod achievements;
mod command;
pub mod error;
pub mod mutation;
pub mod notes;
pub mod notify;
pub mod state;
pub mod tracker;
mod write_queue;

pub use learn_core::Clock;

pub use achievements::{AchievementEvaluator, UnlockedAchievement};
pub use error::{AchievementError, MutationError, NoteSaveError, TrackerError};
pub use mutation::{Mutation, MutationController, MutationOutcome, PendingMutation};
pub use notes::NoteBuffer;
pub use notify::{CollectingNotifier, Notice, Notifier, TracingNotifier};
pub use state::{LessonView, NoteStatus, Snapshot};
pub use tracker::ProgressTracker;
