#![forbid(unsafe_code)]

pub mod aggregate;
pub mod error;
pub mod level;
pub mod model;
pub mod time;

pub use aggregate::{
    CompletedLesson, GlobalAggregate, ProgressAggregates, SubjectAggregate, SubjectRef, XpDelta,
    XpDirection,
};
pub use error::ValidationError;
pub use level::{LevelProgress, level, xp_for_level};
pub use time::Clock;
