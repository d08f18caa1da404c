//! Progress changes as reversible commands.
//!
//! A command records the lesson's values before the change, the forward
//! effect applied optimistically, and the inverse computed up front so a
//! rollback never has to re-derive XP from state that may have moved on.

use learn_core::model::{LessonId, UnitId};
use learn_core::{ProgressAggregates, XpDelta};

use crate::state::{LessonEntry, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Effect {
    pub snapshot: Snapshot,
    pub xp: Option<XpDelta>,
}

impl Effect {
    pub fn apply(&self, entry: &mut LessonEntry, aggregates: &mut ProgressAggregates) {
        entry.current = self.snapshot;
        if let Some(delta) = &self.xp {
            aggregates.apply_delta(delta);
        }
    }
}

/// XP movement for a completion flip. Unlinked lessons never move XP.
fn xp_change(entry: &LessonEntry, from: bool, to: bool) -> Option<XpDelta> {
    if from == to {
        return None;
    }
    let subject = entry.subject.clone()?;
    let amount = entry.lesson.xp();
    Some(if to {
        XpDelta::gain(subject, amount)
    } else {
        XpDelta::loss(subject, amount)
    })
}

#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub lesson_id: LessonId,
    pub unit_id: UnitId,
    pub version: u64,
    pub origin: Snapshot,
    pub forward: Effect,
    pub inverse: Effect,
}

impl Command {
    /// Builds the command moving `entry` from its current values to `target`.
    pub fn new(entry: &LessonEntry, target: Snapshot, version: u64) -> Self {
        let origin = entry.current;
        let forward = Effect {
            snapshot: target,
            xp: xp_change(entry, origin.completed, target.completed),
        };
        let inverse = Effect {
            snapshot: origin,
            xp: forward.xp.as_ref().map(XpDelta::inverse),
        };
        Self {
            lesson_id: entry.lesson.id,
            unit_id: entry.lesson.unit_id,
            version,
            origin,
            forward,
            inverse,
        }
    }

    /// True for a not-completed to completed transition.
    pub fn completes_lesson(&self) -> bool {
        !self.origin.completed && self.forward.snapshot.completed
    }
}

/// Effect that moves `entry` from its local values back to the last
/// store-acknowledged ones.
pub(crate) fn compensation(entry: &LessonEntry) -> Effect {
    Effect {
        snapshot: entry.confirmed,
        xp: xp_change(entry, entry.current.completed, entry.confirmed.completed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::{Confidence, LessonRecord, SubjectId};
    use learn_core::{CompletedLesson, SubjectRef};

    fn math() -> SubjectRef {
        SubjectRef::new(SubjectId::new(1), "Math")
    }

    fn entry(xp: u32, subject: Option<SubjectRef>) -> LessonEntry {
        let lesson =
            LessonRecord::new(LessonId::new(7), UnitId::new(1), "Vectors", Some(xp), 1).unwrap();
        LessonEntry::from_record(lesson, subject, None)
    }

    fn five_xp_math() -> ProgressAggregates {
        ProgressAggregates::build(&[CompletedLesson {
            lesson_id: LessonId::new(1),
            xp_value: Some(5),
            subject: Some(math()),
        }])
    }

    #[test]
    fn toggle_then_inverse_restores_subject_and_global() {
        let mut agg = five_xp_math();
        let before = agg.clone();
        let mut e = entry(20, Some(math()));

        let cmd = Command::new(
            &e,
            Snapshot {
                completed: true,
                confidence: None,
            },
            1,
        );
        assert!(cmd.completes_lesson());
        cmd.forward.apply(&mut e, &mut agg);
        assert_eq!(agg.subject(SubjectId::new(1)).unwrap().xp, 25);
        assert_eq!(agg.global().xp, 25);

        cmd.inverse.apply(&mut e, &mut agg);
        assert_eq!(agg, before);
        assert_eq!(agg.subject(SubjectId::new(1)).unwrap().xp, 5);
        assert!(!e.current.completed);
    }

    #[test]
    fn confidence_change_moves_no_xp() {
        let e = entry(20, Some(math()));
        let cmd = Command::new(
            &e,
            Snapshot {
                completed: false,
                confidence: Some(Confidence::Unsure),
            },
            1,
        );
        assert!(cmd.forward.xp.is_none());
        assert!(cmd.inverse.xp.is_none());
        assert!(!cmd.completes_lesson());
        assert_eq!(cmd.inverse.snapshot, Snapshot::default());
    }

    #[test]
    fn unlinked_lesson_flips_without_xp() {
        let e = entry(20, None);
        let cmd = Command::new(
            &e,
            Snapshot {
                completed: true,
                confidence: None,
            },
            1,
        );
        assert!(cmd.forward.xp.is_none());
        assert!(cmd.completes_lesson());
    }

    #[test]
    fn compensation_returns_to_confirmed_values() {
        let mut agg = five_xp_math();
        let before = agg.clone();
        let mut e = entry(20, Some(math()));

        // two optimistic toggles on top of an unconfirmed start
        let first = Command::new(
            &e,
            Snapshot {
                completed: true,
                confidence: None,
            },
            1,
        );
        first.forward.apply(&mut e, &mut agg);
        let second = Command::new(
            &e,
            Snapshot {
                completed: true,
                confidence: Some(Confidence::Good),
            },
            2,
        );
        second.forward.apply(&mut e, &mut agg);

        compensation(&e).apply(&mut e, &mut agg);
        assert_eq!(e.current, e.confirmed);
        assert_eq!(agg, before);
    }
}
