//! Derived XP/level statistics.
//!
//! Aggregates are never persisted. They are rebuilt from the completed-progress
//! join whenever a session starts or refreshes, and adjusted in place by
//! signed [`XpDelta`]s while optimistic mutations are in flight.

use std::collections::HashMap;

use serde::Serialize;

use crate::level::level;
use crate::model::{LessonId, SubjectId};

//
// ─── INPUT ─────────────────────────────────────────────────────────────────────
//

/// Subject identity carried through the lesson → unit → subject join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubjectRef {
    pub id: SubjectId,
    pub name: String,
}

impl SubjectRef {
    #[must_use]
    pub fn new(id: SubjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// One completed lesson, already joined to its subject.
///
/// `subject` is `None` when the lesson's unit or the unit's subject is missing;
/// such rows are excluded from every aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedLesson {
    pub lesson_id: LessonId,
    pub xp_value: Option<u32>,
    pub subject: Option<SubjectRef>,
}

//
// ─── OUTPUT ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectAggregate {
    pub id: SubjectId,
    pub name: String,
    pub xp: u64,
    pub level: u32,
    /// Number of completed lessons contributing to `xp`.
    pub completed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GlobalAggregate {
    pub xp: u64,
    pub level: u32,
    pub completed: u32,
}

impl Default for GlobalAggregate {
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            completed: 0,
        }
    }
}

/// Direction of an XP adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XpDirection {
    Gain,
    Loss,
}

/// Signed XP adjustment for one subject (and therefore the global total).
///
/// Carries one completed lesson worth of XP; `inverse()` undoes it exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpDelta {
    pub subject: SubjectRef,
    pub amount: u32,
    pub direction: XpDirection,
}

impl XpDelta {
    #[must_use]
    pub fn gain(subject: SubjectRef, amount: u32) -> Self {
        Self {
            subject,
            amount,
            direction: XpDirection::Gain,
        }
    }

    #[must_use]
    pub fn loss(subject: SubjectRef, amount: u32) -> Self {
        Self {
            subject,
            amount,
            direction: XpDirection::Loss,
        }
    }

    #[must_use]
    pub fn inverse(&self) -> Self {
        let direction = match self.direction {
            XpDirection::Gain => XpDirection::Loss,
            XpDirection::Loss => XpDirection::Gain,
        };
        Self {
            subject: self.subject.clone(),
            amount: self.amount,
            direction,
        }
    }
}

/// Global and per-subject aggregates for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressAggregates {
    global: GlobalAggregate,
    subjects: HashMap<SubjectId, SubjectAggregate>,
}

impl ProgressAggregates {
    /// Builds aggregates in a single pass over completed lessons.
    ///
    /// Unlinked rows are skipped and a missing `xp_value` counts as zero.
    #[must_use]
    pub fn build<'a>(rows: impl IntoIterator<Item = &'a CompletedLesson>) -> Self {
        let mut global = GlobalAggregate::default();
        let mut subjects: HashMap<SubjectId, SubjectAggregate> = HashMap::new();

        for row in rows {
            let Some(subject) = row.subject.as_ref() else {
                continue;
            };
            let xp = u64::from(row.xp_value.unwrap_or(0));

            global.xp += xp;
            global.completed += 1;

            let entry = subjects
                .entry(subject.id)
                .or_insert_with(|| SubjectAggregate {
                    id: subject.id,
                    name: subject.name.clone(),
                    xp: 0,
                    level: 1,
                    completed: 0,
                });
            entry.xp += xp;
            entry.completed += 1;
        }

        global.level = level(global.xp);
        for subject in subjects.values_mut() {
            subject.level = level(subject.xp);
        }

        Self { global, subjects }
    }

    #[must_use]
    pub fn global(&self) -> GlobalAggregate {
        self.global
    }

    #[must_use]
    pub fn subject(&self, id: SubjectId) -> Option<&SubjectAggregate> {
        self.subjects.get(&id)
    }

    #[must_use]
    pub fn subjects(&self) -> &HashMap<SubjectId, SubjectAggregate> {
        &self.subjects
    }

    /// Subjects ordered by name, then id.
    #[must_use]
    pub fn subjects_sorted(&self) -> Vec<&SubjectAggregate> {
        let mut list: Vec<_> = self.subjects.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        list
    }

    /// Adjusts one subject and the global total, then recomputes their levels.
    ///
    /// A subject whose completed count drops to zero is removed, so applying a
    /// delta and then its inverse restores the previous value exactly.
    pub fn apply_delta(&mut self, delta: &XpDelta) {
        let amount = u64::from(delta.amount);
        match delta.direction {
            XpDirection::Gain => {
                self.global.xp += amount;
                self.global.completed += 1;

                let entry = self
                    .subjects
                    .entry(delta.subject.id)
                    .or_insert_with(|| SubjectAggregate {
                        id: delta.subject.id,
                        name: delta.subject.name.clone(),
                        xp: 0,
                        level: 1,
                        completed: 0,
                    });
                entry.xp += amount;
                entry.completed += 1;
                entry.level = level(entry.xp);
            }
            XpDirection::Loss => {
                self.global.xp = self.global.xp.saturating_sub(amount);
                self.global.completed = self.global.completed.saturating_sub(1);

                let emptied = match self.subjects.get_mut(&delta.subject.id) {
                    Some(entry) => {
                        entry.xp = entry.xp.saturating_sub(amount);
                        entry.completed = entry.completed.saturating_sub(1);
                        entry.level = level(entry.xp);
                        entry.completed == 0
                    }
                    None => false,
                };
                if emptied {
                    self.subjects.remove(&delta.subject.id);
                }
            }
        }
        self.global.level = level(self.global.xp);
    }

    /// True when the global total equals the sum over subjects.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let xp: u64 = self.subjects.values().map(|s| s.xp).sum();
        let completed: u32 = self.subjects.values().map(|s| s.completed).sum();
        xp == self.global.xp && completed == self.global.completed
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
