use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::model::achievement::builtin;
use crate::model::ids::AchievementId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("count thresholds must be > 0")]
    ZeroThreshold,

    #[error("count threshold {0} is declared more than once")]
    DuplicateThreshold(u32),

    #[error("unknown threshold policy: {0:?} (expected `exact` or `at-least`)")]
    UnknownPolicy(String),
}

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// How count rules compare the completed-lesson count with their threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdPolicy {
    /// Fires only when the count equals the threshold. A count that jumps
    /// past a threshold skips that achievement.
    #[default]
    Exact,
    /// Fires for every threshold the count has reached.
    AtLeast,
}

impl ThresholdPolicy {
    #[must_use]
    pub fn matches(self, count: u64, threshold: u32) -> bool {
        match self {
            ThresholdPolicy::Exact => count == u64::from(threshold),
            ThresholdPolicy::AtLeast => count >= u64::from(threshold),
        }
    }
}

impl fmt::Display for ThresholdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdPolicy::Exact => f.write_str("exact"),
            ThresholdPolicy::AtLeast => f.write_str("at-least"),
        }
    }
}

impl FromStr for ThresholdPolicy {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "at-least" | "at_least" | "atleast" => Ok(Self::AtLeast),
            _ => Err(SettingsError::UnknownPolicy(s.to_string())),
        }
    }
}

//
// ─── COUNT RULES ───────────────────────────────────────────────────────────────
//

/// Unlocks `achievement` when the user's total completed count hits `threshold`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRule {
    pub threshold: u32,
    pub achievement: AchievementId,
}

impl CountRule {
    #[must_use]
    pub fn new(threshold: u32, achievement: AchievementId) -> Self {
        Self {
            threshold,
            achievement,
        }
    }
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Tuning knobs for the progress tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    count_rules: Vec<CountRule>,
    threshold_policy: ThresholdPolicy,
    refresh_after_completion: bool,
    precheck_unlocks: bool,
}

impl TrackerSettings {
    /// Creates validated settings. Rules are kept sorted by threshold.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if a threshold is zero or declared twice.
    pub fn new(
        mut count_rules: Vec<CountRule>,
        threshold_policy: ThresholdPolicy,
        refresh_after_completion: bool,
        precheck_unlocks: bool,
    ) -> Result<Self, SettingsError> {
        let mut seen = HashSet::new();
        for rule in &count_rules {
            if rule.threshold == 0 {
                return Err(SettingsError::ZeroThreshold);
            }
            if !seen.insert(rule.threshold) {
                return Err(SettingsError::DuplicateThreshold(rule.threshold));
            }
        }
        count_rules.sort_by_key(|r| r.threshold);

        Ok(Self {
            count_rules,
            threshold_policy,
            refresh_after_completion,
            precheck_unlocks,
        })
    }

    #[must_use]
    pub fn count_rules(&self) -> &[CountRule] {
        &self.count_rules
    }

    #[must_use]
    pub fn threshold_policy(&self) -> ThresholdPolicy {
        self.threshold_policy
    }

    /// Whether a successful completion triggers a full aggregate refresh.
    #[must_use]
    pub fn refresh_after_completion(&self) -> bool {
        self.refresh_after_completion
    }

    /// Whether the evaluator asks the store for an existing unlock before
    /// inserting. The insert stays authoritative either way.
    #[must_use]
    pub fn precheck_unlocks(&self) -> bool {
        self.precheck_unlocks
    }

    #[must_use]
    pub fn with_threshold_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.threshold_policy = policy;
        self
    }

    #[must_use]
    pub fn with_refresh_after_completion(mut self, enabled: bool) -> Self {
        self.refresh_after_completion = enabled;
        self
    }

    #[must_use]
    pub fn with_precheck_unlocks(mut self, enabled: bool) -> Self {
        self.precheck_unlocks = enabled;
        self
    }
}

impl Default for TrackerSettings {
    /// First, fifth and tenth completed lesson, exact match.
    fn default() -> Self {
        Self {
            count_rules: vec![
                CountRule::new(1, AchievementId::from_static(builtin::FIRST_SPARK)),
                CountRule::new(5, AchievementId::from_static(builtin::FIVE_LESSONS)),
                CountRule::new(10, AchievementId::from_static(builtin::TEN_LESSONS)),
            ],
            threshold_policy: ThresholdPolicy::Exact,
            refresh_after_completion: true,
            precheck_unlocks: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(threshold: u32, key: &'static str) -> CountRule {
        CountRule::new(threshold, AchievementId::from_static(key))
    }

    #[test]
    fn default_matches_builtin_rules() {
        let settings = TrackerSettings::default();
        let thresholds: Vec<_> = settings.count_rules().iter().map(|r| r.threshold).collect();
        assert_eq!(thresholds, vec![1, 5, 10]);
        assert_eq!(settings.threshold_policy(), ThresholdPolicy::Exact);
        assert!(settings.refresh_after_completion());
    }

    #[test]
    fn rejects_zero_and_duplicate_thresholds() {
        let err = TrackerSettings::new(vec![rule(0, "a")], ThresholdPolicy::Exact, true, true)
            .unwrap_err();
        assert_eq!(err, SettingsError::ZeroThreshold);

        let err = TrackerSettings::new(
            vec![rule(3, "a"), rule(3, "b")],
            ThresholdPolicy::Exact,
            true,
            true,
        )
        .unwrap_err();
        assert_eq!(err, SettingsError::DuplicateThreshold(3));
    }

    #[test]
    fn rules_are_sorted() {
        let settings = TrackerSettings::new(
            vec![rule(10, "b"), rule(2, "a")],
            ThresholdPolicy::AtLeast,
            false,
            false,
        )
        .unwrap();
        assert_eq!(settings.count_rules()[0].threshold, 2);
    }

    #[test]
    fn policy_matching() {
        assert!(ThresholdPolicy::Exact.matches(5, 5));
        assert!(!ThresholdPolicy::Exact.matches(6, 5));
        assert!(ThresholdPolicy::AtLeast.matches(6, 5));
        assert!(!ThresholdPolicy::AtLeast.matches(4, 5));
    }

    #[test]
    fn policy_parses_from_env_style_strings() {
        assert_eq!("exact".parse::<ThresholdPolicy>().unwrap(), ThresholdPolicy::Exact);
        assert_eq!("At-Least".parse::<ThresholdPolicy>().unwrap(), ThresholdPolicy::AtLeast);
        assert!("sometimes".parse::<ThresholdPolicy>().is_err());
    }
}
