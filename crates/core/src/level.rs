//! Level curve shared by subject and global aggregates.
//!
//! `level = floor(1 + sqrt(xp) / 5)`. Evaluated with an integer square root so
//! the result is exact for every `u64`: `floor(sqrt(x) / 5)` equals
//! `floor(isqrt(x) / 5)` for non-negative `x`.

use serde::Serialize;

const LEVEL_DIVISOR: u64 = 5;

/// Maps cumulative XP to a level. `level(0) == 1`, non-decreasing in `xp`.
#[must_use]
pub fn level(xp: u64) -> u32 {
    let steps = xp.isqrt() / LEVEL_DIVISOR;
    // isqrt(u64::MAX) / 5 < u32::MAX
    u32::try_from(steps).map_or(u32::MAX, |s| s.saturating_add(1))
}

/// Minimum XP at which `level` starts (`25 * (level - 1)^2`).
#[must_use]
pub fn xp_for_level(level: u32) -> u64 {
    let steps = u64::from(level.saturating_sub(1)) * LEVEL_DIVISOR;
    steps.saturating_mul(steps)
}

/// Position of an XP total within its level, for progress bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub level: u32,
    pub xp_into_level: u64,
    pub xp_to_next: u64,
}

impl LevelProgress {
    #[must_use]
    pub fn from_xp(xp: u64) -> Self {
        let level = level(xp);
        let floor = xp_for_level(level);
        let next = xp_for_level(level.saturating_add(1));
        Self {
            level,
            xp_into_level: xp - floor,
            xp_to_next: next.saturating_sub(xp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_examples_hold() {
        assert_eq!(level(0), 1);
        assert_eq!(level(24), 1);
        assert_eq!(level(25), 2);
        assert_eq!(level(99), 2);
        assert_eq!(level(100), 3);
        assert_eq!(level(225), 4);
    }

    #[test]
    fn level_is_monotonic() {
        let mut previous = level(0);
        for xp in 1..=20_000 {
            let current = level(xp);
            assert!(current >= previous, "level dropped at xp={xp}");
            previous = current;
        }
    }

    #[test]
    fn matches_float_formula_on_small_values() {
        for xp in 0_u32..5_000 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let expected = (1.0 + f64::from(xp).sqrt() / 5.0).floor() as u32;
            assert_eq!(level(u64::from(xp)), expected, "xp={xp}");
        }
    }

    #[test]
    fn extreme_xp_does_not_overflow() {
        assert!(level(u64::MAX) > 1);
        assert_eq!(xp_for_level(u32::MAX), u64::MAX);
    }

    #[test]
    fn level_thresholds_line_up_with_curve() {
        for lvl in 1..50 {
            let start = xp_for_level(lvl);
            assert_eq!(level(start), lvl);
            if start > 0 {
                assert_eq!(level(start - 1), lvl - 1);
            }
        }
    }

    #[test]
    fn progress_within_level() {
        let p = LevelProgress::from_xp(30);
        assert_eq!(p.level, 2);
        assert_eq!(p.xp_into_level, 5);
        assert_eq!(p.xp_to_next, 70);
    }
}
