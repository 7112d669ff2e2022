//! Consecutive-day streak arithmetic.

use chrono::NaiveDate;

use crate::model::Progress;

/// New streak value and last-visit date after evaluating a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub streak: u32,
    pub last_visit: Option<NaiveDate>,
}

/// Evaluate a visit on `today` against the recorded streak.
///
/// - first visit ever: streak becomes 1
/// - same day: unchanged, so repeated calls are idempotent
/// - next day: streak + 1
/// - any larger gap: streak resets to 1
///
/// A `today` earlier than the last visit (clock moved backwards) leaves both
/// values untouched.
#[must_use]
pub fn update_streak(
    current_streak: u32,
    last_visit: Option<NaiveDate>,
    today: NaiveDate,
) -> StreakUpdate {
    let Some(last) = last_visit else {
        return StreakUpdate {
            streak: 1,
            last_visit: Some(today),
        };
    };

    let streak = match (today - last).num_days() {
        gap if gap <= 0 => {
            return StreakUpdate {
                streak: current_streak,
                last_visit: Some(last),
            };
        }
        1 => current_streak.saturating_add(1),
        _ => 1,
    };

    StreakUpdate {
        streak,
        last_visit: Some(today),
    }
}

/// Convenience wrapper evaluating a visit against a progress snapshot.
#[must_use]
pub fn update_streak_for(progress: &Progress, today: NaiveDate) -> StreakUpdate {
    update_streak(progress.streak(), progress.last_visit(), today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_today;
    use chrono::Duration;

    #[test]
    fn first_visit_starts_streak() {
        let today = fixed_today();
        let update = update_streak(0, None, today);
        assert_eq!(update.streak, 1);
        assert_eq!(update.last_visit, Some(today));
    }

    #[test]
    fn same_day_is_idempotent() {
        let today = fixed_today();
        let once = update_streak(4, Some(today - Duration::days(1)), today);
        let twice = update_streak(once.streak, once.last_visit, today);
        assert_eq!(once, twice);
        assert_eq!(twice.streak, 5);
    }

    #[test]
    fn consecutive_day_increments() {
        let today = fixed_today();
        let update = update_streak(2, Some(today - Duration::days(1)), today);
        assert_eq!(update.streak, 3);
        assert_eq!(update.last_visit, Some(today));
    }

    #[test]
    fn gap_resets_to_one() {
        let today = fixed_today();
        for gap in [2, 3, 30] {
            let update = update_streak(9, Some(today - Duration::days(gap)), today);
            assert_eq!(update.streak, 1, "gap of {gap} days");
            assert_eq!(update.last_visit, Some(today));
        }
    }

    #[test]
    fn backwards_clock_keeps_state() {
        let today = fixed_today();
        let later = today + Duration::days(2);
        let update = update_streak(6, Some(later), today);
        assert_eq!(update.streak, 6);
        assert_eq!(update.last_visit, Some(later));
    }
}
