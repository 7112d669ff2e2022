//! Daily challenge catalogue and progress math.
//!
//! One challenge is active per calendar date. It is picked pseudo-randomly
//! but deterministically from the date, and its progress is always recomputed
//! from the current progress snapshot rather than accumulated.

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::achievements::completed_level_count;
use crate::model::{Curriculum, Progress};

/// What a challenge measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Total completed lessons.
    Lessons,
    /// Total points.
    Points,
    /// Current streak in days.
    Streak,
    /// Number of fully completed levels.
    Level,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeDefinition {
    pub id: u32,
    pub title: &'static str,
    pub description: &'static str,
    pub kind: ObjectiveKind,
    pub target: u64,
    pub reward: u32,
}

pub const CATALOGUE: &[ChallengeDefinition] = &[
    ChallengeDefinition {
        id: 1,
        title: "Complete 2 lessons",
        description: "Finish 2 lessons and earn 50 bonus points",
        kind: ObjectiveKind::Lessons,
        target: 2,
        reward: 50,
    },
    ChallengeDefinition {
        id: 2,
        title: "Keep your streak",
        description: "Practice today to keep your run of consecutive days",
        kind: ObjectiveKind::Streak,
        target: 1,
        reward: 30,
    },
    ChallengeDefinition {
        id: 3,
        title: "Earn 100 points",
        description: "Reach 100 points by answering questions correctly",
        kind: ObjectiveKind::Points,
        target: 100,
        reward: 25,
    },
    ChallengeDefinition {
        id: 4,
        title: "Complete a whole level",
        description: "Finish every lesson of a level and earn 75 points",
        kind: ObjectiveKind::Level,
        target: 1,
        reward: 75,
    },
];

/// The challenge for `date`. The same date always yields the same challenge.
#[must_use]
pub fn challenge_for_date(date: NaiveDate) -> &'static ChallengeDefinition {
    let seed = u64::try_from(date.num_days_from_ce()).unwrap_or_default();
    let mut rng = StdRng::seed_from_u64(seed);
    &CATALOGUE[rng.random_range(0..CATALOGUE.len())]
}

#[must_use]
pub fn find_challenge(id: u32) -> Option<&'static ChallengeDefinition> {
    CATALOGUE.iter().find(|c| c.id == id)
}

/// Raw value of the objective measured on the snapshot.
#[must_use]
pub fn objective_value(kind: ObjectiveKind, progress: &Progress, curriculum: &Curriculum) -> u64 {
    match kind {
        ObjectiveKind::Lessons => progress
            .completed_lessons()
            .values()
            .map(|lessons| lessons.len() as u64)
            .sum(),
        ObjectiveKind::Points => progress.points(),
        ObjectiveKind::Streak => u64::from(progress.streak()),
        ObjectiveKind::Level => completed_level_count(progress, curriculum) as u64,
    }
}

/// Progress toward the target, clamped to the target.
#[must_use]
pub fn challenge_progress(
    challenge: &ChallengeDefinition,
    progress: &Progress,
    curriculum: &Curriculum,
) -> u64 {
    objective_value(challenge.kind, progress, curriculum).min(challenge.target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Lesson, LessonId, Level, LevelId, Question, QuestionId, QuestionKind};
    use crate::time::fixed_today;
    use chrono::Duration;

    fn curriculum() -> Curriculum {
        Curriculum::new(vec![Level {
            id: LevelId::FIRST,
            title: "One".into(),
            description: String::new(),
            lessons: vec![Lesson {
                id: LessonId::new("1-1"),
                title: "Only".into(),
                content: None,
                questions: vec![Question {
                    id: QuestionId::new("q1"),
                    prompt: "?".into(),
                    kind: QuestionKind::TrueFalse { answer: true },
                    explanation: String::new(),
                }],
            }],
        }])
        .unwrap()
    }

    #[test]
    fn selection_is_pinned_to_the_date() {
        let today = fixed_today();
        assert_eq!(challenge_for_date(today), challenge_for_date(today));
    }

    #[test]
    fn selection_varies_across_dates() {
        let start = fixed_today();
        let ids: std::collections::HashSet<u32> = (0..60)
            .map(|d| challenge_for_date(start + Duration::days(d)).id)
            .collect();
        assert!(ids.len() > 1);
    }

    #[test]
    fn catalogue_ids_resolve() {
        for def in CATALOGUE {
            assert_eq!(find_challenge(def.id), Some(def));
        }
        assert!(find_challenge(99).is_none());
    }

    #[test]
    fn progress_is_recomputed_and_clamped() {
        let curriculum = curriculum();
        let points = find_challenge(3).unwrap();
        let level = find_challenge(4).unwrap();
        let mut progress = Progress::default();
        progress.add_points(40);
        assert_eq!(challenge_progress(points, &progress, &curriculum), 40);
        progress.add_points(200);
        assert_eq!(challenge_progress(points, &progress, &curriculum), 100);

        assert_eq!(challenge_progress(level, &progress, &curriculum), 0);
        progress.mark_lesson_completed(LevelId::FIRST, &LessonId::new("1-1"), &curriculum);
        assert_eq!(challenge_progress(level, &progress, &curriculum), 1);
        assert_eq!(
            objective_value(ObjectiveKind::Lessons, &progress, &curriculum),
            1
        );
    }
}
