//! Pure derivations over a progress snapshot and the curriculum: level
//! completion, the unlock cascade, badges, rank, aggregate stats and
//! resume/recommendation pointers.
//!
//! Nothing here is persisted. Badges in particular are recomputed on every
//! call so they always reflect the current progress.

use serde::Serialize;

use crate::config::{EngineConfig, RankThresholds};
use crate::model::{Curriculum, LessonId, LessonRef, Level, LevelId, Progress};

//
// ─── LEVELS ────────────────────────────────────────────────────────────────────
//

#[must_use]
pub fn is_level_unlocked(progress: &Progress, level_id: LevelId) -> bool {
    progress.is_level_unlocked(level_id)
}

/// A level is completed when every one of its lessons is completed.
///
/// Unknown levels and levels without lessons are never completed.
#[must_use]
pub fn is_level_completed(progress: &Progress, level_id: LevelId, curriculum: &Curriculum) -> bool {
    match curriculum.lesson_count_for(level_id) {
        Some(0) | None => false,
        Some(total) => progress.completed_count(level_id) == total,
    }
}

/// Unlock the level after `completed_level_id` if that level is now complete.
///
/// Must run after the triggering lesson has been marked completed. Returns
/// `true` only when a new level was actually unlocked.
pub fn check_and_unlock_next_level(
    progress: &mut Progress,
    completed_level_id: LevelId,
    curriculum: &Curriculum,
) -> bool {
    if !is_level_completed(progress, completed_level_id, curriculum) {
        return false;
    }
    let Some(next) = completed_level_id.next() else {
        return false;
    };
    progress.unlock_level(next, curriculum)
}

#[must_use]
pub fn all_levels_completed(progress: &Progress, curriculum: &Curriculum) -> bool {
    curriculum
        .levels()
        .iter()
        .all(|level| is_level_completed(progress, level.id, curriculum))
}

#[must_use]
pub fn completed_level_count(progress: &Progress, curriculum: &Curriculum) -> usize {
    curriculum
        .levels()
        .iter()
        .filter(|level| is_level_completed(progress, level.id, curriculum))
        .count()
}

//
// ─── BADGES ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BadgeKind {
    /// Any lesson completed.
    FirstStep,
    /// Every lesson of the level completed.
    LevelCompleted(LevelId),
    /// Streak reached the threshold.
    Streak(u32),
    /// Every level completed.
    Master,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub kind: BadgeKind,
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Badge {
    fn new(kind: BadgeKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        let id = match kind {
            BadgeKind::FirstStep => "first-step".to_string(),
            BadgeKind::LevelCompleted(level) => format!("level-{level}"),
            BadgeKind::Streak(days) => format!("streak-{days}"),
            BadgeKind::Master => "master".to_string(),
        };
        Self {
            kind,
            id,
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Evaluate every badge predicate against the snapshot.
#[must_use]
pub fn earned_badges(
    progress: &Progress,
    curriculum: &Curriculum,
    config: &EngineConfig,
) -> Vec<Badge> {
    let mut badges = Vec::new();

    if progress.completed_lessons().values().any(|lessons| !lessons.is_empty()) {
        badges.push(Badge::new(
            BadgeKind::FirstStep,
            "First step",
            "Completed your first lesson",
        ));
    }

    for level in curriculum.levels() {
        if is_level_completed(progress, level.id, curriculum) {
            badges.push(Badge::new(
                BadgeKind::LevelCompleted(level.id),
                format!("{} finished", level.title),
                format!("Completed every lesson of {}", level.title),
            ));
        }
    }

    for &days in &config.streak_badge_thresholds {
        if progress.streak() >= days {
            badges.push(Badge::new(
                BadgeKind::Streak(days),
                format!("{days}-day streak"),
                format!("Kept a streak of {days} days or more"),
            ));
        }
    }

    if all_levels_completed(progress, curriculum) {
        badges.push(Badge::new(
            BadgeKind::Master,
            "Master",
            "Completed every level",
        ));
    }

    badges
}

//
// ─── RANK AND STATS ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Novice,
    Intermediate,
    Expert,
}

impl Rank {
    #[must_use]
    pub fn for_points(points: u64, thresholds: &RankThresholds) -> Self {
        if points < thresholds.intermediate {
            Rank::Novice
        } else if points < thresholds.expert {
            Rank::Intermediate
        } else {
            Rank::Expert
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Rank::Novice => "Novice",
            Rank::Intermediate => "Intermediate",
            Rank::Expert => "Expert",
        }
    }
}

/// Aggregate numbers shown on progress dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressStats {
    pub completed_lessons: usize,
    pub completed_questions: usize,
    pub total_questions: usize,
    /// Share of questions in completed lessons, rounded to a whole percent.
    pub percent_complete: u8,
}

#[must_use]
pub fn progress_stats(progress: &Progress, curriculum: &Curriculum) -> ProgressStats {
    let mut completed_lessons = 0;
    let mut completed_questions = 0;
    for level in curriculum.levels() {
        for lesson in &level.lessons {
            if progress.is_lesson_completed(level.id, &lesson.id) {
                completed_lessons += 1;
                completed_questions += lesson.question_count();
            }
        }
    }
    let total_questions = curriculum.total_question_count();
    let percent_complete = if total_questions == 0 {
        0
    } else {
        // Bounded by 100, so the narrowing is lossless.
        ((completed_questions * 100 + total_questions / 2) / total_questions).min(100) as u8
    };

    ProgressStats {
        completed_lessons,
        completed_questions,
        total_questions,
        percent_complete,
    }
}

/// Completed and total lesson counts for one level.
#[must_use]
pub fn level_completion(
    progress: &Progress,
    level_id: LevelId,
    curriculum: &Curriculum,
) -> Option<(usize, usize)> {
    curriculum
        .lesson_count_for(level_id)
        .map(|total| (progress.completed_count(level_id), total))
}

//
// ─── NAVIGATION POINTERS ───────────────────────────────────────────────────────
//

/// Lesson to resume: the last visited one if it still exists, otherwise the
/// first lesson of the first level.
#[must_use]
pub fn resume_point(progress: &Progress, curriculum: &Curriculum) -> Option<LessonRef> {
    if let Some(last) = progress.last_lesson() {
        if curriculum.contains_lesson(last.level_id, &last.lesson_id) {
            return Some(last.clone());
        }
    }
    curriculum
        .first_lesson()
        .map(|(level_id, lesson)| LessonRef::new(level_id, lesson.id.clone()))
}

/// The lesson following `lesson_id` within the same level.
#[must_use]
pub fn next_lesson_after(
    curriculum: &Curriculum,
    level_id: LevelId,
    lesson_id: &LessonId,
) -> Option<LessonRef> {
    let level = curriculum.level(level_id)?;
    let idx = level.lessons.iter().position(|l| &l.id == lesson_id)?;
    level
        .lessons
        .get(idx + 1)
        .map(|next| LessonRef::new(level_id, next.id.clone()))
}

/// First uncompleted lesson of the highest unlocked level, falling back to
/// any earlier unlocked level with work left.
#[must_use]
pub fn next_recommended_lesson(progress: &Progress, curriculum: &Curriculum) -> Option<LessonRef> {
    let first_open = |level: &Level| {
        level
            .lessons
            .iter()
            .find(|lesson| !progress.is_lesson_completed(level.id, &lesson.id))
            .map(|lesson| LessonRef::new(level.id, lesson.id.clone()))
    };

    let mut unlocked: Vec<&Level> = curriculum
        .levels()
        .iter()
        .filter(|level| progress.is_level_unlocked(level.id))
        .collect();
    unlocked.sort_by_key(|level| std::cmp::Reverse(level.id));

    unlocked.into_iter().find_map(first_open)
}
