use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::curriculum::Curriculum;
use crate::model::ids::{LessonId, LevelId};
use crate::streak::StreakUpdate;

/// Pointer to a lesson, used for the "continue where you left off" feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRef {
    pub level_id: LevelId,
    pub lesson_id: LessonId,
}

impl LessonRef {
    #[must_use]
    pub fn new(level_id: LevelId, lesson_id: impl Into<LessonId>) -> Self {
        Self {
            level_id,
            lesson_id: lesson_id.into(),
        }
    }
}

/// Result of trying to record a lesson as completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The lesson was not completed before and now is.
    Inserted,
    /// The lesson was already completed; nothing changed.
    AlreadyCompleted,
    /// The lesson's level is still locked; nothing changed.
    LevelLocked,
    /// The lesson does not exist in the curriculum; nothing changed.
    UnknownLesson,
}

impl MarkOutcome {
    /// True when the lesson is recorded as completed after the call.
    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, MarkOutcome::Inserted | MarkOutcome::AlreadyCompleted)
    }
}

/// Unvalidated progress fields, as read back from persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressDraft {
    pub points: u64,
    pub streak: u32,
    pub last_visit: Option<NaiveDate>,
    pub completed_lessons: BTreeMap<LevelId, BTreeSet<LessonId>>,
    pub unlocked_levels: BTreeSet<LevelId>,
    pub last_lesson: Option<LessonRef>,
}

impl ProgressDraft {
    /// Normalize into a `Progress`, restoring the invariants that do not need
    /// the curriculum: the first level is always unlocked, completions only
    /// exist for unlocked levels and empty completion sets are dropped.
    #[must_use]
    pub fn into_progress(self) -> Progress {
        let mut unlocked_levels = self.unlocked_levels;
        unlocked_levels.insert(LevelId::FIRST);

        let completed_lessons = self
            .completed_lessons
            .into_iter()
            .filter(|(level, lessons)| unlocked_levels.contains(level) && !lessons.is_empty())
            .collect();

        Progress {
            points: self.points,
            streak: self.streak,
            last_visit: self.last_visit,
            completed_lessons,
            unlocked_levels,
            last_lesson: self.last_lesson,
        }
    }
}

/// The durable learning record: one per installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    points: u64,
    streak: u32,
    last_visit: Option<NaiveDate>,
    completed_lessons: BTreeMap<LevelId, BTreeSet<LessonId>>,
    unlocked_levels: BTreeSet<LevelId>,
    last_lesson: Option<LessonRef>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            points: 0,
            streak: 0,
            last_visit: None,
            completed_lessons: BTreeMap::new(),
            unlocked_levels: BTreeSet::from([LevelId::FIRST]),
            last_lesson: None,
        }
    }
}

impl Progress {
    #[must_use]
    pub fn points(&self) -> u64 {
        self.points
    }

    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }

    #[must_use]
    pub fn last_visit(&self) -> Option<NaiveDate> {
        self.last_visit
    }

    #[must_use]
    pub fn completed_lessons(&self) -> &BTreeMap<LevelId, BTreeSet<LessonId>> {
        &self.completed_lessons
    }

    #[must_use]
    pub fn unlocked_levels(&self) -> &BTreeSet<LevelId> {
        &self.unlocked_levels
    }

    #[must_use]
    pub fn last_lesson(&self) -> Option<&LessonRef> {
        self.last_lesson.as_ref()
    }

    /// Apply a signed delta, clamping the total at zero. Returns the new total.
    pub fn add_points(&mut self, delta: i64) -> u64 {
        self.points = if delta >= 0 {
            self.points.saturating_add(delta.unsigned_abs())
        } else {
            self.points.saturating_sub(delta.unsigned_abs())
        };
        self.points
    }

    /// Record a lesson as completed. Idempotent; rejects lessons outside the
    /// curriculum and lessons of locked levels.
    pub fn mark_lesson_completed(
        &mut self,
        level_id: LevelId,
        lesson_id: &LessonId,
        curriculum: &Curriculum,
    ) -> MarkOutcome {
        if !curriculum.contains_lesson(level_id, lesson_id) {
            return MarkOutcome::UnknownLesson;
        }
        if !self.unlocked_levels.contains(&level_id) {
            return MarkOutcome::LevelLocked;
        }
        let inserted = self
            .completed_lessons
            .entry(level_id)
            .or_default()
            .insert(lesson_id.clone());
        if inserted {
            MarkOutcome::Inserted
        } else {
            MarkOutcome::AlreadyCompleted
        }
    }

    /// Unlock a level defined in the curriculum. Returns `true` only when the
    /// level was not unlocked before.
    pub fn unlock_level(&mut self, level_id: LevelId, curriculum: &Curriculum) -> bool {
        if curriculum.level(level_id).is_none() {
            return false;
        }
        self.unlocked_levels.insert(level_id)
    }

    pub fn set_last_lesson(&mut self, lesson: LessonRef) {
        self.last_lesson = Some(lesson);
    }

    pub fn apply_streak(&mut self, update: StreakUpdate) {
        self.streak = update.streak;
        self.last_visit = update.last_visit;
    }

    #[must_use]
    pub fn is_lesson_completed(&self, level_id: LevelId, lesson_id: &LessonId) -> bool {
        self.completed_lessons
            .get(&level_id)
            .is_some_and(|lessons| lessons.contains(lesson_id))
    }

    #[must_use]
    pub fn completed_count(&self, level_id: LevelId) -> usize {
        self.completed_lessons.get(&level_id).map_or(0, BTreeSet::len)
    }

    #[must_use]
    pub fn is_level_unlocked(&self, level_id: LevelId) -> bool {
        self.unlocked_levels.contains(&level_id)
    }

    /// Drop completions that reference lessons the curriculum does not define.
    ///
    /// Returns the number of entries removed.
    pub fn retain_known_lessons(&mut self, curriculum: &Curriculum) -> usize {
        let mut removed = 0;
        for (level_id, lessons) in &mut self.completed_lessons {
            let before = lessons.len();
            lessons.retain(|lesson| curriculum.contains_lesson(*level_id, lesson));
            removed += before - lessons.len();
        }
        self.completed_lessons.retain(|_, lessons| !lessons.is_empty());
        removed
    }
}
