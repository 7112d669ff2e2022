use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use quest_core::EngineConfig;
use quest_core::achievements::{
    self, Badge, ProgressStats, Rank, check_and_unlock_next_level, is_level_completed,
};
use quest_core::model::{Curriculum, LessonId, LessonRef, LevelId, MarkOutcome, Progress};
use quest_core::streak::update_streak_for;
use storage::records::ProgressRecord;
use storage::repository::{KeyValueStore, StorageKeys};

use crate::events::{EventHub, ProgressEvent};

/// What happened when a finished lesson was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub mark: MarkOutcome,
    pub unlocked_level: Option<LevelId>,
    pub level_completed: bool,
}

/// Process-wide owner of the learner's progress record.
///
/// Every mutating operation is one critical section: it re-reads the persisted
/// record, applies the change and writes it back while holding the lock.
/// Persistence problems never reach the caller. An unreadable store keeps the
/// in-memory state and a missing or malformed record reads as defaults. After
/// a failed write the in-memory state stays authoritative: reads stop
/// replacing it from the store and the next access retries the write.
pub struct ProgressStore {
    kv: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
    curriculum: Arc<Curriculum>,
    config: Arc<EngineConfig>,
    events: EventHub,
    state: Mutex<ProgressState>,
}

#[derive(Default)]
struct ProgressState {
    progress: Progress,
    /// Set while the store lags behind `progress`.
    unsaved: bool,
}

impl ProgressStore {
    #[must_use]
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        curriculum: Arc<Curriculum>,
        config: Arc<EngineConfig>,
        events: EventHub,
    ) -> Self {
        let keys = StorageKeys::new(&config.namespace);
        Self {
            kv,
            keys,
            curriculum,
            config,
            events,
            state: Mutex::new(ProgressState::default()),
        }
    }

    #[must_use]
    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────────
    //

    /// Current progress, or defaults when nothing usable is stored.
    pub async fn get_progress(&self) -> Progress {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await;
        state.progress.clone()
    }

    pub async fn get_last_lesson(&self) -> Option<LessonRef> {
        self.get_progress().await.last_lesson().cloned()
    }

    pub async fn is_lesson_completed(&self, level_id: LevelId, lesson_id: &LessonId) -> bool {
        self.get_progress()
            .await
            .is_lesson_completed(level_id, lesson_id)
    }

    pub async fn completed_count(&self, level_id: LevelId) -> usize {
        self.get_progress().await.completed_count(level_id)
    }

    pub async fn is_level_unlocked(&self, level_id: LevelId) -> bool {
        self.get_progress().await.is_level_unlocked(level_id)
    }

    pub async fn is_level_completed(&self, level_id: LevelId) -> bool {
        let progress = self.get_progress().await;
        is_level_completed(&progress, level_id, &self.curriculum)
    }

    pub async fn badges(&self) -> Vec<Badge> {
        let progress = self.get_progress().await;
        achievements::earned_badges(&progress, &self.curriculum, &self.config)
    }

    pub async fn rank(&self) -> Rank {
        let progress = self.get_progress().await;
        Rank::for_points(progress.points(), &self.config.rank_thresholds)
    }

    pub async fn stats(&self) -> ProgressStats {
        let progress = self.get_progress().await;
        achievements::progress_stats(&progress, &self.curriculum)
    }

    /// Where to continue: the last visited lesson if it still exists,
    /// otherwise the first lesson.
    pub async fn resume_point(&self) -> Option<LessonRef> {
        let progress = self.get_progress().await;
        achievements::resume_point(&progress, &self.curriculum)
    }

    pub async fn next_recommended_lesson(&self) -> Option<LessonRef> {
        let progress = self.get_progress().await;
        achievements::next_recommended_lesson(&progress, &self.curriculum)
    }

    //
    // ─── WRITES ────────────────────────────────────────────────────────────────
    //

    /// Apply a signed delta, never letting the total drop below zero.
    /// Returns the new total.
    pub async fn add_points(&self, delta: i64) -> u64 {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await;
        let total = state.progress.add_points(delta);
        self.persist(&mut state).await;
        drop(state);

        debug!(delta, total, "points updated");
        self.events.publish(ProgressEvent::PointsChanged { total });
        total
    }

    /// Idempotently record a lesson as completed.
    ///
    /// Lessons outside the curriculum and lessons of locked levels are
    /// rejected and leave the record untouched.
    pub async fn mark_lesson_completed(&self, level_id: LevelId, lesson_id: &LessonId) -> MarkOutcome {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await;
        let outcome = state.progress.mark_lesson_completed(level_id, lesson_id, &self.curriculum);
        match outcome {
            MarkOutcome::Inserted => self.persist(&mut state).await,
            MarkOutcome::AlreadyCompleted => {}
            MarkOutcome::LevelLocked | MarkOutcome::UnknownLesson => {
                warn!(%level_id, %lesson_id, ?outcome, "lesson completion rejected");
            }
        }
        outcome
    }

    /// Unlock a level. Publishes `LevelUnlocked` only on the first unlock.
    pub async fn unlock_level(&self, level_id: LevelId) -> bool {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await;
        let unlocked = state.progress.unlock_level(level_id, &self.curriculum);
        if unlocked {
            self.persist(&mut state).await;
        }
        drop(state);

        if unlocked {
            info!(%level_id, "level unlocked");
            self.events.publish(ProgressEvent::LevelUnlocked { level_id });
        }
        unlocked
    }

    /// Unlock the level after `completed_level_id` when it is now complete.
    pub async fn check_and_unlock_next_level(&self, completed_level_id: LevelId) -> bool {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await;
        let next = self.unlock_after(&mut state.progress, completed_level_id);
        if next.is_some() {
            self.persist(&mut state).await;
        }
        drop(state);

        if let Some(level_id) = next {
            info!(%level_id, "level unlocked");
            self.events.publish(ProgressEvent::LevelUnlocked { level_id });
        }
        next.is_some()
    }

    /// Record a finished lesson and cascade the unlock in one critical section.
    ///
    /// Publishes `LessonCompleted`, then `LevelUnlocked` and `LevelCompleted`
    /// when they apply.
    pub async fn complete_lesson(
        &self,
        level_id: LevelId,
        lesson_id: &LessonId,
        points_earned: u64,
    ) -> CompletionOutcome {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await;
        let mark = state.progress.mark_lesson_completed(level_id, lesson_id, &self.curriculum);
        if !mark.is_completed() {
            warn!(%level_id, %lesson_id, ?mark, "lesson completion rejected");
            return CompletionOutcome {
                mark,
                unlocked_level: None,
                level_completed: false,
            };
        }
        let unlocked_level = self.unlock_after(&mut state.progress, level_id);
        // A replayed lesson cannot finish a level that was already finished.
        let level_completed = mark == MarkOutcome::Inserted
            && is_level_completed(&state.progress, level_id, &self.curriculum);
        if mark == MarkOutcome::Inserted || unlocked_level.is_some() {
            self.persist(&mut state).await;
        }
        drop(state);

        info!(%level_id, %lesson_id, points_earned, "lesson completed");
        self.events.publish(ProgressEvent::LessonCompleted {
            level_id,
            lesson_id: lesson_id.clone(),
            points_earned,
        });
        if let Some(unlocked) = unlocked_level {
            info!(level_id = %unlocked, "level unlocked");
            self.events
                .publish(ProgressEvent::LevelUnlocked { level_id: unlocked });
        }
        if level_completed {
            self.events.publish(ProgressEvent::LevelCompleted { level_id });
        }

        CompletionOutcome {
            mark,
            unlocked_level,
            level_completed,
        }
    }

    /// Last write wins.
    pub async fn save_last_lesson(&self, level_id: LevelId, lesson_id: &LessonId) {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await;
        state.progress.set_last_lesson(LessonRef::new(level_id, lesson_id.clone()));
        self.persist(&mut state).await;
    }

    /// Apply the streak rules for a visit on `today`. Returns the new streak.
    pub async fn record_visit(&self, today: NaiveDate) -> u32 {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await;
        let update = update_streak_for(&state.progress, today);
        let changed = update.streak != state.progress.streak()
            || update.last_visit != state.progress.last_visit();
        if changed {
            state.progress.apply_streak(update);
            self.persist(&mut state).await;
            debug!(streak = update.streak, %today, "visit recorded");
        }
        state.progress.streak()
    }

    /// Forget everything and start over from defaults.
    ///
    /// When the stored record cannot be removed the defaults are kept as
    /// unsaved state and written over it once the store accepts writes.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let removed = match self.kv.remove(&self.keys.progress).await {
            Ok(()) => true,
            Err(err) => {
                warn!(key = %self.keys.progress, error = %err, "failed to remove progress record");
                false
            }
        };
        *state = ProgressState {
            progress: Progress::default(),
            unsaved: !removed,
        };
        drop(state);

        info!("progress reset");
        self.events.publish(ProgressEvent::PointsChanged { total: 0 });
    }

    //
    // ─── PERSISTENCE ───────────────────────────────────────────────────────────
    //

    fn unlock_after(&self, state: &mut Progress, completed_level_id: LevelId) -> Option<LevelId> {
        if check_and_unlock_next_level(state, completed_level_id, &self.curriculum) {
            completed_level_id.next()
        } else {
            None
        }
    }

    async fn refresh(&self, state: &mut ProgressState) {
        if state.unsaved {
            // The stored record is stale; flush instead of reloading it.
            self.persist(state).await;
            return;
        }
        match self.kv.get(&self.keys.progress).await {
            Ok(Some(raw)) => match ProgressRecord::from_json(&raw) {
                Ok(record) => {
                    let mut progress = record.into_progress();
                    let dropped = progress.retain_known_lessons(&self.curriculum);
                    if dropped > 0 {
                        debug!(dropped, "ignoring completions of unknown lessons");
                    }
                    state.progress = progress;
                }
                Err(err) => {
                    warn!(key = %self.keys.progress, error = %err, "malformed progress record, using defaults");
                    state.progress = Progress::default();
                }
            },
            Ok(None) => state.progress = Progress::default(),
            Err(err) => {
                warn!(key = %self.keys.progress, error = %err, "progress unreadable, keeping in-memory state");
            }
        }
    }

    async fn persist(&self, state: &mut ProgressState) {
        let json = match ProgressRecord::from_progress(&state.progress).to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to encode progress record");
                state.unsaved = true;
                return;
            }
        };
        match self.kv.set(&self.keys.progress, &json).await {
            Ok(()) => {
                if state.unsaved {
                    debug!("unsaved progress flushed");
                }
                state.unsaved = false;
            }
            Err(err) => {
                warn!(key = %self.keys.progress, error = %err, "failed to persist progress, keeping it unsaved");
                state.unsaved = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_core::model::{Lesson, Level, Question, QuestionId, QuestionKind};
    use quest_core::time::fixed_today;
    use storage::repository::InMemoryStore;

    fn curriculum() -> Arc<Curriculum> {
        let lesson = |id: &str| Lesson {
            id: LessonId::new(id),
            title: id.to_string(),
            content: None,
            questions: vec![Question {
                id: QuestionId::new(format!("{id}-q1")),
                prompt: "?".into(),
                kind: QuestionKind::TrueFalse { answer: true },
                explanation: String::new(),
            }],
        };
        Arc::new(
            Curriculum::new(vec![
                Level {
                    id: LevelId::new(1),
                    title: "Basics".into(),
                    description: String::new(),
                    lessons: vec![lesson("1-1"), lesson("1-2")],
                },
                Level {
                    id: LevelId::new(2),
                    title: "Budgeting".into(),
                    description: String::new(),
                    lessons: vec![lesson("2-1")],
                },
            ])
            .unwrap(),
        )
    }

    fn store() -> (ProgressStore, InMemoryStore) {
        let kv = InMemoryStore::new();
        let store = ProgressStore::new(
            Arc::new(kv.clone()),
            curriculum(),
            Arc::new(EngineConfig::default()),
            EventHub::new(),
        );
        (store, kv)
    }

    #[tokio::test]
    async fn points_never_drop_below_zero() {
        let (store, _) = store();
        assert_eq!(store.add_points(30).await, 30);
        assert_eq!(store.add_points(-50).await, 0);
        assert_eq!(store.add_points(-1).await, 0);
        assert_eq!(store.add_points(5).await, 5);
    }

    #[tokio::test]
    async fn points_changes_are_published() {
        let (store, _) = store();
        let mut rx = store.subscribe();
        store.add_points(10).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::PointsChanged { total: 10 }
        );
    }

    #[tokio::test]
    async fn marking_is_idempotent_and_guarded() {
        let (store, _) = store();
        let level = LevelId::new(1);
        let lesson = LessonId::new("1-1");
        assert_eq!(
            store.mark_lesson_completed(level, &lesson).await,
            MarkOutcome::Inserted
        );
        assert_eq!(
            store.mark_lesson_completed(level, &lesson).await,
            MarkOutcome::AlreadyCompleted
        );
        assert_eq!(store.completed_count(level).await, 1);

        assert_eq!(
            store
                .mark_lesson_completed(LevelId::new(2), &LessonId::new("2-1"))
                .await,
            MarkOutcome::LevelLocked
        );
        assert_eq!(
            store
                .mark_lesson_completed(level, &LessonId::new("9-9"))
                .await,
            MarkOutcome::UnknownLesson
        );
        assert_eq!(store.completed_count(LevelId::new(2)).await, 0);
    }

    #[tokio::test]
    async fn unlock_publishes_only_on_first_insertion() {
        let (store, _) = store();
        let mut rx = store.subscribe();
        assert!(store.unlock_level(LevelId::new(2)).await);
        assert!(!store.unlock_level(LevelId::new(2)).await);
        assert!(!store.unlock_level(LevelId::new(7)).await);
        store.add_points(1).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::LevelUnlocked {
                level_id: LevelId::new(2)
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::PointsChanged { total: 1 }
        );
    }

    #[tokio::test]
    async fn next_level_unlocks_exactly_once() {
        let (store, _) = store();
        let level = LevelId::new(1);
        store.mark_lesson_completed(level, &LessonId::new("1-1")).await;
        assert!(!store.check_and_unlock_next_level(level).await);

        store.mark_lesson_completed(level, &LessonId::new("1-2")).await;
        assert!(store.check_and_unlock_next_level(level).await);
        assert!(!store.check_and_unlock_next_level(level).await);
        assert!(store.is_level_unlocked(LevelId::new(2)).await);
    }

    #[tokio::test]
    async fn complete_lesson_reports_the_cascade() {
        let (store, _) = store();
        let level = LevelId::new(1);
        let first = store.complete_lesson(level, &LessonId::new("1-1"), 10).await;
        assert_eq!(first.mark, MarkOutcome::Inserted);
        assert_eq!(first.unlocked_level, None);
        assert!(!first.level_completed);

        let mut rx = store.subscribe();
        let second = store.complete_lesson(level, &LessonId::new("1-2"), 5).await;
        assert_eq!(second.unlocked_level, Some(LevelId::new(2)));
        assert!(second.level_completed);

        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::LessonCompleted {
                points_earned: 5,
                ..
            }
        ));
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::LevelUnlocked {
                level_id: LevelId::new(2)
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::LevelCompleted { level_id: level }
        );
    }

    #[tokio::test]
    async fn replaying_a_lesson_does_not_complete_the_level_again() {
        let (store, _) = store();
        let level = LevelId::new(1);
        store.complete_lesson(level, &LessonId::new("1-1"), 5).await;
        store.complete_lesson(level, &LessonId::new("1-2"), 5).await;

        let mut rx = store.subscribe();
        let replay = store.complete_lesson(level, &LessonId::new("1-2"), 5).await;
        assert_eq!(replay.mark, MarkOutcome::AlreadyCompleted);
        assert_eq!(replay.unlocked_level, None);
        assert!(!replay.level_completed);
        assert!(store.is_level_completed(level).await);

        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::LessonCompleted { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn state_survives_a_new_store_over_the_same_backend() {
        let (store, kv) = store();
        store.add_points(42).await;
        store
            .save_last_lesson(LevelId::new(1), &LessonId::new("1-2"))
            .await;
        store.record_visit(fixed_today()).await;

        let reopened = ProgressStore::new(
            Arc::new(kv),
            curriculum(),
            Arc::new(EngineConfig::default()),
            EventHub::new(),
        );
        let progress = reopened.get_progress().await;
        assert_eq!(progress.points(), 42);
        assert_eq!(progress.streak(), 1);
        assert_eq!(
            reopened.get_last_lesson().await,
            Some(LessonRef::new(LevelId::new(1), "1-2"))
        );
    }

    #[tokio::test]
    async fn malformed_record_reads_as_defaults() {
        let (store, kv) = store();
        kv.set("finast-progress", "{not json").await.unwrap();
        assert_eq!(store.get_progress().await, Progress::default());
        assert_eq!(store.add_points(5).await, 5);
    }

    #[tokio::test]
    async fn unknown_completions_are_dropped_on_load() {
        let (store, kv) = store();
        kv.set(
            "finast-progress",
            r#"{"points":3,"completedLessons":{"1":["1-1","gone"]},"unlockedLevels":[1]}"#,
        )
        .await
        .unwrap();
        let progress = store.get_progress().await;
        assert_eq!(progress.completed_count(LevelId::new(1)), 1);
        assert!(progress.is_lesson_completed(LevelId::new(1), &LessonId::new("1-1")));
    }

    #[tokio::test]
    async fn repeated_visits_on_one_day_are_idempotent() {
        let (store, _) = store();
        let today = fixed_today();
        assert_eq!(store.record_visit(today).await, 1);
        assert_eq!(store.record_visit(today).await, 1);
        assert_eq!(store.record_visit(today.succ_opt().unwrap()).await, 2);
    }

    #[tokio::test]
    async fn reset_restores_defaults() {
        let (store, kv) = store();
        store.add_points(80).await;
        store.unlock_level(LevelId::new(2)).await;
        let mut rx = store.subscribe();

        store.reset().await;
        assert_eq!(store.get_progress().await, Progress::default());
        assert!(kv.get("finast-progress").await.unwrap().is_none());
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::PointsChanged { total: 0 }
        );
    }

    #[tokio::test]
    async fn derived_views_follow_progress() {
        let (store, _) = store();
        assert_eq!(store.rank().await, Rank::Novice);
        assert!(store.badges().await.is_empty());

        store.complete_lesson(LevelId::new(1), &LessonId::new("1-1"), 0).await;
        store.add_points(60).await;
        assert_eq!(store.rank().await, Rank::Intermediate);
        let ids: Vec<String> = store.badges().await.into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["first-step".to_string()]);
        assert_eq!(store.stats().await.completed_lessons, 1);
        assert_eq!(
            store.next_recommended_lesson().await,
            Some(LessonRef::new(LevelId::new(1), "1-2"))
        );
    }
}
