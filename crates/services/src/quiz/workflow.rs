use std::sync::Arc;

use quest_core::config::QuizMode;
use quest_core::model::{LessonId, LevelId, Question};
use quest_core::quiz::{GradedAnswer, QuizEffect, QuizEvent, QuizPhase, QuizProgress, QuizSession};
use tracing::debug;

use crate::error::QuizLoopError;
use crate::progress_store::ProgressStore;

/// What finishing a lesson changed in the learner's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonOutcome {
    pub lesson_completed: bool,
    pub unlocked_level: Option<LevelId>,
    pub level_completed: bool,
    pub points_earned: u64,
}

/// Result of feeding one event into a running quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizStepResult {
    pub phase: QuizPhase,
    pub graded: Option<GradedAnswer>,
    /// Effects for timer drivers; points and completion are already applied.
    pub effects: Vec<QuizEffect>,
    pub outcome: Option<LessonOutcome>,
}

/// A quiz in progress, owned by the caller between events.
#[derive(Debug)]
pub struct ActiveQuiz {
    session: QuizSession,
    pending: Vec<QuizEffect>,
}

impl ActiveQuiz {
    #[must_use]
    pub fn session(&self) -> &QuizSession {
        &self.session
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.session.current_question()
    }

    #[must_use]
    pub fn phase(&self) -> QuizPhase {
        self.session.phase()
    }

    #[must_use]
    pub fn progress(&self) -> QuizProgress {
        self.session.progress()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.session.is_complete()
    }

    /// Effects produced when the quiz started (the first countdown, if any).
    pub fn take_start_effects(&mut self) -> Vec<QuizEffect> {
        std::mem::take(&mut self.pending)
    }
}

/// Orchestrates quiz start and applies each transition to the progress store.
#[derive(Clone)]
pub struct QuizLoopService {
    store: Arc<ProgressStore>,
}

impl QuizLoopService {
    #[must_use]
    pub fn new(store: Arc<ProgressStore>) -> Self {
        Self { store }
    }

    /// Start a quiz over the lesson and remember it as the last visited one.
    ///
    /// # Errors
    ///
    /// Returns `QuizLoopError::UnknownLesson` for a reference outside the
    /// curriculum and `QuizLoopError::LevelLocked` when the level is locked.
    pub async fn start_lesson(
        &self,
        level_id: LevelId,
        lesson_id: &LessonId,
        mode: QuizMode,
    ) -> Result<ActiveQuiz, QuizLoopError> {
        let lesson = self
            .store
            .curriculum()
            .lesson(level_id, lesson_id)
            .ok_or_else(|| QuizLoopError::UnknownLesson {
                level: level_id,
                lesson: lesson_id.clone(),
            })?;
        if !self.store.is_level_unlocked(level_id).await {
            return Err(QuizLoopError::LevelLocked(level_id));
        }

        let (session, pending) = QuizSession::start(level_id, lesson, mode, self.store.config())?;
        self.store.save_last_lesson(level_id, lesson_id).await;
        debug!(%level_id, %lesson_id, ?mode, "quiz started");

        Ok(ActiveQuiz { session, pending })
    }

    /// Feed an answer, reveal or countdown expiry into the quiz.
    ///
    /// Points are committed per answer. On completion the lesson is recorded
    /// and the next level unlocked when the current one is finished.
    ///
    /// # Errors
    ///
    /// Returns `QuizLoopError::Quiz` when the session rejects the event; the
    /// quiz and the progress record are left untouched in that case.
    pub async fn submit(
        &self,
        quiz: &mut ActiveQuiz,
        event: QuizEvent,
    ) -> Result<QuizStepResult, QuizLoopError> {
        let transition = quiz.session.transition(event)?;
        let mut outcome = None;

        for effect in &transition.effects {
            match *effect {
                QuizEffect::AwardPoints(points) => {
                    self.store.add_points(i64::from(points)).await;
                }
                QuizEffect::Completed { points_earned } => {
                    let completion = self
                        .store
                        .complete_lesson(quiz.session.level_id(), quiz.session.lesson_id(), points_earned)
                        .await;
                    outcome = Some(LessonOutcome {
                        lesson_completed: completion.mark.is_completed(),
                        unlocked_level: completion.unlocked_level,
                        level_completed: completion.level_completed,
                        points_earned,
                    });
                }
                QuizEffect::EnterReview { queue_len } => {
                    debug!(lesson_id = %quiz.session.lesson_id(), queue_len, "review started");
                }
                QuizEffect::StartCountdown { .. } | QuizEffect::CancelCountdown { .. } => {}
            }
        }

        Ok(QuizStepResult {
            phase: transition.phase,
            graded: transition.graded,
            effects: transition.effects,
            outcome,
        })
    }
}
