use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::config::{EngineConfig, ModePolicy, QuizMode};
use crate::model::{Lesson, LessonId, LevelId, Question, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("lesson {0} has no questions")]
    EmptyLesson(LessonId),
    #[error("quiz session already completed")]
    Completed,
    #[error("answer for {got} does not match the current question {expected}")]
    StaleAnswer {
        expected: QuestionId,
        got: QuestionId,
    },
    #[error("countdown {0} is no longer running")]
    StaleCountdown(CountdownTicket),
    #[error("answers can only be revealed in learning mode")]
    RevealNotAllowed,
}

//
// ─── EVENTS AND EFFECTS ────────────────────────────────────────────────────────
//

/// Identifies one armed countdown. A ticket is never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountdownTicket(u64);

impl CountdownTicket {
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CountdownTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Input to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizEvent {
    /// The learner submitted an answer for `question_id`.
    Answer {
        question_id: QuestionId,
        correct: bool,
    },
    /// Learning mode: the learner looked at the correct answer.
    RevealAnswer { question_id: QuestionId },
    /// A scheduled countdown ran out.
    CountdownExpired { ticket: CountdownTicket },
}

/// Side effect the caller must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizEffect {
    AwardPoints(u32),
    StartCountdown { ticket: CountdownTicket, secs: u32 },
    CancelCountdown { ticket: CountdownTicket },
    EnterReview { queue_len: usize },
    Completed { points_earned: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuizPhase {
    Normal,
    Review,
    Completed,
}

/// How a single answer was graded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedAnswer {
    pub question_id: QuestionId,
    pub correct: bool,
    pub timed_out: bool,
    pub points: u32,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub phase: QuizPhase,
    pub graded: Option<GradedAnswer>,
    pub effects: Vec<QuizEffect>,
}

/// Position within the current queue, for progress bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizProgress {
    pub phase: QuizPhase,
    pub position: usize,
    pub queue_len: usize,
    pub incorrect_remaining: usize,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One attempt at a lesson.
///
/// The normal pass asks every question once. Questions answered incorrectly
/// (or timed out) are collected and asked again in a review pass that only
/// lets the learner move on with a correct answer; the session completes once
/// nothing incorrect is left. The session itself never touches persistence:
/// every consequence is returned as a [`QuizEffect`].
pub struct QuizSession {
    level_id: LevelId,
    lesson_id: LessonId,
    questions: Vec<Question>,
    mode: QuizMode,
    policy: ModePolicy,
    reveal_forfeits_points: bool,
    phase: QuizPhase,
    queue: Vec<usize>,
    cursor: usize,
    incorrect: HashSet<QuestionId>,
    revealed: bool,
    countdown: Option<CountdownTicket>,
    next_ticket: u64,
    points_earned: u64,
    answers: u32,
}

impl QuizSession {
    /// Start a session over every question of `lesson`.
    ///
    /// The returned effects arm the first countdown in timed modes.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyLesson` if the lesson has no questions.
    pub fn start(
        level_id: LevelId,
        lesson: &Lesson,
        mode: QuizMode,
        config: &EngineConfig,
    ) -> Result<(Self, Vec<QuizEffect>), QuizError> {
        if lesson.questions.is_empty() {
            return Err(QuizError::EmptyLesson(lesson.id.clone()));
        }

        let mut session = Self {
            level_id,
            lesson_id: lesson.id.clone(),
            questions: lesson.questions.clone(),
            mode,
            policy: config.policy(mode),
            reveal_forfeits_points: config.learning_reveal_forfeits_points,
            phase: QuizPhase::Normal,
            queue: (0..lesson.questions.len()).collect(),
            cursor: 0,
            incorrect: HashSet::new(),
            revealed: false,
            countdown: None,
            next_ticket: 0,
            points_earned: 0,
            answers: 0,
        };
        let effects = session.arm_countdown().into_iter().collect();
        Ok((session, effects))
    }

    #[must_use]
    pub fn level_id(&self) -> LevelId {
        self.level_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> &LessonId {
        &self.lesson_id
    }

    #[must_use]
    pub fn mode(&self) -> QuizMode {
        self.mode
    }

    #[must_use]
    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == QuizPhase::Completed
    }

    #[must_use]
    pub fn points_earned(&self) -> u64 {
        self.points_earned
    }

    /// Number of answers processed, including timeouts.
    #[must_use]
    pub fn answers(&self) -> u32 {
        self.answers
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The countdown currently running for the presented question, if any.
    #[must_use]
    pub fn pending_countdown(&self) -> Option<CountdownTicket> {
        self.countdown
    }

    #[must_use]
    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        if self.is_complete() {
            return None;
        }
        self.queue.get(self.cursor).map(|&idx| &self.questions[idx])
    }

    /// Questions in the active queue, in the order they are asked.
    #[must_use]
    pub fn active_queue(&self) -> Vec<&QuestionId> {
        self.queue.iter().map(|&idx| &self.questions[idx].id).collect()
    }

    #[must_use]
    pub fn is_marked_incorrect(&self, question_id: &QuestionId) -> bool {
        self.incorrect.contains(question_id)
    }

    #[must_use]
    pub fn incorrect_count(&self) -> usize {
        self.incorrect.len()
    }

    #[must_use]
    pub fn progress(&self) -> QuizProgress {
        QuizProgress {
            phase: self.phase,
            position: self.cursor,
            queue_len: self.queue.len(),
            incorrect_remaining: self.incorrect.len(),
        }
    }

    /// Feed one event through the state machine.
    ///
    /// # Errors
    ///
    /// - `QuizError::Completed` once the session is finished.
    /// - `QuizError::StaleAnswer` when the answer names a question other than
    ///   the one being presented (e.g. it raced a countdown that already fired).
    /// - `QuizError::StaleCountdown` when the countdown was cancelled by an
    ///   answer or belongs to an earlier question.
    /// - `QuizError::RevealNotAllowed` outside learning mode.
    ///
    /// A rejected event leaves the session untouched.
    pub fn transition(&mut self, event: QuizEvent) -> Result<Transition, QuizError> {
        if self.is_complete() {
            return Err(QuizError::Completed);
        }

        match event {
            QuizEvent::Answer {
                question_id,
                correct,
            } => {
                self.ensure_current(&question_id)?;
                Ok(self.grade(correct, false))
            }
            QuizEvent::CountdownExpired { ticket } => {
                if self.countdown != Some(ticket) {
                    return Err(QuizError::StaleCountdown(ticket));
                }
                self.countdown = None;
                Ok(self.grade(false, true))
            }
            QuizEvent::RevealAnswer { question_id } => {
                if self.mode != QuizMode::Learning {
                    return Err(QuizError::RevealNotAllowed);
                }
                self.ensure_current(&question_id)?;
                self.revealed = true;
                Ok(Transition {
                    phase: self.phase,
                    graded: None,
                    effects: Vec::new(),
                })
            }
        }
    }

    fn ensure_current(&self, question_id: &QuestionId) -> Result<(), QuizError> {
        match self.current_question() {
            Some(current) if &current.id == question_id => Ok(()),
            Some(current) => Err(QuizError::StaleAnswer {
                expected: current.id.clone(),
                got: question_id.clone(),
            }),
            None => Err(QuizError::Completed),
        }
    }

    fn grade(&mut self, correct: bool, timed_out: bool) -> Transition {
        let mut effects = Vec::new();
        if let Some(ticket) = self.countdown.take() {
            effects.push(QuizEffect::CancelCountdown { ticket });
        }

        let idx = self.queue[self.cursor];
        let question_id = self.questions[idx].id.clone();
        let explanation = self.questions[idx].explanation.clone();
        self.answers = self.answers.saturating_add(1);

        let points = if correct {
            self.points_for_correct_answer()
        } else {
            0
        };
        if points > 0 {
            self.points_earned += u64::from(points);
            effects.push(QuizEffect::AwardPoints(points));
        }

        match self.phase {
            QuizPhase::Normal => {
                if !correct {
                    self.incorrect.insert(question_id.clone());
                }
                self.cursor += 1;
                if self.cursor >= self.queue.len() {
                    self.finish_normal_pass(&mut effects);
                } else {
                    self.present_next(&mut effects);
                }
            }
            QuizPhase::Review => {
                if correct {
                    self.incorrect.remove(&question_id);
                    self.queue.remove(self.cursor);
                    if self.incorrect.is_empty() {
                        self.complete(&mut effects);
                    } else {
                        if self.cursor >= self.queue.len() {
                            self.cursor = 0;
                        }
                        self.revealed = false;
                    }
                }
                // An incorrect review answer keeps the learner on the same question.
            }
            QuizPhase::Completed => {}
        }

        Transition {
            phase: self.phase,
            graded: Some(GradedAnswer {
                question_id,
                correct,
                timed_out,
                points,
                explanation,
            }),
            effects,
        }
    }

    fn points_for_correct_answer(&self) -> u32 {
        if self.mode == QuizMode::Learning && self.revealed && self.reveal_forfeits_points {
            return 0;
        }
        match self.phase {
            QuizPhase::Review => self.policy.review_points,
            _ => self.policy.correct_points,
        }
    }

    fn finish_normal_pass(&mut self, effects: &mut Vec<QuizEffect>) {
        if self.incorrect.is_empty() {
            self.complete(effects);
            return;
        }
        // Review keeps lesson order.
        self.queue = (0..self.questions.len())
            .filter(|&idx| self.incorrect.contains(&self.questions[idx].id))
            .collect();
        self.cursor = 0;
        self.revealed = false;
        self.phase = QuizPhase::Review;
        effects.push(QuizEffect::EnterReview {
            queue_len: self.queue.len(),
        });
    }

    fn present_next(&mut self, effects: &mut Vec<QuizEffect>) {
        self.revealed = false;
        if let Some(effect) = self.arm_countdown() {
            effects.push(effect);
        }
    }

    fn complete(&mut self, effects: &mut Vec<QuizEffect>) {
        self.phase = QuizPhase::Completed;
        self.countdown = None;
        effects.push(QuizEffect::Completed {
            points_earned: self.points_earned,
        });
    }

    /// Countdowns only run for fresh questions in the normal pass.
    fn arm_countdown(&mut self) -> Option<QuizEffect> {
        if self.phase != QuizPhase::Normal {
            return None;
        }
        let secs = self.policy.countdown_secs?;
        self.next_ticket += 1;
        let ticket = CountdownTicket(self.next_ticket);
        self.countdown = Some(ticket);
        Some(QuizEffect::StartCountdown { ticket, secs })
    }
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("level_id", &self.level_id)
            .field("lesson_id", &self.lesson_id)
            .field("mode", &self.mode)
            .field("phase", &self.phase)
            .field("queue_len", &self.queue.len())
            .field("cursor", &self.cursor)
            .field("incorrect", &self.incorrect.len())
            .field("points_earned", &self.points_earned)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
