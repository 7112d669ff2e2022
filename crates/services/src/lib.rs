#![forbid(unsafe_code)]

pub mod challenge_service;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod progress_store;
pub mod quiz;

pub use quest_core::Clock;

pub use challenge_service::{ChallengeStatus, ChallengeTracker};
pub use engine::Engine;
pub use error::{EngineError, QuizLoopError};
pub use events::{EventHub, ProgressEvent};
pub use progress_store::{CompletionOutcome, ProgressStore};
pub use quiz::{ActiveQuiz, CountdownDriver, LessonOutcome, QuizLoopService, QuizStepResult};
