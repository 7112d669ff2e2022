//! Shared error types for the services crate.

use thiserror::Error;

use quest_core::config::ConfigError;
use quest_core::model::{LessonId, LevelId};
use quest_core::quiz::QuizError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the quiz loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizLoopError {
    #[error("level {0} is locked")]
    LevelLocked(LevelId),
    #[error("lesson {lesson} does not exist in level {level}")]
    UnknownLesson { level: LevelId, lesson: LessonId },
    #[error(transparent)]
    Quiz(#[from] QuizError),
}

/// Errors emitted while assembling the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
