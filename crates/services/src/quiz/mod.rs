mod countdown;
mod workflow;

// Public API of the quiz subsystem.
pub use crate::error::QuizLoopError;
pub use countdown::CountdownDriver;
pub use workflow::{ActiveQuiz, LessonOutcome, QuizLoopService, QuizStepResult};
