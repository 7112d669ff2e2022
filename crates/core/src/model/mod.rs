mod curriculum;
mod ids;
mod progress;

pub use curriculum::{Answer, Curriculum, CurriculumError, Lesson, Level, Question, QuestionKind};
pub use ids::{LessonId, LevelId, ParseIdError, QuestionId};
pub use progress::{LessonRef, MarkOutcome, Progress, ProgressDraft};
