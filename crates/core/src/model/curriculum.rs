use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LessonId, LevelId, QuestionId};

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

/// Answer format and correct answer of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QuestionKind {
    #[serde(rename = "multiple")]
    MultipleChoice {
        options: Vec<String>,
        #[serde(rename = "correctOptionIndex")]
        correct_index: usize,
    },
    #[serde(rename = "truefalse")]
    TrueFalse { answer: bool },
}

/// A learner's submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Choice(usize),
    Bool(bool),
}

/// A single quiz prompt with a verifiable correct answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(rename = "question")]
    pub prompt: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
    #[serde(default)]
    pub explanation: String,
}

impl Question {
    /// Grades a submitted answer. Answers of the wrong shape are incorrect.
    #[must_use]
    pub fn is_correct(&self, answer: Answer) -> bool {
        match (&self.kind, answer) {
            (QuestionKind::MultipleChoice { correct_index, .. }, Answer::Choice(idx)) => {
                *correct_index == idx
            }
            (QuestionKind::TrueFalse { answer: expected }, Answer::Bool(given)) => {
                *expected == given
            }
            _ => false,
        }
    }

    /// Human readable correct answer, shown when a learner reveals it.
    #[must_use]
    pub fn correct_answer_text(&self) -> String {
        match &self.kind {
            QuestionKind::MultipleChoice {
                options,
                correct_index,
            } => options.get(*correct_index).cloned().unwrap_or_default(),
            QuestionKind::TrueFalse { answer } => answer.to_string(),
        }
    }
}

//
// ─── LESSONS AND LEVELS ────────────────────────────────────────────────────────
//

/// An ordered group of questions; the unit of completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    /// Reading material shown before the quiz, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub questions: Vec<Question>,
}

impl Lesson {
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }
}

/// An ordered group of lessons; levels unlock sequentially.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: LevelId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub lessons: Vec<Lesson>,
}

impl Level {
    #[must_use]
    pub fn lesson(&self, id: &LessonId) -> Option<&Lesson> {
        self.lessons.iter().find(|l| &l.id == id)
    }
}

//
// ─── CURRICULUM ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("curriculum has no level {}", LevelId::FIRST)]
    MissingFirstLevel,
    #[error("duplicate level id {0}")]
    DuplicateLevel(LevelId),
    #[error("duplicate lesson id {0}")]
    DuplicateLesson(LessonId),
    #[error("duplicate question id {question} in lesson {lesson}")]
    DuplicateQuestion {
        lesson: LessonId,
        question: QuestionId,
    },
    #[error("level {0} has no lessons")]
    EmptyLevel(LevelId),
    #[error("lesson {0} has no questions")]
    EmptyLesson(LessonId),
    #[error("question {question} in lesson {lesson} has no valid correct option")]
    InvalidCorrectOption {
        lesson: LessonId,
        question: QuestionId,
    },
    #[error("invalid curriculum json: {0}")]
    Parse(String),
}

/// Static, validated lesson content: levels → lessons → questions.
///
/// Loaded once and treated as read-only by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Curriculum {
    levels: Vec<Level>,
}

impl Curriculum {
    /// Validate and wrap a list of levels.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` if ids collide, a level or lesson is empty,
    /// a multiple choice question points outside its options, or the first
    /// level is missing.
    pub fn new(levels: Vec<Level>) -> Result<Self, CurriculumError> {
        let mut level_ids = HashSet::new();
        let mut lesson_ids = HashSet::new();

        for level in &levels {
            if !level_ids.insert(level.id) {
                return Err(CurriculumError::DuplicateLevel(level.id));
            }
            if level.lessons.is_empty() {
                return Err(CurriculumError::EmptyLevel(level.id));
            }
            for lesson in &level.lessons {
                if !lesson_ids.insert(lesson.id.clone()) {
                    return Err(CurriculumError::DuplicateLesson(lesson.id.clone()));
                }
                validate_lesson(lesson)?;
            }
        }

        if !level_ids.contains(&LevelId::FIRST) {
            return Err(CurriculumError::MissingFirstLevel);
        }

        Ok(Self { levels })
    }

    /// Parse a curriculum from its JSON representation (an array of levels).
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::Parse` for malformed JSON, or any validation
    /// error from [`Curriculum::new`].
    pub fn from_json(json: &str) -> Result<Self, CurriculumError> {
        let levels: Vec<Level> =
            serde_json::from_str(json).map_err(|err| CurriculumError::Parse(err.to_string()))?;
        Self::new(levels)
    }

    #[must_use]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    #[must_use]
    pub fn level(&self, id: LevelId) -> Option<&Level> {
        self.levels.iter().find(|l| l.id == id)
    }

    #[must_use]
    pub fn lesson(&self, level_id: LevelId, lesson_id: &LessonId) -> Option<&Lesson> {
        self.level(level_id).and_then(|level| level.lesson(lesson_id))
    }

    #[must_use]
    pub fn contains_lesson(&self, level_id: LevelId, lesson_id: &LessonId) -> bool {
        self.lesson(level_id, lesson_id).is_some()
    }

    /// Number of lessons defined for a level, or `None` for unknown levels.
    #[must_use]
    pub fn lesson_count_for(&self, level_id: LevelId) -> Option<usize> {
        self.level(level_id).map(|level| level.lessons.len())
    }

    /// First lesson of the first level.
    #[must_use]
    pub fn first_lesson(&self) -> Option<(LevelId, &Lesson)> {
        self.level(LevelId::FIRST)
            .and_then(|level| level.lessons.first().map(|lesson| (level.id, lesson)))
    }

    #[must_use]
    pub fn total_question_count(&self) -> usize {
        self.levels
            .iter()
            .flat_map(|level| &level.lessons)
            .map(Lesson::question_count)
            .sum()
    }
}

fn validate_lesson(lesson: &Lesson) -> Result<(), CurriculumError> {
    if lesson.questions.is_empty() {
        return Err(CurriculumError::EmptyLesson(lesson.id.clone()));
    }
    let mut question_ids = HashSet::new();
    for question in &lesson.questions {
        if !question_ids.insert(&question.id) {
            return Err(CurriculumError::DuplicateQuestion {
                lesson: lesson.id.clone(),
                question: question.id.clone(),
            });
        }
        if let QuestionKind::MultipleChoice {
            options,
            correct_index,
        } = &question.kind
        {
            if *correct_index >= options.len() {
                return Err(CurriculumError::InvalidCorrectOption {
                    lesson: lesson.id.clone(),
                    question: question.id.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "id": 1,
            "title": "Saving basics",
            "lessons": [
                {
                    "id": "1-1",
                    "title": "What is saving?",
                    "content": "Keep part of what you earn.",
                    "questions": [
                        {
                            "id": "q1",
                            "type": "multiple",
                            "question": "What does saving mean?",
                            "options": ["Spend it all", "Set some aside"],
                            "correctOptionIndex": 1,
                            "explanation": "Saving is setting money aside."
                        },
                        {
                            "id": "q2",
                            "type": "truefalse",
                            "question": "You can only save with a high income.",
                            "answer": false
                        }
                    ]
                }
            ]
        }
    ]"#;

    fn single_question_lesson(id: &str) -> Lesson {
        Lesson {
            id: LessonId::new(id),
            title: id.to_string(),
            content: None,
            questions: vec![Question {
                id: QuestionId::new("q"),
                prompt: "?".into(),
                kind: QuestionKind::TrueFalse { answer: true },
                explanation: String::new(),
            }],
        }
    }

    #[test]
    fn parses_lesson_data_shape() {
        let curriculum = Curriculum::from_json(SAMPLE).unwrap();
        let lesson = curriculum
            .lesson(LevelId::FIRST, &LessonId::new("1-1"))
            .unwrap();
        assert_eq!(lesson.question_count(), 2);
        assert_eq!(curriculum.lesson_count_for(LevelId::FIRST), Some(1));
        assert_eq!(curriculum.total_question_count(), 2);

        let q1 = &lesson.questions[0];
        assert!(q1.is_correct(Answer::Choice(1)));
        assert!(!q1.is_correct(Answer::Choice(0)));
        assert!(!q1.is_correct(Answer::Bool(true)));
        assert_eq!(q1.correct_answer_text(), "Set some aside");

        let q2 = &lesson.questions[1];
        assert!(q2.is_correct(Answer::Bool(false)));
        assert_eq!(q2.explanation, "");
    }

    #[test]
    fn rejects_empty_lessons_and_levels() {
        let mut lesson = single_question_lesson("1-1");
        lesson.questions.clear();
        let err = Curriculum::new(vec![Level {
            id: LevelId::FIRST,
            title: "L1".into(),
            description: String::new(),
            lessons: vec![lesson],
        }])
        .unwrap_err();
        assert_eq!(err, CurriculumError::EmptyLesson(LessonId::new("1-1")));

        let err = Curriculum::new(vec![Level {
            id: LevelId::FIRST,
            title: "L1".into(),
            description: String::new(),
            lessons: Vec::new(),
        }])
        .unwrap_err();
        assert_eq!(err, CurriculumError::EmptyLevel(LevelId::FIRST));
    }

    #[test]
    fn rejects_duplicate_lessons_across_levels() {
        let levels = vec![
            Level {
                id: LevelId::new(1),
                title: "L1".into(),
                description: String::new(),
                lessons: vec![single_question_lesson("x")],
            },
            Level {
                id: LevelId::new(2),
                title: "L2".into(),
                description: String::new(),
                lessons: vec![single_question_lesson("x")],
            },
        ];
        assert_eq!(
            Curriculum::new(levels).unwrap_err(),
            CurriculumError::DuplicateLesson(LessonId::new("x"))
        );
    }

    #[test]
    fn requires_first_level() {
        let levels = vec![Level {
            id: LevelId::new(2),
            title: "L2".into(),
            description: String::new(),
            lessons: vec![single_question_lesson("2-1")],
        }];
        assert_eq!(
            Curriculum::new(levels).unwrap_err(),
            CurriculumError::MissingFirstLevel
        );
    }

    #[test]
    fn rejects_out_of_range_correct_option() {
        let json = SAMPLE.replace("\"correctOptionIndex\": 1", "\"correctOptionIndex\": 5");
        assert!(matches!(
            Curriculum::from_json(&json),
            Err(CurriculumError::InvalidCorrectOption { .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            Curriculum::from_json("{not json"),
            Err(CurriculumError::Parse(_))
        ));
    }
}
