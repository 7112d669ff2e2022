use std::time::Duration;

use quest_core::config::QuizMode;
use quest_core::model::{Curriculum, LessonId, LevelId};
use quest_core::quiz::{QuizEffect, QuizError, QuizEvent, QuizPhase};
use quest_core::time::fixed_clock;
use quest_core::EngineConfig;
use services::{CountdownDriver, Engine, QuizLoopError};

const CURRICULUM: &str = r#"[
  {
    "id": 1,
    "title": "Money basics",
    "lessons": [
      {
        "id": "1-1",
        "title": "What is money",
        "questions": [
          {"id": "q1", "type": "truefalse", "question": "Money is a medium of exchange.", "answer": true},
          {"id": "q2", "type": "truefalse", "question": "Coins are money.", "answer": true},
          {"id": "q3", "type": "truefalse", "question": "Saving means spending everything.", "answer": false}
        ]
      }
    ]
  }
]"#;

fn engine() -> Engine {
    let curriculum = Curriculum::from_json(CURRICULUM).unwrap();
    Engine::in_memory(fixed_clock(), curriculum, EngineConfig::default()).unwrap()
}

fn started_ticket(effects: &[QuizEffect]) -> Option<quest_core::quiz::CountdownTicket> {
    effects.iter().find_map(|effect| match effect {
        QuizEffect::StartCountdown { ticket, .. } => Some(*ticket),
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn expired_countdown_counts_as_a_wrong_answer() {
    let engine = engine();
    let loop_svc = engine.quiz();
    let (mut driver, mut expiries) = CountdownDriver::channel(8);

    let mut quiz = loop_svc
        .start_lesson(LevelId::new(1), &LessonId::new("1-1"), QuizMode::Competitive)
        .await
        .unwrap();
    let start = quiz.take_start_effects();
    let first = started_ticket(&start).expect("first countdown");
    driver.apply(&start);
    assert_eq!(driver.armed(), 1);

    let before = tokio::time::Instant::now();
    let event = expiries.recv().await.expect("expiry");
    assert!(before.elapsed() >= Duration::from_secs(10));
    assert_eq!(event, QuizEvent::CountdownExpired { ticket: first });

    let step = loop_svc.submit(&mut quiz, event).await.unwrap();
    let graded = step.graded.expect("graded");
    assert!(graded.timed_out);
    assert!(!graded.correct);
    assert_eq!(graded.question_id.as_str(), "q1");
    assert!(quiz.session().is_marked_incorrect(&"q1".into()));
    assert!(started_ticket(&step.effects).is_some());
    driver.apply(&step.effects);
    assert_eq!(driver.armed(), 1);
    assert_eq!(engine.progress().get_progress().await.points(), 0);
}

#[tokio::test(start_paused = true)]
async fn answering_cancels_the_running_countdown() {
    let engine = engine();
    let loop_svc = engine.quiz();
    let (mut driver, mut expiries) = CountdownDriver::channel(8);

    let mut quiz = loop_svc
        .start_lesson(LevelId::new(1), &LessonId::new("1-1"), QuizMode::Competitive)
        .await
        .unwrap();
    let start = quiz.take_start_effects();
    let first = started_ticket(&start).unwrap();
    driver.apply(&start);

    tokio::time::advance(Duration::from_secs(3)).await;
    let step = loop_svc
        .submit(
            &mut quiz,
            QuizEvent::Answer {
                question_id: "q1".into(),
                correct: true,
            },
        )
        .await
        .unwrap();
    assert!(step.effects.contains(&QuizEffect::CancelCountdown { ticket: first }));
    let second = started_ticket(&step.effects).unwrap();
    driver.apply(&step.effects);
    assert_eq!(driver.armed(), 1);

    // Only the fresh countdown fires.
    let event = expiries.recv().await.unwrap();
    assert_eq!(event, QuizEvent::CountdownExpired { ticket: second });

    // The cancelled one is rejected if it ever shows up.
    let stale = loop_svc
        .submit(&mut quiz, QuizEvent::CountdownExpired { ticket: first })
        .await;
    assert!(matches!(
        stale,
        Err(QuizLoopError::Quiz(QuizError::StaleCountdown(ticket))) if ticket == first
    ));
    assert_eq!(engine.progress().get_progress().await.points(), 10);
}

#[tokio::test(start_paused = true)]
async fn review_questions_are_not_timed() {
    let engine = engine();
    let loop_svc = engine.quiz();
    let (mut driver, _expiries) = CountdownDriver::channel(8);

    let mut quiz = loop_svc
        .start_lesson(LevelId::new(1), &LessonId::new("1-1"), QuizMode::Competitive)
        .await
        .unwrap();
    driver.apply(&quiz.take_start_effects());

    let mut last = Vec::new();
    for correct in [false, true, true] {
        let question_id = quiz.current_question().unwrap().id.clone();
        let step = loop_svc
            .submit(&mut quiz, QuizEvent::Answer { question_id, correct })
            .await
            .unwrap();
        driver.apply(&step.effects);
        last = step.effects;
    }

    assert_eq!(quiz.phase(), QuizPhase::Review);
    assert!(started_ticket(&last).is_none());
    assert_eq!(driver.armed(), 0);
    assert!(quiz.session().pending_countdown().is_none());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_driver_stops_its_timers() {
    let (mut driver, mut expiries) = CountdownDriver::channel(1);
    let engine = engine();
    let mut quiz = engine
        .quiz()
        .start_lesson(LevelId::new(1), &LessonId::new("1-1"), QuizMode::Competitive)
        .await
        .unwrap();
    driver.apply(&quiz.take_start_effects());
    drop(driver);

    assert_eq!(expiries.recv().await, None);
}
