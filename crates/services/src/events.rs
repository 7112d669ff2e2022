//! Progress notifications for presentation layers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use quest_core::model::{LessonId, LevelId};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressEvent {
    PointsChanged {
        total: u64,
    },
    LevelUnlocked {
        level_id: LevelId,
    },
    LessonCompleted {
        level_id: LevelId,
        lesson_id: LessonId,
        points_earned: u64,
    },
    LevelCompleted {
        level_id: LevelId,
    },
    ChallengeCompleted {
        challenge_id: u32,
        reward: u32,
    },
}

impl ProgressEvent {
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            ProgressEvent::PointsChanged { .. } => "POINTS_CHANGED",
            ProgressEvent::LevelUnlocked { .. } => "LEVEL_UNLOCKED",
            ProgressEvent::LessonCompleted { .. } => "LESSON_COMPLETED",
            ProgressEvent::LevelCompleted { .. } => "LEVEL_COMPLETED",
            ProgressEvent::ChallengeCompleted { .. } => "CHALLENGE_COMPLETED",
        }
    }
}

/// Broadcast hub owned by the progress store.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and slow subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<ProgressEvent>,
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: ProgressEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(receivers) => debug!(event_type, receivers, "progress event published"),
            Err(_) => debug!(event_type, "progress event dropped, no subscribers"),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
