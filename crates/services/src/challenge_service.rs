use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use quest_core::Clock;
use quest_core::challenge::{self, ChallengeDefinition};
use storage::records::ChallengeRecord;
use storage::repository::{KeyValueStore, StorageKeys};

use crate::events::ProgressEvent;
use crate::progress_store::ProgressStore;

/// Snapshot of today's challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeStatus {
    pub date: NaiveDate,
    pub definition: &'static ChallengeDefinition,
    /// Progress toward the target, clamped to the target.
    pub progress: u64,
    pub completed: bool,
    pub reward_granted: bool,
    /// True only for the check that granted the reward.
    pub newly_completed: bool,
}

impl ChallengeStatus {
    #[must_use]
    pub fn target(&self) -> u64 {
        self.definition.target
    }
}

/// Tracks the daily challenge and grants its reward exactly once.
///
/// Progress is recomputed from the progress store on every check. The
/// reward flag is persisted before the points are granted; when that write
/// fails the reward stays pending until a later check can persist it.
pub struct ChallengeTracker {
    store: Arc<ProgressStore>,
    kv: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
    clock: Clock,
    record: Mutex<Option<ChallengeRecord>>,
}

impl ChallengeTracker {
    #[must_use]
    pub fn new(store: Arc<ProgressStore>, kv: Arc<dyn KeyValueStore>, clock: Clock) -> Self {
        let keys = StorageKeys::new(&store.config().namespace);
        Self {
            store,
            kv,
            keys,
            clock,
            record: Mutex::new(None),
        }
    }

    /// Today's challenge and its progress, without granting anything.
    pub async fn current(&self) -> ChallengeStatus {
        let mut cached = self.record.lock().await;
        let record = self.load_for(&mut cached, self.clock.today()).await;
        let definition = definition_for(&record);
        let progress = self.measure(definition).await;
        ChallengeStatus {
            date: record.date,
            definition,
            progress,
            completed: record.completed || progress >= definition.target,
            reward_granted: record.reward_granted,
            newly_completed: false,
        }
    }

    /// Recompute today's challenge, completing it and granting the reward on
    /// the first check that reaches the target.
    pub async fn check(&self) -> ChallengeStatus {
        let mut cached = self.record.lock().await;
        let mut record = self.load_for(&mut cached, self.clock.today()).await;
        let definition = definition_for(&record);
        let progress = self.measure(definition).await;

        if !record.completed && progress >= definition.target {
            record.completed = true;
            debug!(challenge_id = definition.id, "daily challenge completed");
        }

        let mut newly_completed = false;
        if record.completed && !record.reward_granted {
            let mut granted = record.clone();
            granted.reward_granted = true;
            if self.persist(&granted).await {
                record = granted;
                self.store.add_points(i64::from(definition.reward)).await;
                self.store.events().publish(ProgressEvent::ChallengeCompleted {
                    challenge_id: definition.id,
                    reward: definition.reward,
                });
                info!(challenge_id = definition.id, reward = definition.reward, "challenge reward granted");
                newly_completed = true;
            } else {
                // Keep the completion; the reward waits for a successful write.
                self.persist(&record).await;
            }
        }
        *cached = Some(record.clone());

        ChallengeStatus {
            date: record.date,
            definition,
            progress,
            completed: record.completed,
            reward_granted: record.reward_granted,
            newly_completed,
        }
    }

    /// Re-check the challenge after every progress change.
    ///
    /// The subscription is taken before this returns, so no change made after
    /// the call is missed. The task holds the tracker weakly and ends at the
    /// next event once every other handle to it is dropped.
    pub fn watch(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.store.subscribe();
        let tracker = Arc::downgrade(&self);
        drop(self);
        tokio::spawn(async move {
            loop {
                let event = rx.recv().await;
                let Some(tracker) = tracker.upgrade() else {
                    debug!("challenge tracker dropped, stopping watcher");
                    break;
                };
                match event {
                    Ok(ProgressEvent::ChallengeCompleted { .. }) => {}
                    Ok(_) => {
                        tracker.check().await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "challenge watcher lagged behind progress events");
                        tracker.check().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn measure(&self, definition: &ChallengeDefinition) -> u64 {
        let progress = self.store.get_progress().await;
        challenge::challenge_progress(definition, &progress, self.store.curriculum())
    }

    /// The stored record when it belongs to `today`, otherwise a fresh one.
    async fn load_for(&self, cached: &mut Option<ChallengeRecord>, today: NaiveDate) -> ChallengeRecord {
        match self.kv.get(&self.keys.daily_challenge).await {
            Ok(Some(raw)) => match ChallengeRecord::from_json(&raw) {
                Ok(record) => *cached = Some(record),
                Err(err) => {
                    warn!(key = %self.keys.daily_challenge, error = %err, "malformed challenge record, starting over");
                    *cached = None;
                }
            },
            Ok(None) => *cached = None,
            Err(err) => {
                warn!(key = %self.keys.daily_challenge, error = %err, "challenge record unreadable, keeping in-memory state");
            }
        }

        match cached.as_ref() {
            Some(record)
                if record.date == today && challenge::find_challenge(record.challenge_id).is_some() =>
            {
                record.clone()
            }
            _ => {
                let definition = challenge::challenge_for_date(today);
                let record = ChallengeRecord::new(today, definition.id);
                self.persist(&record).await;
                *cached = Some(record.clone());
                record
            }
        }
    }

    async fn persist(&self, record: &ChallengeRecord) -> bool {
        let json = match record.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to encode challenge record");
                return false;
            }
        };
        match self.kv.set(&self.keys.daily_challenge, &json).await {
            Ok(()) => true,
            Err(err) => {
                warn!(key = %self.keys.daily_challenge, error = %err, "failed to persist challenge record");
                false
            }
        }
    }
}

fn definition_for(record: &ChallengeRecord) -> &'static ChallengeDefinition {
    challenge::find_challenge(record.challenge_id)
        .unwrap_or_else(|| challenge::challenge_for_date(record.date))
}
