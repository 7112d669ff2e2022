use std::sync::Arc;

use tokio::task::JoinHandle;

use quest_core::EngineConfig;
use quest_core::model::Curriculum;
use storage::repository::Storage;

use crate::Clock;
use crate::challenge_service::{ChallengeStatus, ChallengeTracker};
use crate::error::EngineError;
use crate::events::EventHub;
use crate::progress_store::ProgressStore;
use crate::quiz::QuizLoopService;

/// Assembles the engine's services over one storage backend.
#[derive(Clone)]
pub struct Engine {
    clock: Clock,
    config: Arc<EngineConfig>,
    events: EventHub,
    progress: Arc<ProgressStore>,
    quiz: Arc<QuizLoopService>,
    challenges: Arc<ChallengeTracker>,
}

impl Engine {
    /// Build the engine backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` if the config is invalid or storage
    /// initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        curriculum: Curriculum,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let config = config.validate()?;
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::assemble(storage, clock, curriculum, config))
    }

    /// Build the engine over a volatile in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` if the config is invalid.
    pub fn in_memory(
        clock: Clock,
        curriculum: Curriculum,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        Self::with_storage(Storage::in_memory(), clock, curriculum, config)
    }

    /// Build the engine over any storage backend.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` if the config is invalid.
    pub fn with_storage(
        storage: Storage,
        clock: Clock,
        curriculum: Curriculum,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let config = config.validate()?;
        Ok(Self::assemble(storage, clock, curriculum, config))
    }

    fn assemble(storage: Storage, clock: Clock, curriculum: Curriculum, config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let events = EventHub::new();
        let progress = Arc::new(ProgressStore::new(
            Arc::clone(&storage.kv),
            Arc::new(curriculum),
            Arc::clone(&config),
            events.clone(),
        ));
        let quiz = Arc::new(QuizLoopService::new(Arc::clone(&progress)));
        let challenges = Arc::new(ChallengeTracker::new(
            Arc::clone(&progress),
            Arc::clone(&storage.kv),
            clock,
        ));
        tracing::debug!(namespace = %config.namespace, "engine assembled");

        Self {
            clock,
            config,
            events,
            progress,
            quiz,
            challenges,
        }
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressStore> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn quiz(&self) -> Arc<QuizLoopService> {
        Arc::clone(&self.quiz)
    }

    #[must_use]
    pub fn challenges(&self) -> Arc<ChallengeTracker> {
        Arc::clone(&self.challenges)
    }

    /// Record today's visit for the streak and re-check the daily challenge.
    pub async fn record_visit(&self) -> ChallengeStatus {
        self.progress.record_visit(self.clock.today()).await;
        self.challenges.check().await
    }

    /// Keep the daily challenge in step with every progress change.
    #[must_use]
    pub fn spawn_challenge_watcher(&self) -> JoinHandle<()> {
        Arc::clone(&self.challenges).watch()
    }
}
