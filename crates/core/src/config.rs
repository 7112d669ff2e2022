//! Engine configuration: scoring and timing per mode, badge and rank thresholds.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quiz mode; alters scoring and timing policy, never question content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizMode {
    Relaxed,
    Competitive,
    Learning,
}

/// Scoring and timing rules for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModePolicy {
    /// Points for a correct answer in the normal pass.
    pub correct_points: u32,
    /// Points for a correct answer during review.
    pub review_points: u32,
    /// Per-question countdown in seconds; `None` disables the timer.
    pub countdown_secs: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringTable {
    pub relaxed: ModePolicy,
    pub competitive: ModePolicy,
    pub learning: ModePolicy,
}

impl Default for ScoringTable {
    fn default() -> Self {
        Self {
            relaxed: ModePolicy {
                correct_points: 5,
                review_points: 5,
                countdown_secs: None,
            },
            competitive: ModePolicy {
                correct_points: 10,
                review_points: 10,
                countdown_secs: Some(10),
            },
            learning: ModePolicy {
                correct_points: 5,
                review_points: 5,
                countdown_secs: None,
            },
        }
    }
}

impl ScoringTable {
    #[must_use]
    pub fn policy(&self, mode: QuizMode) -> ModePolicy {
        match mode {
            QuizMode::Relaxed => self.relaxed,
            QuizMode::Competitive => self.competitive,
            QuizMode::Learning => self.learning,
        }
    }
}

/// Point totals at which a learner moves up a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankThresholds {
    pub intermediate: u64,
    pub expert: u64,
}

impl Default for RankThresholds {
    fn default() -> Self {
        Self {
            intermediate: 50,
            expert: 150,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("namespace must not be empty")]
    EmptyNamespace,
    #[error("countdown for {0:?} must be at least one second")]
    ZeroCountdown(QuizMode),
    #[error("streak badge thresholds must be positive and strictly increasing")]
    UnorderedStreakThresholds,
    #[error("rank thresholds must satisfy intermediate < expert")]
    UnorderedRankThresholds,
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid config json: {0}")]
    Parse(String),
}

pub const ENV_NAMESPACE: &str = "QUEST_NAMESPACE";
pub const ENV_COUNTDOWN_SECS: &str = "QUEST_COUNTDOWN_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix for every key the engine writes to the persistence port.
    pub namespace: String,
    pub scoring: ScoringTable,
    /// Learning mode: a question whose answer was revealed earns nothing.
    pub learning_reveal_forfeits_points: bool,
    pub streak_badge_thresholds: Vec<u32>,
    pub rank_thresholds: RankThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "finast".to_string(),
            scoring: ScoringTable::default(),
            learning_reveal_forfeits_points: true,
            streak_badge_thresholds: vec![3, 7],
            rank_thresholds: RankThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON or any validation error.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()
    }

    /// Defaults overridden by `QUEST_NAMESPACE` and `QUEST_COUNTDOWN_SECS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnv` when a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for unparsable overrides or an invalid result.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            self.namespace = namespace.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_COUNTDOWN_SECS) {
            let secs = raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: ENV_COUNTDOWN_SECS,
                    value: raw.clone(),
                })?;
            self.scoring.competitive.countdown_secs = Some(secs);
        }
        self.validate()
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        for mode in [QuizMode::Relaxed, QuizMode::Competitive, QuizMode::Learning] {
            if self.scoring.policy(mode).countdown_secs == Some(0) {
                return Err(ConfigError::ZeroCountdown(mode));
            }
        }
        let increasing = self.streak_badge_thresholds.windows(2).all(|w| w[0] < w[1]);
        if !increasing || self.streak_badge_thresholds.contains(&0) {
            return Err(ConfigError::UnorderedStreakThresholds);
        }
        if self.rank_thresholds.intermediate >= self.rank_thresholds.expert {
            return Err(ConfigError::UnorderedRankThresholds);
        }
        Ok(self)
    }

    #[must_use]
    pub fn policy(&self, mode: QuizMode) -> ModePolicy {
        self.scoring.policy(mode)
    }
}
