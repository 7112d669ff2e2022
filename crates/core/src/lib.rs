#![forbid(unsafe_code)]

pub mod achievements;
pub mod challenge;
pub mod config;
pub mod model;
pub mod quiz;
pub mod streak;
pub mod time;

pub use config::{EngineConfig, QuizMode};
pub use time::Clock;
