#![forbid(unsafe_code)]

pub mod records;
pub mod repository;
pub mod sqlite;

pub use records::{ChallengeRecord, ProgressRecord};
pub use repository::{InMemoryStore, KeyValueStore, Storage, StorageError, StorageKeys};
