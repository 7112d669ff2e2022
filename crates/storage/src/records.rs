//! Persisted JSON shapes.
//!
//! These mirror the domain types so the domain layer stays free of wire
//! concerns. Field names are camelCase to stay compatible with records
//! written by earlier clients.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use quest_core::model::{LessonId, LessonRef, LevelId, Progress, ProgressDraft};
use serde::{Deserialize, Serialize};

use crate::repository::StorageError;

/// Date format written by this crate.
const DATE_FORMAT: &str = "%Y-%m-%d";
/// Date format of records written by earlier clients (e.g. `Mon Jan 01 2024`).
const LEGACY_DATE_FORMAT: &str = "%a %b %d %Y";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressRecord {
    pub points: i64,
    pub streak: u32,
    pub last_visit: Option<String>,
    pub completed_lessons: BTreeMap<LevelId, Vec<LessonId>>,
    pub unlocked_levels: Vec<LevelId>,
    pub last_lesson: Option<LessonRef>,
}

impl ProgressRecord {
    #[must_use]
    pub fn from_progress(progress: &Progress) -> Self {
        Self {
            points: i64::try_from(progress.points()).unwrap_or(i64::MAX),
            streak: progress.streak(),
            last_visit: progress
                .last_visit()
                .map(|date| date.format(DATE_FORMAT).to_string()),
            completed_lessons: progress
                .completed_lessons()
                .iter()
                .map(|(level, lessons)| (*level, lessons.iter().cloned().collect()))
                .collect(),
            unlocked_levels: progress.unlocked_levels().iter().copied().collect(),
            last_lesson: progress.last_lesson().cloned(),
        }
    }

    /// Convert back into a domain `Progress`.
    ///
    /// Negative points clamp to zero and an unreadable date is dropped;
    /// structural invariants are restored by `ProgressDraft::into_progress`.
    #[must_use]
    pub fn into_progress(self) -> Progress {
        ProgressDraft {
            points: u64::try_from(self.points).unwrap_or(0),
            streak: self.streak,
            last_visit: self.last_visit.as_deref().and_then(parse_date),
            completed_lessons: self
                .completed_lessons
                .into_iter()
                .map(|(level, lessons)| (level, lessons.into_iter().collect::<BTreeSet<_>>()))
                .collect(),
            unlocked_levels: self.unlocked_levels.into_iter().collect(),
            last_lesson: self.last_lesson,
        }
        .into_progress()
    }

    /// Parse a stored value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the JSON does not match.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|err| StorageError::Serialization(err.to_string()))
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|err| StorageError::Serialization(err.to_string()))
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, LEGACY_DATE_FORMAT))
        .ok()
}

/// State of the daily challenge for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRecord {
    pub date: NaiveDate,
    pub challenge_id: u32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub reward_granted: bool,
}

impl ChallengeRecord {
    #[must_use]
    pub fn new(date: NaiveDate, challenge_id: u32) -> Self {
        Self {
            date,
            challenge_id,
            completed: false,
            reward_granted: false,
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the JSON does not match.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|err| StorageError::Serialization(err.to_string()))
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|err| StorageError::Serialization(err.to_string()))
    }
}
