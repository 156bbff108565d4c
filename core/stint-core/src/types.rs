//! Persistent record types shared between the timer core and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StintError;

/// The single run-in-progress row. Its presence in the store is
/// authoritative proof that a run was active when the process last had
/// control: written on start, deleted on clean stop, read back on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenStint {
    pub started_at: DateTime<Utc>,
    pub tag: String,
}

impl OpenStint {
    /// Rebuild an open stint from its stored columns.
    ///
    /// The store keeps timestamps as RFC3339 text; a row that fails to
    /// parse is reported as corrupt so recovery can skip it instead of
    /// crashing.
    pub fn from_columns(started_at: &str, tag: &str) -> Result<Self, StintError> {
        let started_at = parse_rfc3339(started_at).ok_or_else(|| {
            StintError::CorruptOpenStint(format!("bad started_at timestamp: {}", started_at))
        })?;
        if tag.trim().is_empty() {
            return Err(StintError::CorruptOpenStint("empty tag".to_string()));
        }
        Ok(Self {
            started_at,
            tag: tag.to_string(),
        })
    }
}

/// A completed run. Immutable once written; only a clean stop creates one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StintRecord {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Whole seconds between start and end, floored, never negative.
    pub duration_secs: i64,
    pub tag: String,
}

pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
