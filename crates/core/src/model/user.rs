use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{LessonId, UserId};
use crate::model::progress::{Percent, ProgressRecord};

/// Persisted per-user document: identity plus the two per-lesson maps.
///
/// The maps default to empty on deserialization so documents written before
/// either field existed still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDocument {
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub progress: BTreeMap<LessonId, Percent>,
    #[serde(default)]
    pub completed: BTreeMap<LessonId, bool>,
    pub created_at: DateTime<Utc>,
}

impl UserDocument {
    /// A fresh document with empty progress and completion maps, written once
    /// at first sight of a user.
    #[must_use]
    pub fn new(user_id: UserId, email: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            email: email.into(),
            progress: BTreeMap::new(),
            completed: BTreeMap::new(),
            created_at,
        }
    }

    /// Per-lesson view; absent entries read as 0% / not completed.
    #[must_use]
    pub fn record(&self, lesson_id: &LessonId) -> ProgressRecord {
        ProgressRecord {
            lesson_id: lesson_id.clone(),
            percent: self.progress.get(lesson_id).copied().unwrap_or(Percent::ZERO),
            completed: self.completed.get(lesson_id).copied().unwrap_or(false),
        }
    }
}
