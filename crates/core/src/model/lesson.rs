use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::ids::LessonId;

/// Prefix for the DOM element id hosting a lesson's embedded player.
pub const EMBED_ID_PREFIX: &str = "yt-player-";

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// A catalog entry describing one embeddable video unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    id: LessonId,
    source_url: String,
}

impl Lesson {
    #[must_use]
    pub fn new(id: LessonId, source_url: impl Into<String>) -> Self {
        Self {
            id,
            source_url: source_url.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &LessonId {
        &self.id
    }

    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Video identifier extracted from the `v` query parameter of the source URL.
    ///
    /// Returns `None` when the URL cannot be parsed or carries no `v` parameter.
    #[must_use]
    pub fn video_id(&self) -> Option<String> {
        let url = Url::parse(&self.source_url).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }

    /// Embeddable player URL derived from the source URL.
    #[must_use]
    pub fn embed_url(&self) -> Option<String> {
        self.video_id()
            .map(|id| format!("https://www.youtube.com/embed/{id}?enablejsapi=1"))
    }

    /// DOM element id the embedded player widget is constructed against.
    #[must_use]
    pub fn embed_dom_id(&self) -> String {
        format!("{EMBED_ID_PREFIX}{}", self.id)
    }
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("lesson catalog is empty")]
    Empty,

    #[error("duplicate lesson id: {0}")]
    DuplicateId(LessonId),
}

/// Static ordered list of lessons, fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonCatalog {
    lessons: Vec<Lesson>,
}

impl LessonCatalog {
    /// Build a catalog from an ordered lesson list.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Empty` for an empty list and
    /// `CatalogError::DuplicateId` when two lessons share an id.
    pub fn new(lessons: Vec<Lesson>) -> Result<Self, CatalogError> {
        if lessons.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for lesson in &lessons {
            if !seen.insert(lesson.id().clone()) {
                return Err(CatalogError::DuplicateId(lesson.id().clone()));
            }
        }

        Ok(Self { lessons })
    }

    #[must_use]
    pub fn get(&self, id: &LessonId) -> Option<&Lesson> {
        self.lessons.iter().find(|lesson| lesson.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: &LessonId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lesson> {
        self.lessons.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
