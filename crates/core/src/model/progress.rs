use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::LessonId;

//
// ─── PERCENT ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("percent out of range: {0}")]
pub struct PercentOutOfRange(pub u8);

/// Truncated integer watch progress, always in `0..=100`.
///
/// Percentages are obtained by truncation, never rounding, so a value can sit
/// just under a boundary for several poll ticks. That is expected behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percent(u8);

impl Percent {
    pub const ZERO: Percent = Percent(0);
    pub const COMPLETE: Percent = Percent(100);

    /// Creates a percent from an already-truncated integer.
    ///
    /// # Errors
    ///
    /// Returns `PercentOutOfRange` for values above 100.
    pub fn new(value: u8) -> Result<Self, PercentOutOfRange> {
        if value > 100 {
            return Err(PercentOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Truncated percent from a raw playback telemetry sample.
    ///
    /// Returns `None` when either value is non-finite or the duration is not
    /// positive; such samples occur while the player is still buffering and
    /// must be skipped, not treated as errors. A position past the reported
    /// duration clamps to 100.
    #[must_use]
    pub fn from_sample(current_time: f64, duration: f64) -> Option<Percent> {
        if !current_time.is_finite() || !duration.is_finite() {
            return None;
        }
        if duration <= 0.0 || current_time < 0.0 {
            return None;
        }

        let truncated = (current_time / duration * 100.0).floor().min(100.0);
        // Truncated and clamped to [0, 100] above, so the cast is exact.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = truncated as u8;
        Some(Self(value))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_complete(self) -> bool {
        self.0 >= 100
    }

    /// Playback offset in whole seconds for resuming at this percent:
    /// `floor(percent / 100 * duration)`.
    ///
    /// Returns 0 when the duration is non-finite or not positive; callers must
    /// not seek until the player reports a usable duration.
    // The floored value is non-negative; `as` saturates at u32::MAX.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn seek_target(self, duration: f64) -> u32 {
        if !duration.is_finite() || duration <= 0.0 {
            return 0;
        }
        (f64::from(self.0) / 100.0 * duration).floor() as u32
    }
}

impl TryFrom<u8> for Percent {
    type Error = PercentOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percent> for u8 {
    fn from(value: Percent) -> Self {
        value.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Per-lesson progress view assembled from a user document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub lesson_id: LessonId,
    pub percent: Percent,
    pub completed: bool,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
