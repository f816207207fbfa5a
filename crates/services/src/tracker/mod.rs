mod service;
mod session;

// Public API of the tracker subsystem.
pub use crate::error::TrackerError;
pub use service::{ProgressTracker, TrackerConfig};
