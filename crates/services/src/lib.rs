#![forbid(unsafe_code)]

pub mod account;
pub mod auth;
pub mod error;
pub mod player;
pub mod retry;
pub mod tracker;

pub use course_core::Clock;

pub use account::AccountService;
pub use auth::{AuthEvents, AuthProvider, StaticAuth};
pub use error::{AccountError, PlayerError, TrackerError};
pub use player::{PlayerConnection, PlayerHandle, PlayerProvider, PlayerState, wait_until_ready};
pub use retry::{RetryPolicy, with_retry};
pub use tracker::{ProgressTracker, TrackerConfig};
