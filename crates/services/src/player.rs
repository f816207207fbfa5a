use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::error::PlayerError;

/// Handle to an embedded player widget.
///
/// Duration and position may be missing, or reported as NaN, while the widget
/// is still buffering; callers must treat non-finite values as absent.
pub trait PlayerHandle: Send + Sync {
    fn duration(&self) -> Option<f64>;

    fn current_time(&self) -> Option<f64>;

    /// Seek to an absolute offset in whole seconds. `allow_seek_ahead`
    /// permits seeking past the currently buffered range.
    fn seek_to(&self, seconds: u32, allow_seek_ahead: bool);

    /// Tear the widget down; the handle must not be used afterwards.
    fn destroy(&self);
}

/// Playback state changes observable from the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Ended,
}

/// A constructed player: the control handle plus its state-change stream.
pub struct PlayerConnection {
    pub handle: Arc<dyn PlayerHandle>,
    pub events: mpsc::Receiver<PlayerState>,
}

/// Contract with the embeddable player widget API.
///
/// The API loads asynchronously; `is_ready` must be probed until it reports
/// true before any player can be constructed.
#[async_trait]
pub trait PlayerProvider: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Construct a player bound to the given DOM element id.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Construction` when the widget cannot be built.
    async fn create_player(
        &self,
        embed_dom_id: &str,
        video_id: &str,
    ) -> Result<PlayerConnection, PlayerError>;
}

/// Wait for the widget API to finish loading.
///
/// A single awaitable with a bounded probe count, so callers can cancel it by
/// dropping the future.
///
/// # Errors
///
/// Returns `PlayerError::WidgetUnavailable` once `max_probes` probes have
/// elapsed without the API becoming ready.
pub async fn wait_until_ready(
    provider: &dyn PlayerProvider,
    probe_interval: Duration,
    max_probes: u32,
) -> Result<(), PlayerError> {
    let mut probes = 0;
    loop {
        if provider.is_ready() {
            return Ok(());
        }
        probes += 1;
        if probes >= max_probes {
            return Err(PlayerError::WidgetUnavailable);
        }
        sleep(probe_interval).await;
    }
}
