//! Wall-clock player simulation backing the `watch` command.
//!
//! Stands in for the embedded video widget: duration appears only after a
//! short metadata delay, the position advances at a configurable multiple of
//! real time, and an ENDED state change fires when the end is reached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::sleep;

use services::{PlayerConnection, PlayerError, PlayerHandle, PlayerProvider, PlayerState};

/// Duration is reported as unknown for this long after construction.
const METADATA_DELAY: Duration = Duration::from_millis(400);
/// Cadence of the end-of-playback check.
const MONITOR_INTERVAL: Duration = Duration::from_millis(250);

pub struct SimulatedPlayer {
    created: Instant,
    duration: f64,
    rate: f64,
    /// Seek base in video seconds; position = offset + elapsed * rate.
    offset: Mutex<f64>,
    destroyed: AtomicBool,
}

impl SimulatedPlayer {
    fn new(duration: f64, rate: f64) -> Self {
        Self {
            created: Instant::now(),
            duration,
            rate,
            offset: Mutex::new(0.0),
            destroyed: AtomicBool::new(false),
        }
    }

    fn elapsed_video_seconds(&self) -> f64 {
        self.created.elapsed().as_secs_f64() * self.rate
    }

    fn metadata_available(&self) -> bool {
        self.created.elapsed() >= METADATA_DELAY
    }
}

impl PlayerHandle for SimulatedPlayer {
    fn duration(&self) -> Option<f64> {
        if self.metadata_available() {
            Some(self.duration)
        } else {
            None
        }
    }

    fn current_time(&self) -> Option<f64> {
        if !self.metadata_available() {
            return None;
        }
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        Some((offset + self.elapsed_video_seconds()).min(self.duration))
    }

    fn seek_to(&self, seconds: u32, _allow_seek_ahead: bool) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset = f64::from(seconds) - self.elapsed_video_seconds();
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Provider constructing simulated players.
///
/// Reports not-ready for a moment after creation so the attach path exercises
/// its readiness probing, just as against the real widget API.
pub struct SimulatedProvider {
    ready_at: Instant,
    duration: f64,
    rate: f64,
}

impl SimulatedProvider {
    pub fn new(duration_secs: f64, rate: f64) -> Self {
        Self {
            ready_at: Instant::now() + Duration::from_millis(300),
            duration: duration_secs,
            rate,
        }
    }
}

#[async_trait]
impl PlayerProvider for SimulatedProvider {
    fn is_ready(&self) -> bool {
        Instant::now() >= self.ready_at
    }

    async fn create_player(
        &self,
        _embed_dom_id: &str,
        _video_id: &str,
    ) -> Result<PlayerConnection, PlayerError> {
        let player = Arc::new(SimulatedPlayer::new(self.duration, self.rate));
        let (tx, rx) = mpsc::channel(8);

        let monitor = Arc::clone(&player);
        tokio::spawn(async move {
            // playback starts as soon as metadata is in
            sleep(METADATA_DELAY).await;
            if tx.send(PlayerState::Playing).await.is_err() {
                return;
            }
            loop {
                sleep(MONITOR_INTERVAL).await;
                if monitor.destroyed.load(Ordering::SeqCst) {
                    return;
                }
                let ended = monitor
                    .current_time()
                    .is_some_and(|t| t >= monitor.duration);
                if ended {
                    let _ = tx.send(PlayerState::Ended).await;
                    return;
                }
            }
        });

        Ok(PlayerConnection {
            handle: player,
            events: rx,
        })
    }
}
