use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use course_core::model::{LessonCatalog, LessonId, Percent, ProgressRecord, UserId};
use storage::repository::UserRepository;

use crate::error::{PlayerError, TrackerError};
use crate::player::{PlayerHandle, PlayerProvider, PlayerState, wait_until_ready};
use crate::retry::{RetryPolicy, with_retry};
use crate::tracker::session::PlayerSession;

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Timing knobs for the tracker. Defaults match the production cadence.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Cadence of playback telemetry sampling while playing.
    pub poll_interval: Duration,
    /// Cadence of widget-readiness probing while attaching.
    pub ready_probe_interval: Duration,
    /// Probe budget before attaching gives up on the widget API.
    pub ready_max_probes: u32,
    /// Cadence of duration probing before the resume seek.
    pub seek_probe_interval: Duration,
    /// Probe budget before the resume seek is skipped.
    pub seek_max_probes: u32,
    /// Retry policy for fire-and-forget progress writes.
    pub write_retry: RetryPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(3000),
            ready_probe_interval: Duration::from_millis(200),
            ready_max_probes: 50,
            seek_probe_interval: Duration::from_millis(300),
            seek_max_probes: 40,
            write_retry: RetryPolicy::document_write(),
        }
    }
}

//
// ─── TRACKER ───────────────────────────────────────────────────────────────────
//

/// Manages lesson playback sessions: converts raw player telemetry into
/// persisted watch progress and restores playback position from it.
///
/// At most one session exists per lesson, and only one lesson is expanded at
/// a time; expanding another lesson destroys the previous session. All
/// persisted percents are monotonically non-decreasing.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Inner>,
}

struct Inner {
    config: TrackerConfig,
    catalog: LessonCatalog,
    users: Arc<dyn UserRepository>,
    provider: Arc<dyn PlayerProvider>,
    state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    user: Option<UserId>,
    expanded: Option<LessonId>,
    /// Latest sample per lesson, updated unconditionally for display.
    progress: HashMap<LessonId, Percent>,
    /// Highest percent dispatched to storage and not known to have failed.
    persisted: HashMap<LessonId, Percent>,
    completed: HashMap<LessonId, bool>,
    sessions: HashMap<LessonId, PlayerSession>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(
        catalog: LessonCatalog,
        users: Arc<dyn UserRepository>,
        provider: Arc<dyn PlayerProvider>,
    ) -> Self {
        Self::with_config(TrackerConfig::default(), catalog, users, provider)
    }

    #[must_use]
    pub fn with_config(
        config: TrackerConfig,
        catalog: LessonCatalog,
        users: Arc<dyn UserRepository>,
        provider: Arc<dyn PlayerProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                catalog,
                users,
                provider,
                state: Mutex::new(TrackerState::default()),
            }),
        }
    }

    /// Record the signed-in user and populate the in-memory maps from the
    /// stored document.
    ///
    /// Fails soft: a missing document or a storage error is logged and leaves
    /// the maps empty, so the dashboard renders either way.
    pub async fn load_initial_state(&self, user_id: UserId) {
        self.inner.lock_state().user = Some(user_id.clone());

        match self.inner.users.get_user(&user_id).await {
            Ok(Some(document)) => {
                let mut state = self.inner.lock_state();
                state.progress = document.progress.iter().map(|(k, v)| (k.clone(), *v)).collect();
                state.persisted = state.progress.clone();
                state.completed = document.completed.into_iter().collect();
                debug!(user = %user_id, lessons = state.progress.len(), "loaded stored progress");
            }
            Ok(None) => {
                debug!(user = %user_id, "no stored document; starting empty");
            }
            Err(err) => {
                warn!(user = %user_id, error = %err, "failed to load user document");
            }
        }
    }

    /// Toggle the expanded lesson.
    ///
    /// Expanding the already-expanded lesson collapses it and destroys its
    /// session. Expanding a different lesson destroys the previous session
    /// first, then waits for the widget API and attaches a player resuming at
    /// the lesson's last known percent.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` when the lesson is unknown or the widget cannot
    /// be resolved; the tracker is left collapsed in that case.
    pub async fn expand(&self, lesson_id: &LessonId) -> Result<(), TrackerError> {
        let (collapsed, previous) = {
            let mut state = self.inner.lock_state();
            if state.expanded.as_ref() == Some(lesson_id) {
                state.expanded = None;
                (true, Some(lesson_id.clone()))
            } else {
                let previous = state.expanded.replace(lesson_id.clone());
                (false, previous)
            }
        };

        if let Some(previous) = &previous {
            self.inner.destroy_session(previous);
        }
        if collapsed {
            return Ok(());
        }

        let initial = {
            let state = self.inner.lock_state();
            state.progress.get(lesson_id).copied().unwrap_or(Percent::ZERO)
        };

        match self.attach_player(lesson_id, initial).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let mut state = self.inner.lock_state();
                if state.expanded.as_ref() == Some(lesson_id) {
                    state.expanded = None;
                }
                Err(err)
            }
        }
    }

    /// Attach a player session for a lesson, resuming at `initial` percent.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::SessionExists` when the lesson already has a
    /// session (the previous one must be destroyed first),
    /// `TrackerError::UnknownLesson` for ids outside the catalog, and player
    /// errors when the widget never becomes available or cannot be built.
    pub async fn attach_player(
        &self,
        lesson_id: &LessonId,
        initial: Percent,
    ) -> Result<(), TrackerError> {
        let inner = &self.inner;
        let lesson = inner
            .catalog
            .get(lesson_id)
            .ok_or_else(|| TrackerError::UnknownLesson(lesson_id.clone()))?;
        let video_id = lesson.video_id().ok_or(PlayerError::InvalidSource)?;

        if inner.lock_state().sessions.contains_key(lesson_id) {
            return Err(TrackerError::SessionExists(lesson_id.clone()));
        }

        wait_until_ready(
            inner.provider.as_ref(),
            inner.config.ready_probe_interval,
            inner.config.ready_max_probes,
        )
        .await?;

        let connection = inner
            .provider
            .create_player(&lesson.embed_dom_id(), &video_id)
            .await?;
        let player = connection.handle;

        {
            let mut state = inner.lock_state();
            if state.sessions.contains_key(lesson_id) {
                drop(state);
                player.destroy();
                return Err(TrackerError::SessionExists(lesson_id.clone()));
            }
            state
                .sessions
                .insert(lesson_id.clone(), PlayerSession::new(Arc::clone(&player)));
        }

        let pump = Inner::spawn_state_pump(inner, lesson_id.clone(), connection.events);
        let resume = Inner::spawn_resume_seek(inner, lesson_id.clone(), Arc::clone(&player), initial);

        let mut state = inner.lock_state();
        if let Some(session) = state.sessions.get_mut(lesson_id) {
            session.set_tasks(pump, resume);
        } else {
            // torn down in the meantime; the freshly spawned tasks must go too
            pump.abort();
            resume.abort();
        }
        Ok(())
    }

    /// Start the telemetry poll for a lesson's session.
    ///
    /// No-op when a poll is already running (idempotent start) or when the
    /// lesson has no session.
    pub fn start_tracking(&self, lesson_id: &LessonId) {
        Inner::start_tracking(&self.inner, lesson_id);
    }

    /// Clear the telemetry poll for a lesson; no-op when none is running.
    pub fn stop_tracking(&self, lesson_id: &LessonId) {
        Inner::stop_tracking(&self.inner, lesson_id);
    }

    /// Flip the completion flag and persist it.
    ///
    /// The in-memory flag is updated optimistically and rolled back when the
    /// write fails, so the caller can offer a retry.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::NotAuthenticated` when no user is signed in and
    /// `TrackerError::Storage` when persistence fails (after rollback).
    pub async fn toggle_complete(&self, lesson_id: &LessonId) -> Result<bool, TrackerError> {
        let (user, next) = {
            let mut state = self.inner.lock_state();
            let Some(user) = state.user.clone() else {
                warn!(lesson = %lesson_id, "not signed in; completion toggle aborted");
                return Err(TrackerError::NotAuthenticated);
            };
            let next = !state.completed.get(lesson_id).copied().unwrap_or(false);
            state.completed.insert(lesson_id.clone(), next);
            (user, next)
        };

        match self.inner.users.merge_completed(&user, lesson_id, next).await {
            Ok(()) => Ok(next),
            Err(err) => {
                warn!(lesson = %lesson_id, error = %err, "completion write failed; rolling back");
                let mut state = self.inner.lock_state();
                state.completed.insert(lesson_id.clone(), !next);
                Err(TrackerError::Storage(err))
            }
        }
    }

    /// Destroy every session: abort all polls and event pumps, destroy all
    /// player handles. Safe to call repeatedly and with no sessions active.
    pub fn teardown(&self) {
        let sessions = {
            let mut state = self.inner.lock_state();
            state.expanded = None;
            std::mem::take(&mut state.sessions)
        };
        for (lesson_id, session) in sessions {
            debug!(lesson = %lesson_id, "destroying session");
            drop(session);
        }
    }

    // ─── Read-only snapshots for the rendering layer ───────────────────────────

    #[must_use]
    pub fn progress_snapshot(&self) -> HashMap<LessonId, Percent> {
        self.inner.lock_state().progress.clone()
    }

    #[must_use]
    pub fn completed_snapshot(&self) -> HashMap<LessonId, bool> {
        self.inner.lock_state().completed.clone()
    }

    /// Per-lesson view of the current in-memory state.
    #[must_use]
    pub fn record(&self, lesson_id: &LessonId) -> ProgressRecord {
        let state = self.inner.lock_state();
        ProgressRecord {
            lesson_id: lesson_id.clone(),
            percent: state.progress.get(lesson_id).copied().unwrap_or(Percent::ZERO),
            completed: state.completed.get(lesson_id).copied().unwrap_or(false),
        }
    }

    #[must_use]
    pub fn expanded(&self) -> Option<LessonId> {
        self.inner.lock_state().expanded.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        self.inner.lock_state().user.clone()
    }

    #[must_use]
    pub fn is_tracking(&self, lesson_id: &LessonId) -> bool {
        self.inner
            .lock_state()
            .sessions
            .get(lesson_id)
            .is_some_and(PlayerSession::is_polling)
    }

    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.inner.lock_state().sessions.len()
    }
}

//
// ─── INTERNALS ─────────────────────────────────────────────────────────────────
//

impl Inner {
    /// Locks the tracker state, recovering from a poisoned lock: the state is
    /// plain data and stays usable even if a panic interrupted an operation.
    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn destroy_session(&self, lesson_id: &LessonId) {
        let session = self.lock_state().sessions.remove(lesson_id);
        if let Some(session) = session {
            debug!(lesson = %lesson_id, "destroying session");
            drop(session);
        }
    }

    fn start_tracking(inner: &Arc<Self>, lesson_id: &LessonId) {
        let player = {
            let state = inner.lock_state();
            let Some(session) = state.sessions.get(lesson_id) else {
                debug!(lesson = %lesson_id, "start_tracking without a session; ignoring");
                return;
            };
            if session.is_polling() {
                return;
            }
            Arc::clone(session.player())
        };

        let poll = Self::spawn_poll(inner, lesson_id.clone(), player);

        let mut state = inner.lock_state();
        match state.sessions.get_mut(lesson_id) {
            Some(session) if !session.is_polling() => session.set_poll(poll),
            // lost a race with another start, a stop, or a teardown
            _ => poll.abort(),
        }
    }

    fn stop_tracking(inner: &Arc<Self>, lesson_id: &LessonId) {
        let mut state = inner.lock_state();
        if let Some(session) = state.sessions.get_mut(lesson_id) {
            if let Some(poll) = session.take_poll() {
                poll.abort();
                debug!(lesson = %lesson_id, "stopped tracking");
            }
        }
    }

    fn spawn_state_pump(
        inner: &Arc<Self>,
        lesson_id: LessonId,
        mut events: mpsc::Receiver<PlayerState>,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    PlayerState::Playing => Self::start_tracking(&inner, &lesson_id),
                    PlayerState::Ended => Self::stop_tracking(&inner, &lesson_id),
                }
            }
        })
    }

    /// Seek to the stored position once the widget reports a usable duration.
    ///
    /// Duration is typically unavailable right after construction, so it is
    /// probed on a short cadence with a bounded budget.
    fn spawn_resume_seek(
        inner: &Arc<Self>,
        lesson_id: LessonId,
        player: Arc<dyn PlayerHandle>,
        initial: Percent,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let mut probes = 0;
            let target = loop {
                let duration = player.duration().filter(|d| d.is_finite() && *d > 0.0);
                if let Some(duration) = duration {
                    break initial.seek_target(duration);
                }
                probes += 1;
                if probes >= inner.config.seek_max_probes {
                    debug!(lesson = %lesson_id, "duration never became available; skipping resume seek");
                    return;
                }
                tokio::time::sleep(inner.config.seek_probe_interval).await;
            };

            if target > 0 {
                player.seek_to(target, true);
                debug!(lesson = %lesson_id, target, "resumed playback position");
            }
        })
    }

    fn spawn_poll(
        inner: &Arc<Self>,
        lesson_id: LessonId,
        player: Arc<dyn PlayerHandle>,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.poll_interval);
            // A tick that takes longer than the interval must not fire again
            // reentrantly; delay instead of bursting.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick resolves immediately; consume it so the first
            // sample lands one full interval after playback starts.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if Self::poll_tick(&inner, &lesson_id, player.as_ref()).is_break() {
                    break;
                }
            }
            // reached 100: the poll ends itself, so just clear the handle
            if let Some(session) = inner.lock_state().sessions.get_mut(&lesson_id) {
                session.take_poll();
            }
        })
    }

    /// One telemetry sample: update the display map, dispatch a persisted
    /// write when the sample advances past everything written so far, and
    /// stop at 100%.
    fn poll_tick(
        inner: &Arc<Self>,
        lesson_id: &LessonId,
        player: &dyn PlayerHandle,
    ) -> ControlFlow<()> {
        let (Some(duration), Some(current)) = (player.duration(), player.current_time()) else {
            // expected while buffering; not an error
            return ControlFlow::Continue(());
        };
        let Some(percent) = Percent::from_sample(current, duration) else {
            return ControlFlow::Continue(());
        };

        let dispatch = {
            let mut state = inner.lock_state();
            state.progress.insert(lesson_id.clone(), percent);

            let last = state
                .persisted
                .get(lesson_id)
                .copied()
                .unwrap_or(Percent::ZERO);
            if percent > last {
                match state.user.clone() {
                    Some(user) => {
                        let previous = state.persisted.insert(lesson_id.clone(), percent);
                        Some((user, previous))
                    }
                    None => {
                        warn!(lesson = %lesson_id, "not signed in; skipping progress write");
                        None
                    }
                }
            } else {
                None
            }
        };

        if let Some((user, previous)) = dispatch {
            Self::dispatch_write(inner, user, lesson_id.clone(), percent, previous);
        }

        if percent.is_complete() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Fire-and-forget persisted write with bounded retry. On final failure
    /// the ledger entry is rolled back (unless a higher value was dispatched
    /// meanwhile) so a later tick retries.
    fn dispatch_write(
        inner: &Arc<Self>,
        user: UserId,
        lesson_id: LessonId,
        percent: Percent,
        previous: Option<Percent>,
    ) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let users = Arc::clone(&inner.users);
            let result = with_retry(&inner.config.write_retry, "progress write", || {
                let users = Arc::clone(&users);
                let user = user.clone();
                let lesson = lesson_id.clone();
                async move { users.merge_progress(&user, &lesson, percent).await }
            })
            .await;

            if let Err(err) = result {
                warn!(
                    lesson = %lesson_id,
                    percent = %percent,
                    error = %err,
                    "progress write failed; leaving stored state unchanged"
                );
                let mut state = inner.lock_state();
                if state.persisted.get(&lesson_id) == Some(&percent) {
                    match previous {
                        Some(previous) => state.persisted.insert(lesson_id.clone(), previous),
                        None => state.persisted.remove(&lesson_id),
                    };
                }
            }
        });
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
