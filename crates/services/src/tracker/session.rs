use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::player::PlayerHandle;

/// Live binding between one lesson and its attached player widget.
///
/// The session exclusively owns the widget handle and every task spawned for
/// it. The poll handle exists exactly while playback is in the playing state.
/// Dropping the session aborts all tasks and destroys the widget, so cleanup
/// happens on every exit path.
pub(crate) struct PlayerSession {
    player: Arc<dyn PlayerHandle>,
    pump: Option<JoinHandle<()>>,
    resume: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
}

impl PlayerSession {
    pub(crate) fn new(player: Arc<dyn PlayerHandle>) -> Self {
        Self {
            player,
            pump: None,
            resume: None,
            poll: None,
        }
    }

    pub(crate) fn player(&self) -> &Arc<dyn PlayerHandle> {
        &self.player
    }

    pub(crate) fn set_tasks(&mut self, pump: JoinHandle<()>, resume: JoinHandle<()>) {
        self.pump = Some(pump);
        self.resume = Some(resume);
    }

    pub(crate) fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    pub(crate) fn set_poll(&mut self, poll: JoinHandle<()>) {
        self.poll = Some(poll);
    }

    pub(crate) fn take_poll(&mut self) -> Option<JoinHandle<()>> {
        self.poll.take()
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
        if let Some(resume) = self.resume.take() {
            resume.abort();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.player.destroy();
    }
}
