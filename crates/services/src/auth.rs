use course_core::model::UserId;
use tokio::sync::watch;

/// Stream of identity changes from the external auth provider.
///
/// Dropping the stream releases the subscription.
pub struct AuthEvents {
    rx: watch::Receiver<Option<UserId>>,
}

impl AuthEvents {
    /// The identity at this moment: `Some(user)` when signed in.
    #[must_use]
    pub fn current(&self) -> Option<UserId> {
        self.rx.borrow().clone()
    }

    /// Waits for the next identity change.
    ///
    /// Returns `None` once the provider itself has gone away.
    pub async fn changed(&mut self) -> Option<Option<UserId>> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }
}

/// Contract with the external identity provider.
pub trait AuthProvider: Send + Sync {
    /// Subscribe to identity changes; the stream's `current()` reflects the
    /// signed-in state at subscription time.
    fn subscribe(&self) -> AuthEvents;
}

/// Provider with a scriptable identity, used by the binary and tests.
pub struct StaticAuth {
    tx: watch::Sender<Option<UserId>>,
}

impl StaticAuth {
    #[must_use]
    pub fn signed_in(user_id: UserId) -> Self {
        let (tx, _rx) = watch::channel(Some(user_id));
        Self { tx }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replace the signed-in identity, notifying all subscribers.
    pub fn set_user(&self, user: Option<UserId>) {
        // Send only fails when every receiver is gone; nothing to notify then.
        let _ = self.tx.send(user);
    }
}

impl AuthProvider for StaticAuth {
    fn subscribe(&self) -> AuthEvents {
        AuthEvents {
            rx: self.tx.subscribe(),
        }
    }
}
