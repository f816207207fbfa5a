use std::sync::Arc;

use course_core::model::{UserDocument, UserId};
use course_core::time::Clock;
use storage::repository::UserRepository;
use tracing::debug;

use crate::error::AccountError;

/// Bootstraps the per-user document on sign-in.
#[derive(Clone)]
pub struct AccountService {
    clock: Clock,
    users: Arc<dyn UserRepository>,
}

impl AccountService {
    #[must_use]
    pub fn new(clock: Clock, users: Arc<dyn UserRepository>) -> Self {
        Self { clock, users }
    }

    /// Fetch-once: returns the existing document, or creates one with empty
    /// progress/completion maps at first sight of a user.
    ///
    /// Runs after every successful sign-in, so an account created before the
    /// document schema existed still gets its document.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::Storage` when the store cannot be read or the
    /// fresh document cannot be written.
    pub async fn ensure_user_document(
        &self,
        user_id: &UserId,
        email: &str,
    ) -> Result<UserDocument, AccountError> {
        if let Some(existing) = self.users.get_user(user_id).await? {
            return Ok(existing);
        }

        let document = UserDocument::new(user_id.clone(), email, self.clock.now());
        self.users.put_user(&document).await?;
        debug!(user = %user_id, "created user document");
        Ok(document)
    }
}
