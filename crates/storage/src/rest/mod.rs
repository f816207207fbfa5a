use std::env;
use std::sync::Arc;

use course_core::model::{LessonId, Percent, UserDocument, UserId};
use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};

use crate::repository::{Storage, StorageError, UserRepository};

/// Document-store client against a hosted REST document API.
///
/// Whole documents are read with GET and written with PUT; the single-key
/// merges use PATCH with a nested body (`{"progress": {"<lesson>": n}}`),
/// which the server applies at the leaf-field level.
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
}

impl RestStore {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build a store from `COURSE_STORE_URL`, when set and non-empty.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("COURSE_STORE_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        Some(Self::new(base_url))
    }

    fn user_url(&self, user_id: &UserId) -> String {
        format!("{}/users/{}", self.base_url, user_id)
    }
}

fn conn(e: reqwest::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn check_status(response: Response) -> Result<Response, StorageError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(StorageError::NotFound),
        StatusCode::CONFLICT => Err(StorageError::Conflict),
        status => Err(StorageError::Connection(format!(
            "unexpected status {status}"
        ))),
    }
}

fn progress_patch(lesson_id: &LessonId, percent: Percent) -> Value {
    json!({ "progress": { (lesson_id.as_str()): percent } })
}

fn completed_patch(lesson_id: &LessonId, completed: bool) -> Value {
    json!({ "completed": { (lesson_id.as_str()): completed } })
}

#[async_trait::async_trait]
impl UserRepository for RestStore {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserDocument>, StorageError> {
        let response = self
            .client
            .get(self.user_url(user_id))
            .send()
            .await
            .map_err(conn)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response)?;

        let document: UserDocument = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Some(document))
    }

    async fn put_user(&self, document: &UserDocument) -> Result<(), StorageError> {
        let response = self
            .client
            .put(self.user_url(&document.user_id))
            .json(document)
            .send()
            .await
            .map_err(conn)?;
        check_status(response)?;
        Ok(())
    }

    async fn merge_progress(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
        percent: Percent,
    ) -> Result<(), StorageError> {
        let response = self
            .client
            .patch(self.user_url(user_id))
            .json(&progress_patch(lesson_id, percent))
            .send()
            .await
            .map_err(conn)?;
        check_status(response)?;
        Ok(())
    }

    async fn merge_completed(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
        completed: bool,
    ) -> Result<(), StorageError> {
        let response = self
            .client
            .patch(self.user_url(user_id))
            .json(&completed_patch(lesson_id, completed))
            .send()
            .await
            .map_err(conn)?;
        check_status(response)?;
        Ok(())
    }
}

impl Storage {
    /// Build a `Storage` backed by the hosted REST document store.
    #[must_use]
    pub fn rest(base_url: impl Into<String>) -> Self {
        let users: Arc<dyn UserRepository> = Arc::new(RestStore::new(base_url));
        Self { users }
    }
}
