use async_trait::async_trait;
use course_core::model::{LessonId, Percent, UserDocument, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Document-store contract for user documents.
///
/// `put_user` overwrites the whole document and is used once at account
/// creation. The `merge_*` operations update a single nested key
/// (`progress.<lesson>` / `completed.<lesson>`) and must leave every sibling
/// entry of both maps untouched.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fetch a user document by id.
    ///
    /// A missing document is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the backend cannot be reached or the stored
    /// document cannot be decoded.
    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserDocument>, StorageError>;

    /// Write a full user document, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn put_user(&self, document: &UserDocument) -> Result<(), StorageError>;

    /// Merge a single lesson's watch percent into the document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when no document exists for the user,
    /// or other storage errors.
    async fn merge_progress(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
        percent: Percent,
    ) -> Result<(), StorageError>;

    /// Merge a single lesson's completion flag into the document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when no document exists for the user,
    /// or other storage errors.
    async fn merge_completed(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
        completed: bool,
    ) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    users: Arc<Mutex<HashMap<UserId, UserDocument>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserDocument>, StorageError> {
        let guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(user_id).cloned())
    }

    async fn put_user(&self, document: &UserDocument) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(document.user_id.clone(), document.clone());
        Ok(())
    }

    async fn merge_progress(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
        percent: Percent,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let doc = guard.get_mut(user_id).ok_or(StorageError::NotFound)?;
        doc.progress.insert(lesson_id.clone(), percent);
        Ok(())
    }

    async fn merge_completed(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
        completed: bool,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let doc = guard.get_mut(user_id).ok_or(StorageError::NotFound)?;
        doc.completed.insert(lesson_id.clone(), completed);
        Ok(())
    }
}

/// Aggregates the user repository behind a trait object for backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let users: Arc<dyn UserRepository> = Arc::new(InMemoryRepository::new());
        Self { users }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::time::fixed_now;

    fn build_doc(uid: &str) -> UserDocument {
        UserDocument::new(UserId::new(uid), format!("{uid}@example.com"), fixed_now())
    }

    #[tokio::test]
    async fn round_trips_user_document() {
        let repo = InMemoryRepository::new();
        let doc = build_doc("u1");
        repo.put_user(&doc).await.unwrap();

        let fetched = repo.get_user(&UserId::new("u1")).await.unwrap();
        assert_eq!(fetched, Some(doc));
    }

    #[tokio::test]
    async fn missing_user_is_none_not_error() {
        let repo = InMemoryRepository::new();
        let fetched = repo.get_user(&UserId::new("absent")).await.unwrap();
        assert_eq!(fetched, None);
    }

    #[tokio::test]
    async fn merge_progress_preserves_sibling_keys() {
        let repo = InMemoryRepository::new();
        let mut doc = build_doc("u1");
        doc.progress
            .insert(LessonId::new("lesson1"), Percent::new(40).unwrap());
        doc.completed.insert(LessonId::new("lesson1"), true);
        repo.put_user(&doc).await.unwrap();

        repo.merge_progress(
            &UserId::new("u1"),
            &LessonId::new("lesson2"),
            Percent::new(10).unwrap(),
        )
        .await
        .unwrap();

        let fetched = repo.get_user(&UserId::new("u1")).await.unwrap().unwrap();
        assert_eq!(
            fetched.progress.get(&LessonId::new("lesson1")).unwrap().value(),
            40
        );
        assert_eq!(
            fetched.progress.get(&LessonId::new("lesson2")).unwrap().value(),
            10
        );
        assert_eq!(fetched.completed.get(&LessonId::new("lesson1")), Some(&true));
    }

    #[tokio::test]
    async fn merge_on_missing_user_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .merge_completed(&UserId::new("absent"), &LessonId::new("lesson1"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }
}
