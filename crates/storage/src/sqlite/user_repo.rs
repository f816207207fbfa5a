use chrono::Utc;
use course_core::model::{LessonId, Percent, UserDocument, UserId};

use super::{
    SqliteRepository,
    mapping::{map_completed_row, map_progress_row, map_user_row},
};
use crate::repository::{StorageError, UserRepository};

impl SqliteRepository {
    async fn user_exists(&self, user_id: &UserId) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ?1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(row.is_some())
    }
}

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserDocument>, StorageError> {
        let Some(user_row) = sqlx::query("SELECT id, email, created_at FROM users WHERE id = ?1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut doc = map_user_row(&user_row)?;

        let progress_rows =
            sqlx::query("SELECT lesson_id, percent FROM lesson_progress WHERE user_id = ?1")
                .bind(user_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
        for row in progress_rows {
            let (lesson, percent) = map_progress_row(&row)?;
            doc.progress.insert(lesson, percent);
        }

        let completed_rows =
            sqlx::query("SELECT lesson_id, completed FROM lesson_completed WHERE user_id = ?1")
                .bind(user_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
        for row in completed_rows {
            let (lesson, completed) = map_completed_row(&row)?;
            doc.completed.insert(lesson, completed);
        }

        Ok(Some(doc))
    }

    async fn put_user(&self, document: &UserDocument) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO users (id, email, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                created_at = excluded.created_at
            ",
        )
        .bind(document.user_id.as_str())
        .bind(document.email.as_str())
        .bind(document.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Full overwrite: drop any per-lesson rows the new document no longer carries.
        sqlx::query("DELETE FROM lesson_progress WHERE user_id = ?1")
            .bind(document.user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        sqlx::query("DELETE FROM lesson_completed WHERE user_id = ?1")
            .bind(document.user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let now = Utc::now();
        for (lesson, percent) in &document.progress {
            sqlx::query(
                "INSERT INTO lesson_progress (user_id, lesson_id, percent, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(document.user_id.as_str())
            .bind(lesson.as_str())
            .bind(i64::from(percent.value()))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }
        for (lesson, completed) in &document.completed {
            sqlx::query(
                "INSERT INTO lesson_completed (user_id, lesson_id, completed, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(document.user_id.as_str())
            .bind(lesson.as_str())
            .bind(i64::from(*completed))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn merge_progress(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
        percent: Percent,
    ) -> Result<(), StorageError> {
        if !self.user_exists(user_id).await? {
            return Err(StorageError::NotFound);
        }

        sqlx::query(
            r"
            INSERT INTO lesson_progress (user_id, lesson_id, percent, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                percent = excluded.percent,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user_id.as_str())
        .bind(lesson_id.as_str())
        .bind(i64::from(percent.value()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn merge_completed(
        &self,
        user_id: &UserId,
        lesson_id: &LessonId,
        completed: bool,
    ) -> Result<(), StorageError> {
        if !self.user_exists(user_id).await? {
            return Err(StorageError::NotFound);
        }

        sqlx::query(
            r"
            INSERT INTO lesson_completed (user_id, lesson_id, completed, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                completed = excluded.completed,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user_id.as_str())
        .bind(lesson_id.as_str())
        .bind(i64::from(completed))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::time::fixed_now;

    async fn repo() -> SqliteRepository {
        let repo = SqliteRepository::connect("sqlite::memory:").await.unwrap();
        repo.migrate().await.unwrap();
        repo
    }

    fn build_doc(uid: &str) -> UserDocument {
        UserDocument::new(UserId::new(uid), format!("{uid}@example.com"), fixed_now())
    }

    #[tokio::test]
    async fn round_trips_full_document() {
        let repo = repo().await;
        let mut doc = build_doc("u1");
        doc.progress
            .insert(LessonId::new("lesson1"), Percent::new(55).unwrap());
        doc.completed.insert(LessonId::new("lesson2"), true);

        repo.put_user(&doc).await.unwrap();
        let fetched = repo.get_user(&UserId::new("u1")).await.unwrap().unwrap();
        assert_eq!(fetched, doc);
    }

    #[tokio::test]
    async fn get_missing_user_is_none() {
        let repo = repo().await;
        assert_eq!(repo.get_user(&UserId::new("nobody")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn merge_progress_upserts_single_lesson() {
        let repo = repo().await;
        let mut doc = build_doc("u1");
        doc.progress
            .insert(LessonId::new("lesson1"), Percent::new(40).unwrap());
        repo.put_user(&doc).await.unwrap();

        repo.merge_progress(
            &UserId::new("u1"),
            &LessonId::new("lesson1"),
            Percent::new(75).unwrap(),
        )
        .await
        .unwrap();
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
            75
        );
        assert_eq!(
            fetched.progress.get(&LessonId::new("lesson2")).unwrap().value(),
            10
        );
    }

    #[tokio::test]
    async fn merge_completed_leaves_progress_untouched() {
        let repo = repo().await;
        let mut doc = build_doc("u1");
        doc.progress
            .insert(LessonId::new("lesson1"), Percent::new(40).unwrap());
        repo.put_user(&doc).await.unwrap();

        repo.merge_completed(&UserId::new("u1"), &LessonId::new("lesson1"), true)
            .await
            .unwrap();

        let fetched = repo.get_user(&UserId::new("u1")).await.unwrap().unwrap();
        assert_eq!(fetched.completed.get(&LessonId::new("lesson1")), Some(&true));
        assert_eq!(
            fetched.progress.get(&LessonId::new("lesson1")).unwrap().value(),
            40
        );
    }

    #[tokio::test]
    async fn merge_for_unknown_user_is_not_found() {
        let repo = repo().await;
        let err = repo
            .merge_progress(
                &UserId::new("nobody"),
                &LessonId::new("lesson1"),
                Percent::new(5).unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn put_user_overwrites_previous_document() {
        let repo = repo().await;
        let mut doc = build_doc("u1");
        doc.progress
            .insert(LessonId::new("lesson1"), Percent::new(90).unwrap());
        repo.put_user(&doc).await.unwrap();

        let fresh = build_doc("u1");
        repo.put_user(&fresh).await.unwrap();

        let fetched = repo.get_user(&UserId::new("u1")).await.unwrap().unwrap();
        assert!(fetched.progress.is_empty());
    }
}
