use course_core::model::{LessonId, Percent, UserDocument, UserId};
use sqlx::Row;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn percent_from_i64(v: i64) -> Result<Percent, StorageError> {
    let raw = u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid percent: {v}")))?;
    Percent::new(raw).map_err(ser)
}

/// Decodes the `users` row into a document with empty maps; progress and
/// completion rows are merged in by the caller.
pub(crate) fn map_user_row(row: &sqlx::sqlite::SqliteRow) -> Result<UserDocument, StorageError> {
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at").map_err(ser)?;
    Ok(UserDocument::new(
        UserId::new(row.try_get::<String, _>("id").map_err(ser)?),
        row.try_get::<String, _>("email").map_err(ser)?,
        created_at,
    ))
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(LessonId, Percent), StorageError> {
    let lesson = LessonId::new(row.try_get::<String, _>("lesson_id").map_err(ser)?);
    let percent = percent_from_i64(row.try_get::<i64, _>("percent").map_err(ser)?)?;
    Ok((lesson, percent))
}

pub(crate) fn map_completed_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(LessonId, bool), StorageError> {
    let lesson = LessonId::new(row.try_get::<String, _>("lesson_id").map_err(ser)?);
    let completed: i64 = row.try_get("completed").map_err(ser)?;
    Ok((lesson, completed != 0))
}
