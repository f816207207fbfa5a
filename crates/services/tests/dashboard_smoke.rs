use std::sync::Arc;

use async_trait::async_trait;
use course_core::model::{Lesson, LessonCatalog, LessonId, Percent, UserId};
use course_core::time::{fixed_clock, fixed_now};
use services::{
    AccountService, AuthProvider, PlayerConnection, PlayerError, PlayerProvider, ProgressTracker,
    StaticAuth,
};
use storage::repository::{InMemoryRepository, UserRepository};

/// Provider for flows that never attach a player.
struct IdleProvider;

#[async_trait]
impl PlayerProvider for IdleProvider {
    fn is_ready(&self) -> bool {
        false
    }

    async fn create_player(
        &self,
        _embed_dom_id: &str,
        _video_id: &str,
    ) -> Result<PlayerConnection, PlayerError> {
        Err(PlayerError::Construction("idle provider".into()))
    }
}

fn catalog() -> LessonCatalog {
    LessonCatalog::new(vec![
        Lesson::new(
            LessonId::new("lesson1"),
            "https://www.youtube.com/watch?v=d54ioeKA-jc&t=77s",
        ),
        Lesson::new(
            LessonId::new("lesson2"),
            "https://www.youtube.com/watch?v=S8ukFF6SdGk&t=406s",
        ),
    ])
    .unwrap()
}

#[tokio::test]
async fn sign_in_creates_document_and_later_mounts_restore_state() {
    let repo = Arc::new(InMemoryRepository::new());
    let lesson1 = LessonId::new("lesson1");

    // sign-in: the auth subscription carries the identity
    let auth = StaticAuth::signed_in(UserId::new("u1"));
    let events = auth.subscribe();
    let user = events.current().expect("signed in");

    let account = AccountService::new(fixed_clock(), repo.clone());
    let doc = account
        .ensure_user_document(&user, "u1@example.com")
        .await
        .unwrap();
    assert_eq!(doc.created_at, fixed_now());
    assert!(doc.progress.is_empty());

    // first dashboard mount: toggle a completion, simulate stored watching
    let tracker = ProgressTracker::new(catalog(), repo.clone(), Arc::new(IdleProvider));
    tracker.load_initial_state(user.clone()).await;
    assert!(tracker.toggle_complete(&lesson1).await.unwrap());
    repo.merge_progress(&user, &lesson1, Percent::new(40).unwrap())
        .await
        .unwrap();
    tracker.teardown();

    // a later sign-in reuses the document
    let doc = account
        .ensure_user_document(&user, "u1@example.com")
        .await
        .unwrap();
    assert_eq!(
        doc.progress.get(&lesson1).map(|p| p.value()),
        Some(40),
        "ensure must not overwrite an existing document"
    );

    // a fresh mount sees the persisted state
    let tracker = ProgressTracker::new(catalog(), repo.clone(), Arc::new(IdleProvider));
    tracker.load_initial_state(user).await;
    let record = tracker.record(&lesson1);
    assert_eq!(record.percent.value(), 40);
    assert!(record.completed);
    tracker.teardown();

    drop(events);
}
