use course_core::model::{LessonId, Percent, UserDocument, UserId};
use course_core::time::fixed_now;
use storage::repository::UserRepository;
use storage::sqlite::SqliteRepository;

fn build_doc(uid: &str) -> UserDocument {
    UserDocument::new(UserId::new(uid), format!("{uid}@example.com"), fixed_now())
}

#[tokio::test]
async fn sqlite_roundtrip_persists_progress_and_completion() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let mut doc = build_doc("u1");
    doc.progress
        .insert(LessonId::new("lesson1"), Percent::new(55).unwrap());
    doc.completed.insert(LessonId::new("lesson1"), false);
    repo.put_user(&doc).await.unwrap();

    let fetched = repo
        .get_user(&UserId::new("u1"))
        .await
        .expect("fetch")
        .expect("document exists");
    assert_eq!(fetched, doc);
}

#[tokio::test]
async fn sqlite_field_merges_accumulate_without_clobbering() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_merges?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let user = UserId::new("u1");
    repo.put_user(&build_doc("u1")).await.unwrap();

    // a watch session advancing lesson1, then a completion toggle on lesson2
    for percent in [30, 55, 75] {
        repo.merge_progress(
            &user,
            &LessonId::new("lesson1"),
            Percent::new(percent).unwrap(),
        )
        .await
        .unwrap();
    }
    repo.merge_completed(&user, &LessonId::new("lesson2"), true)
        .await
        .unwrap();
    repo.merge_progress(&user, &LessonId::new("lesson2"), Percent::new(10).unwrap())
        .await
        .unwrap();

    let fetched = repo.get_user(&user).await.unwrap().unwrap();
    assert_eq!(
        fetched
            .progress
            .get(&LessonId::new("lesson1"))
            .map(|p| p.value()),
        Some(75)
    );
    assert_eq!(
        fetched
            .progress
            .get(&LessonId::new("lesson2"))
            .map(|p| p.value()),
        Some(10)
    );
    assert_eq!(fetched.completed.get(&LessonId::new("lesson2")), Some(&true));
    assert_eq!(fetched.completed.get(&LessonId::new("lesson1")), None);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.migrate().await.expect("second migrate");

    repo.put_user(&build_doc("u1")).await.unwrap();
    assert!(repo.get_user(&UserId::new("u1")).await.unwrap().is_some());
}
