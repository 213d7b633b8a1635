use super::*;

fn sample() -> StoredSession {
    StoredSession {
        token: "ab".repeat(32),
        kind: RoomKind::Scrum,
        room_id: "sprint-9".into(),
        name: "Ada".into(),
        avatar: Some(12),
    }
}

fn temp_file_store() -> FileSessionStore {
    FileSessionStore::new(
        std::env::temp_dir()
            .join(format!("scrumkit-session-{}", uuid::Uuid::new_v4()))
            .join("session.json"),
    )
}

#[test]
fn session_matches_only_its_own_room() {
    let session = sample();
    assert!(session.is_for(RoomKind::Scrum, "sprint-9"));
    assert!(!session.is_for(RoomKind::Retro, "sprint-9"));
    assert!(!session.is_for(RoomKind::Scrum, "sprint-10"));
}

#[test]
fn session_serializes_camel_case() {
    let json = serde_json::to_value(sample()).expect("serialize");
    assert_eq!(json["roomId"], "sprint-9");
    assert_eq!(json["kind"], "scrum");
    assert_eq!(json["avatar"], 12);
}

// =============================================================================
// MemorySessionStore
// =============================================================================

#[tokio::test]
async fn memory_store_saves_and_clears() {
    let store = MemorySessionStore::new();
    assert!(store.load().await.expect("load").is_none());

    store.save(&sample()).await.expect("save");
    assert_eq!(store.load().await.expect("load"), Some(sample()));

    store.clear().await.expect("clear");
    assert!(store.load().await.expect("load").is_none());
}

// =============================================================================
// FileSessionStore
// =============================================================================

#[tokio::test]
async fn file_store_round_trips_and_clears() {
    let store = temp_file_store();
    assert!(store.load().await.expect("missing file loads as none").is_none());

    store.save(&sample()).await.expect("save");
    assert_eq!(store.load().await.expect("load"), Some(sample()));

    store.clear().await.expect("clear");
    assert!(store.load().await.expect("load").is_none());
    store.clear().await.expect("clearing twice is fine");

    if let Some(dir) = store.path().parent() {
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}

#[tokio::test]
async fn file_store_reports_corrupt_record() {
    let store = temp_file_store();
    let dir = store.path().parent().expect("parent").to_path_buf();
    tokio::fs::create_dir_all(&dir).await.expect("mkdir");
    tokio::fs::write(store.path(), b"{not json").await.expect("write");

    assert!(matches!(store.load().await, Err(StoreError::Json(_))));
    let _ = tokio::fs::remove_dir_all(dir).await;
}
