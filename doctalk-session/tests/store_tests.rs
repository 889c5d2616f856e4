//! Session store lifecycle tests. Time is paused, so idle periods are exact.

use std::collections::HashSet;
use std::time::Duration;

use doctalk_session::{SessionConfig, SessionError, SessionStore};
use tokio::task::JoinSet;
use tokio::time::advance;

const TTL: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn created_sessions_are_retrievable_and_distinct() {
    let store = SessionStore::new(TTL);

    let first = store.create().await;
    let second = store.create().await;

    assert_ne!(first, second);
    assert_eq!(store.len().await, 2);
    let session = store.get(&first).await.unwrap();
    assert_eq!(session.id(), first);
    assert!(!session.is_ready().await);
    assert!(session.history().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_id_is_not_found() {
    let store = SessionStore::new(TTL);
    let err = store.get("missing").await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(ref id) if id == "missing"));
    assert!(err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn idle_session_expires_and_is_removed() {
    let store = SessionStore::new(TTL);
    let id = store.create().await;

    advance(TTL + Duration::from_secs(1)).await;

    let err = store.get(&id).await.unwrap_err();
    assert!(matches!(err, SessionError::Expired(_)));
    assert!(err.is_not_found());
    assert!(!store.contains(&id).await);
    assert!(matches!(store.get(&id).await, Err(SessionError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn session_idle_for_exactly_the_ttl_is_still_valid() {
    let store = SessionStore::new(TTL);
    let id = store.create().await;

    advance(TTL).await;

    assert!(store.get(&id).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn access_resets_the_idle_clock() {
    let store = SessionStore::new(TTL);
    let id = store.create().await;

    advance(Duration::from_secs(8)).await;
    store.get(&id).await.unwrap();
    advance(Duration::from_secs(8)).await;

    assert!(store.get(&id).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn contains_does_not_touch() {
    let store = SessionStore::new(TTL);
    let id = store.create().await;

    advance(Duration::from_secs(8)).await;
    assert!(store.contains(&id).await);
    advance(Duration::from_secs(3)).await;

    assert!(matches!(store.get(&id).await, Err(SessionError::Expired(_))));
}

#[tokio::test(start_paused = true)]
async fn create_sweeps_expired_sessions() {
    let store = SessionStore::new(TTL);
    let stale = store.create().await;

    advance(TTL + Duration::from_secs(1)).await;
    let fresh = store.create().await;

    assert_eq!(store.len().await, 1);
    assert!(!store.contains(&stale).await);
    assert!(store.contains(&fresh).await);
}

#[tokio::test(start_paused = true)]
async fn sweep_reports_evicted_count() {
    let store = SessionStore::new(TTL);
    store.create().await;
    store.create().await;
    advance(Duration::from_secs(6)).await;
    let recent = store.create().await;
    advance(Duration::from_secs(6)).await;

    assert_eq!(store.sweep().await, 2);
    assert_eq!(store.len().await, 1);
    assert!(store.contains(&recent).await);
}

#[tokio::test(start_paused = true)]
async fn delete_removes_and_ignores_unknown_ids() {
    let store = SessionStore::new(TTL);
    let id = store.create().await;

    store.delete(&id).await;
    store.delete(&id).await;
    store.delete("never-existed").await;

    assert!(store.is_empty().await);
    assert!(matches!(store.get(&id).await, Err(SessionError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn clones_share_sessions() {
    let store = SessionStore::from_config(&SessionConfig::builder().ttl(TTL).build().unwrap());
    let handle = store.clone();

    let id = store.create().await;

    assert!(handle.contains(&id).await);
    assert_eq!(handle.ttl(), TTL);
    handle.delete(&id).await;
    assert!(!store.contains(&id).await);
}

#[tokio::test]
async fn lookups_advance_the_wall_clock_access_time() {
    let store = SessionStore::new(TTL);
    let id = store.create().await;
    let session = store.get(&id).await.unwrap();
    let first = session.last_accessed_at();
    assert!(first >= session.created_at());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(store.contains(&id).await);
    assert_eq!(session.last_accessed_at(), first);

    store.get(&id).await.unwrap();
    assert!(session.last_accessed_at() > first);
}

#[test]
fn zero_ttl_is_rejected() {
    let result = SessionConfig::builder().ttl(Duration::ZERO).build();
    assert!(matches!(result, Err(SessionError::Config(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_gets_and_deletes_stay_consistent() {
    let store = SessionStore::new(Duration::from_secs(3600));

    let mut creators = JoinSet::new();
    for _ in 0..64 {
        let store = store.clone();
        creators.spawn(async move {
            let id = store.create().await;
            for _ in 0..10 {
                assert_eq!(store.get(&id).await.unwrap().id(), id);
            }
            id
        });
    }
    let mut ids = HashSet::new();
    while let Some(id) = creators.join_next().await {
        assert!(ids.insert(id.unwrap()), "duplicate session id");
    }
    assert_eq!(ids.len(), 64);
    assert_eq!(store.len().await, 64);

    let doomed: Vec<String> = ids.iter().take(32).cloned().collect();
    let mut workers = JoinSet::new();
    for id in doomed.clone() {
        let store = store.clone();
        workers.spawn(async move {
            store.delete(&id).await;
            matches!(store.get(&id).await, Err(SessionError::NotFound(_)))
        });
    }
    for id in ids.iter().filter(|id| !doomed.contains(id)).cloned() {
        let store = store.clone();
        workers.spawn(async move { store.get(&id).await.is_ok() });
    }
    while let Some(ok) = workers.join_next().await {
        assert!(ok.unwrap());
    }

    assert_eq!(store.len().await, 32);
    for id in &doomed {
        assert!(!store.contains(id).await);
    }
}
