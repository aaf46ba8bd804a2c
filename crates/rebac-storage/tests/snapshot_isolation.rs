//! Snapshot isolation and atomicity tests for the in-memory tuple store.

use std::sync::Arc;

use futures::TryStreamExt;
use proptest::prelude::*;
use rebac_storage::{
    MemoryTupleStore, Revision, StorageError, StoredTuple, TupleFilter, TupleStore,
};

fn member(user: &str, group: &str) -> StoredTuple {
    StoredTuple::new("group", group, "member", "user", user, None)
}

async fn members_at(store: &MemoryTupleStore, revision: Revision) -> Vec<String> {
    let filter = TupleFilter {
        object_type: Some("group".to_string()),
        ..Default::default()
    };
    let mut users: Vec<String> = store
        .read(revision, &filter)
        .await
        .unwrap()
        .map_ok(|t| format!("{}@{}", t.object(), t.user()))
        .try_collect()
        .await
        .unwrap();
    users.sort();
    users
}

// ========== Section 1: Atomicity ==========

#[tokio::test]
async fn test_failed_batch_leaves_store_unchanged() {
    let store = MemoryTupleStore::new();
    store.write(vec![member("alice", "eng")], vec![]).await.unwrap();

    let result = store
        .write(
            vec![member("bob", "eng"), member("carol", "eng")],
            vec![member("nobody", "eng")],
        )
        .await;
    assert!(matches!(result, Err(StorageError::WriteConflict { .. })));

    let latest = store.latest_revision().await.unwrap();
    assert_eq!(latest, Revision(1));
    assert_eq!(members_at(&store, latest).await, vec!["group:eng@user:alice"]);
}

#[tokio::test]
async fn test_invalid_tuple_rejects_whole_batch() {
    let store = MemoryTupleStore::new();
    let result = store
        .write(
            vec![member("alice", "eng"), member("", "eng")],
            vec![],
        )
        .await;
    assert!(matches!(result, Err(StorageError::InvalidInput { .. })));
    assert_eq!(store.latest_revision().await.unwrap(), Revision::INITIAL);
}

#[tokio::test]
async fn test_every_batch_advances_revision_by_one() {
    let store = MemoryTupleStore::new();
    let r1 = store.write(vec![member("alice", "eng")], vec![]).await.unwrap();
    let r2 = store.write(vec![member("bob", "eng")], vec![]).await.unwrap();
    let r3 = store.write(vec![], vec![member("alice", "eng")]).await.unwrap();
    assert_eq!((r1, r2, r3), (Revision(1), Revision(2), Revision(3)));
}

// ========== Section 2: Snapshot isolation ==========

#[tokio::test]
async fn test_reads_at_each_revision_are_stable() {
    let store = MemoryTupleStore::new();
    let r1 = store.write(vec![member("alice", "eng")], vec![]).await.unwrap();
    let r2 = store.write(vec![member("bob", "eng")], vec![]).await.unwrap();
    let r3 = store
        .write(vec![member("carol", "ops")], vec![member("alice", "eng")])
        .await
        .unwrap();

    assert!(members_at(&store, Revision::INITIAL).await.is_empty());
    assert_eq!(members_at(&store, r1).await, vec!["group:eng@user:alice"]);
    assert_eq!(
        members_at(&store, r2).await,
        vec!["group:eng@user:alice", "group:eng@user:bob"]
    );
    assert_eq!(
        members_at(&store, r3).await,
        vec!["group:eng@user:bob", "group:ops@user:carol"]
    );
}

#[tokio::test]
async fn test_open_stream_is_not_affected_by_later_writes() {
    let store = Arc::new(MemoryTupleStore::new());
    let revision = store.write(vec![member("alice", "eng")], vec![]).await.unwrap();

    let stream = store
        .read(revision, &TupleFilter::for_object("group", "eng", "member"))
        .await
        .unwrap();

    store.write(vec![member("bob", "eng")], vec![]).await.unwrap();
    store.write(vec![], vec![member("alice", "eng")]).await.unwrap();

    let seen: Vec<StoredTuple> = stream.try_collect().await.unwrap();
    assert_eq!(seen, vec![member("alice", "eng")]);
}

#[tokio::test]
async fn test_concurrent_writers_produce_distinct_revisions() {
    let store = Arc::new(MemoryTupleStore::new());
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .write(vec![member(&format!("user{i}"), "eng")], vec![])
                .await
                .unwrap()
        }));
    }

    let mut revisions = Vec::new();
    for handle in handles {
        revisions.push(handle.await.unwrap().value());
    }
    revisions.sort_unstable();
    assert_eq!(revisions, (1..=16).collect::<Vec<u64>>());

    let latest = store.latest_revision().await.unwrap();
    assert_eq!(members_at(&store, latest).await.len(), 16);
}

// ========== Section 3: Reverse index ==========

#[tokio::test]
async fn test_reverse_read_respects_revision() {
    let store = MemoryTupleStore::new();
    let r1 = store.write(vec![member("alice", "eng")], vec![]).await.unwrap();
    let r2 = store.write(vec![], vec![member("alice", "eng")]).await.unwrap();

    let at_r1: Vec<StoredTuple> = store
        .read_reverse(r1, "member", "group", "user:alice")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(at_r1.len(), 1);

    let at_r2: Vec<StoredTuple> = store
        .read_reverse(r2, "member", "group", "user:alice")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(at_r2.is_empty());
}

#[tokio::test]
async fn test_reverse_read_rejects_malformed_user() {
    let store = MemoryTupleStore::new();
    let result = store
        .read_reverse(Revision::INITIAL, "member", "group", "alice")
        .await;
    assert!(matches!(result, Err(StorageError::InvalidFilter { .. })));
}

// ========== Section 4: Properties ==========

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The final tuple set does not depend on the order tuples were written in.
    #[test]
    fn prop_insertion_order_does_not_change_result(
        users in proptest::collection::hash_set("[a-z]{1,6}", 1..12),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let users: Vec<String> = users.into_iter().collect();
            let mut reversed = users.clone();
            reversed.reverse();

            let forward = MemoryTupleStore::new();
            for user in &users {
                forward.write(vec![member(user, "eng")], vec![]).await.unwrap();
            }
            let backward = MemoryTupleStore::new();
            backward
                .write(reversed.iter().map(|u| member(u, "eng")).collect(), vec![])
                .await
                .unwrap();

            let a = members_at(&forward, forward.latest_revision().await.unwrap()).await;
            let b = members_at(&backward, backward.latest_revision().await.unwrap()).await;
            prop_assert_eq!(a, b);
            Ok(())
        })?;
    }
}
