// tests/unit_lock_test.rs

use otter::core::coordination::{
    DistributedLock, InMemoryCoordination, Partitioner, PartitionerState,
};
use otter::core::errors::OtterError;
use otter::core::store::{ClaimLock, InMemoryStore};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_lock_acquire_release_cycle() {
    let coordination = Arc::new(InMemoryCoordination::new());
    let lock = DistributedLock::new(coordination.clone(), "/testlock");

    assert!(!lock.is_held().await.unwrap());
    lock.acquire(Duration::from_millis(100)).await.unwrap();
    assert!(lock.is_held().await.unwrap());
    lock.release().await.unwrap();
    assert!(!lock.is_held().await.unwrap());
}

#[tokio::test]
async fn test_second_contender_times_out_then_wins_after_release() {
    let coordination = Arc::new(InMemoryCoordination::new());
    let holder = DistributedLock::new(coordination.clone(), "/testlock");
    let contender = DistributedLock::new(Arc::new(coordination.new_session()), "/testlock");

    holder.acquire(Duration::from_millis(100)).await.unwrap();
    let err = contender
        .acquire(Duration::from_millis(120))
        .await
        .unwrap_err();
    assert!(matches!(err, OtterError::LockTimeout(_)));
    assert!(holder.is_held().await.unwrap());

    // After the holder lets go, the contender gets in.
    holder.release().await.unwrap();
    contender.acquire(Duration::from_millis(200)).await.unwrap();
    assert!(contender.is_held().await.unwrap());
}

#[tokio::test]
async fn test_session_loss_implicitly_releases() {
    let coordination = Arc::new(InMemoryCoordination::new());
    let session = coordination.new_session();
    let holder = DistributedLock::new(Arc::new(session.clone()), "/testlock");
    holder.acquire(Duration::from_millis(100)).await.unwrap();

    session.expire_session();
    // The holder's own view reports not-held once the session is gone.
    assert!(!holder.is_held().await.unwrap());

    // And another session can take the lock immediately.
    let next = DistributedLock::new(coordination, "/testlock");
    next.acquire(Duration::from_millis(100)).await.unwrap();
    assert!(next.is_held().await.unwrap());
}

#[tokio::test]
async fn test_partitioner_single_node_owns_all_buckets() {
    let coordination = Arc::new(InMemoryCoordination::new());
    let partitioner = Partitioner::new(coordination, "/partition", (0..8).collect());

    assert_eq!(partitioner.state(), PartitionerState::Allocating);
    assert!(partitioner.current_buckets().is_empty());

    partitioner.tick().await.unwrap();
    assert_eq!(partitioner.state(), PartitionerState::Acquired);
    assert_eq!(partitioner.current_buckets(), (0..8).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_partitioner_splits_buckets_across_nodes() {
    let coordination = InMemoryCoordination::new();
    let a = Partitioner::new(Arc::new(coordination.clone()), "/partition", (0..8).collect());
    let b = Partitioner::new(
        Arc::new(coordination.new_session()),
        "/partition",
        (0..8).collect(),
    );

    // A allocates alone first and owns everything.
    a.tick().await.unwrap();
    assert_eq!(a.current_buckets().len(), 8);

    // B joins: A sees the membership change and releases before it
    // reallocates; consumers act on nothing during that window.
    b.tick().await.unwrap();
    a.tick().await.unwrap();
    assert_eq!(a.state(), PartitionerState::Release);
    assert!(a.current_buckets().is_empty());

    // Two more ticks: release is honored, then both acquire disjoint halves.
    a.tick().await.unwrap();
    a.tick().await.unwrap();
    b.tick().await.unwrap();
    assert_eq!(a.state(), PartitionerState::Acquired);
    assert_eq!(b.state(), PartitionerState::Acquired);

    let mut combined = a.current_buckets();
    combined.extend(b.current_buckets());
    combined.sort();
    assert_eq!(combined, (0..8).collect::<Vec<u32>>());
    assert_eq!(a.current_buckets().len(), 4);
    assert_eq!(b.current_buckets().len(), 4);
}

#[tokio::test]
async fn test_partitioner_session_loss_resets_to_allocating() {
    let coordination = InMemoryCoordination::new();
    let session = coordination.new_session();
    let partitioner = Partitioner::new(Arc::new(session.clone()), "/partition", (0..4).collect());

    partitioner.tick().await.unwrap();
    assert_eq!(partitioner.state(), PartitionerState::Acquired);

    session.expire_session();
    let err = partitioner.tick().await.unwrap_err();
    assert!(matches!(err, OtterError::SessionLost));
    assert_eq!(partitioner.state(), PartitionerState::Allocating);
    assert!(partitioner.current_buckets().is_empty());
}

#[tokio::test]
async fn test_claim_lock_mutual_exclusion() {
    let store = Arc::new(InMemoryStore::new());
    let first = ClaimLock::new(store.clone(), "locks-test");
    let second = ClaimLock::new(store.clone(), "locks-test");

    first.acquire().await.unwrap();
    let err = second.acquire().await.unwrap_err();
    assert!(matches!(err, OtterError::BusyLock(_)));

    first.release().await.unwrap();
    second.acquire().await.unwrap();
    second.release().await.unwrap();
}

#[tokio::test]
async fn test_claim_lock_with_lock_releases_on_error() {
    let store = Arc::new(InMemoryStore::new());
    let lock = ClaimLock::new(store.clone(), "locks-test");

    let result: Result<(), OtterError> = lock
        .with_lock(async { Err(OtterError::Internal("boom".to_string())) })
        .await;
    assert!(result.is_err());

    // The claim is gone, so a fresh contender acquires immediately.
    let next = ClaimLock::new(store, "locks-test");
    next.acquire().await.unwrap();
    next.release().await.unwrap();
}
