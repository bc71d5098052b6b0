//! Races between masters on the same request.
//!
//! The store sleeps before every call so that both contenders are in flight
//! at once; exactly one conditional update may match.

#![allow(clippy::unwrap_used)]

use futures::future::join_all;
use repair_desk_core::error::LifecycleError;
use repair_desk_core::types::{RequestStatus, Version};
use repair_desk_testing::{InMemoryRequestStore, TestDesk, init_test_tracing, test_clock, valid_new_request};
use std::sync::Arc;
use std::time::Duration;

async fn latent_desk() -> TestDesk {
    init_test_tracing();
    let store = InMemoryRequestStore::new().with_latency(Duration::from_millis(20));
    TestDesk::with_store(store, Arc::new(test_clock())).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_master_double_take_has_one_winner() {
    let desk = latent_desk().await;
    let master = desk.master_actor();
    let request = desk.engine.create_request(valid_new_request()).await.unwrap();
    desk.engine
        .assign_request(&desk.dispatcher, request.id, master.id)
        .await
        .unwrap();

    let contenders = (0..2).map(|_| {
        let engine = desk.engine.clone();
        tokio::spawn(async move { engine.take_request(&master, request.id).await })
    });
    let results: Vec<_> = join_all(contenders)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(LifecycleError::Conflict { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 1);

    let current = desk.engine.get_request(&desk.dispatcher, request.id).await.unwrap();
    assert_eq!(current.status, RequestStatus::InProgress);
    assert_eq!(current.version, Version::new(3), "exactly one version bump");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_takes_have_one_winner() {
    let desk = latent_desk().await;
    let master = desk.master_actor();
    let request = desk.engine.create_request(valid_new_request()).await.unwrap();
    desk.engine
        .assign_request(&desk.dispatcher, request.id, master.id)
        .await
        .unwrap();

    let contenders = (0..16).map(|_| {
        let engine = desk.engine.clone();
        tokio::spawn(async move { engine.take_request(&master, request.id).await })
    });
    let results: Vec<_> = join_all(contenders)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(LifecycleError::is_retryable)
    );
    let current = desk.engine.get_request(&desk.dispatcher, request.id).await.unwrap();
    assert_eq!(current.version, Version::new(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_other_master_cannot_steal_during_race() {
    let desk = latent_desk().await;
    let owner = desk.master_actor();
    let intruder = desk.other_master_actor();
    let request = desk.engine.create_request(valid_new_request()).await.unwrap();
    desk.engine
        .assign_request(&desk.dispatcher, request.id, owner.id)
        .await
        .unwrap();

    let owner_take = {
        let engine = desk.engine.clone();
        tokio::spawn(async move { engine.take_request(&owner, request.id).await })
    };
    let intruder_take = {
        let engine = desk.engine.clone();
        tokio::spawn(async move { engine.take_request(&intruder, request.id).await })
    };

    let (owner_result, intruder_result) = tokio::join!(owner_take, intruder_take);
    let taken = owner_result.unwrap().unwrap();
    assert_eq!(taken.assigned_to, Some(owner.id));
    assert!(matches!(
        intruder_result.unwrap(),
        Err(LifecycleError::Conflict { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_races_take() {
    let desk = latent_desk().await;
    let master = desk.master_actor();
    let dispatcher = desk.dispatcher;
    let request = desk.engine.create_request(valid_new_request()).await.unwrap();
    desk.engine
        .assign_request(&dispatcher, request.id, master.id)
        .await
        .unwrap();

    let take = {
        let engine = desk.engine.clone();
        tokio::spawn(async move { engine.take_request(&master, request.id).await })
    };
    let cancel = {
        let engine = desk.engine.clone();
        tokio::spawn(async move { engine.cancel_request(&dispatcher, request.id).await })
    };
    let (take, cancel) = tokio::join!(take, cancel);
    let (take, cancel) = (take.unwrap(), cancel.unwrap());

    // Both guard on `assigned`; only one write can see it.
    assert_ne!(take.is_ok(), cancel.is_ok());

    let current = desk.engine.get_request(&dispatcher, request.id).await.unwrap();
    assert_eq!(current.version, Version::new(3));
    if take.is_ok() {
        assert_eq!(current.status, RequestStatus::InProgress);
        assert!(matches!(cancel, Err(LifecycleError::InvalidTransition { .. })));
    } else {
        assert_eq!(current.status, RequestStatus::Canceled);
        assert!(matches!(take, Err(LifecycleError::Conflict { .. })));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_assigns_have_one_winner() {
    let desk = latent_desk().await;
    let dispatcher = desk.dispatcher;
    let masters = [desk.master.id, desk.other_master.id];
    let request = desk.engine.create_request(valid_new_request()).await.unwrap();

    let contenders = masters.map(|master_id| {
        let engine = desk.engine.clone();
        tokio::spawn(async move { engine.assign_request(&dispatcher, request.id, master_id).await })
    });
    let results: Vec<_> = join_all(contenders)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let current = desk.engine.get_request(&dispatcher, request.id).await.unwrap();
    assert_eq!(current.assigned_to, winner.assigned_to);
    assert_eq!(current.version, Version::new(2));
}
