//! Integration tests for the wishlist mirror and the sync bridge.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use emporium_client::api::ApiError;
use emporium_client::events::StoreEvent;
use emporium_client::storage::{FileStorage, Storage, wishlist_key};
use emporium_client::wishlist::{FailurePolicy, MirrorError, Toggled};
use emporium_core::{Email, WishlistEntryId};
use emporium_integration_tests::{Harness, product, session};
use tokio_util::sync::CancellationToken;

const SHOPPER: &str = "shopper@example.com";

fn shopper() -> Email {
    Email::parse(SHOPPER).unwrap()
}

async fn signed_in(policy: FailurePolicy) -> Harness {
    let harness = Harness::new(policy);
    harness.mirror.login(&session(SHOPPER)).await.unwrap();
    harness
}

#[tokio::test]
async fn test_offline_toggle_keeps_optimistic_entry_until_refresh() {
    let h = signed_in(FailurePolicy::KeepOptimistic).await;
    let (warnings, _sub) = h.record_warnings();
    let p2 = product("P2", 30);

    h.api.set_offline(true);
    let result = h.mirror.toggle(&p2).await;
    assert!(matches!(result, Err(MirrorError::Remote(_))));

    assert!(h.mirror.contains(&p2.id));
    assert_eq!(h.bridge.wishlist_count(Some(&shopper())), 1);
    assert_eq!(warnings.lock().unwrap().len(), 1);

    h.api.set_offline(false);
    h.mirror.refresh().await.unwrap();
    assert!(!h.mirror.contains(&p2.id));
    assert_eq!(h.bridge.wishlist_count(Some(&shopper())), 0);
    assert_eq!(warnings.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_offline_toggle_rolls_back_immediately() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let (warnings, _sub) = h.record_warnings();
    let p2 = product("P2", 30);

    h.api.set_offline(true);
    assert!(h.mirror.toggle(&p2).await.is_err());

    assert!(!h.mirror.contains(&p2.id));
    assert_eq!(h.bridge.wishlist_count(Some(&shopper())), 0);
    assert_eq!(warnings.lock().unwrap().len(), 1);
    assert!(h.mirror.pending().is_empty());
}

#[tokio::test]
async fn test_toggle_twice_returns_to_start() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let p = product("p1", 12);

    assert_eq!(h.mirror.toggle(&p).await.unwrap(), Toggled::Added);
    assert_eq!(h.api.wishlist_products(), vec!["p1".to_owned()]);
    assert_eq!(h.mirror.toggle(&p).await.unwrap(), Toggled::Removed);
    assert!(h.api.wishlist_products().is_empty());
    assert_eq!(h.mirror.count(), 0);
}

#[tokio::test]
async fn test_concurrent_toggles_of_one_product_settle_consistently() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let p = product("p1", 12);

    let (a, b) = tokio::join!(h.mirror.toggle(&p), h.mirror.toggle(&p));
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|t| *t == Toggled::Removed);
    assert_eq!(outcomes, vec![Toggled::Added, Toggled::Removed]);

    assert!(h.api.wishlist_products().is_empty());
    assert!(!h.mirror.contains(&p.id));
}

#[tokio::test]
async fn test_every_subscriber_called_once_per_change() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let hits = Arc::new(AtomicUsize::new(0));
    let subs: Vec<_> = (0..3)
        .map(|_| {
            let hits = Arc::clone(&hits);
            h.bridge.subscribe(move |event| {
                if matches!(event, StoreEvent::WishlistChanged { .. }) {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    h.bridge.trigger_update(&shopper());
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    drop(subs);
    h.bridge.trigger_update(&shopper());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_count_is_zero_for_missing_or_corrupt_cache() {
    let h = Harness::new(FailurePolicy::Rollback);
    assert_eq!(h.bridge.wishlist_count(None), 0);
    assert_eq!(h.bridge.wishlist_count(Some(&shopper())), 0);

    h.storage.set(&wishlist_key(&shopper()), "{not json").unwrap();
    assert_eq!(h.bridge.wishlist_count(Some(&shopper())), 0);
}

#[tokio::test]
async fn test_server_entries_replace_local_on_refresh() {
    let h = signed_in(FailurePolicy::Rollback).await;
    h.mirror.add(&product("local", 5), None).await.unwrap();

    h.api.seed_wishlist(&product("remote", 40));
    h.mirror.refresh().await.unwrap();

    let mut ids: Vec<String> = h.mirror.items().iter().map(|i| i.product_id.to_string()).collect();
    ids.sort();
    assert_eq!(ids, vec!["local".to_owned(), "remote".to_owned()]);
    assert_eq!(h.mirror.entries().len(), 2);
    assert_eq!(h.bridge.wishlist_count(Some(&shopper())), 2);
}

#[tokio::test]
async fn test_logout_hides_wishlist_but_keeps_cache() {
    let h = signed_in(FailurePolicy::Rollback).await;
    h.mirror.add(&product("p1", 5), None).await.unwrap();

    h.mirror.logout().await;
    assert_eq!(h.mirror.count(), 0);
    assert!(h.mirror.user().is_none());
    assert_eq!(h.bridge.wishlist_count(h.mirror.user().as_ref()), 0);
    assert_eq!(h.bridge.wishlist_count(Some(&shopper())), 1);
}

#[tokio::test]
async fn test_cached_wishlist_shown_when_server_unreachable_at_login() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(dir.path()).unwrap());

    let first = Harness::with_storage(FailurePolicy::Rollback, Arc::clone(&storage));
    first.mirror.login(&session(SHOPPER)).await.unwrap();
    first.mirror.add(&product("p1", 5), Some("birthday")).await.unwrap();

    let second = Harness::with_storage(FailurePolicy::Rollback, storage);
    second.api.set_offline(true);
    let (warnings, _sub) = second.record_warnings();
    assert!(second.mirror.login(&session(SHOPPER)).await.is_err());

    let items = second.mirror.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].notes.as_deref(), Some("birthday"));
    assert_eq!(warnings.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_note_update_rolls_back_when_offline() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let p = product("p1", 5);
    h.mirror.add(&p, Some("size M")).await.unwrap();

    h.api.set_offline(true);
    assert!(h.mirror.update_note(&p.id, "size L").await.is_err());
    assert_eq!(h.mirror.items()[0].notes.as_deref(), Some("size M"));
}

fn local_products(h: &Harness) -> Vec<String> {
    h.mirror.items().iter().map(|i| i.product_id.to_string()).collect()
}

#[tokio::test]
async fn test_bulk_removal_restores_only_rejected_entries() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let ids: Vec<WishlistEntryId> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|p| h.api.seed_wishlist(&product(p, 1)))
        .collect();
    h.mirror.refresh().await.unwrap();
    let (warnings, _sub) = h.record_warnings();

    h.api.reject_removal(&ids[1]);
    h.api.reject_removal(&ids[3]);
    let report = h.mirror.remove_many(&ids).await.unwrap();

    assert_eq!(report.removed, vec![ids[0].clone(), ids[2].clone()]);
    assert_eq!(report.failed, vec![ids[1].clone(), ids[3].clone()]);
    assert_eq!(local_products(&h), vec!["b".to_owned(), "d".to_owned()]);
    assert_eq!(h.api.wishlist_products(), vec!["b".to_owned(), "d".to_owned()]);
    assert_eq!(warnings.lock().unwrap().len(), 1);
    assert!(h.mirror.pending().is_empty());
}

#[tokio::test]
async fn test_rejected_bulk_removal_returns_to_its_position() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let ids: Vec<WishlistEntryId> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|p| h.api.seed_wishlist(&product(p, 1)))
        .collect();
    h.mirror.refresh().await.unwrap();

    h.api.reject_removal(&ids[2]);
    let report = h.mirror.remove_many(&ids[1..3]).await.unwrap();

    assert_eq!(report.removed, vec![ids[1].clone()]);
    assert_eq!(report.failed, vec![ids[2].clone()]);
    assert_eq!(
        local_products(&h),
        vec!["a".to_owned(), "c".to_owned(), "d".to_owned()]
    );
}

#[tokio::test]
async fn test_rejected_entry_keeps_place_when_earlier_entry_is_removed_after_it() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let ids: Vec<WishlistEntryId> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|p| h.api.seed_wishlist(&product(p, 1)))
        .collect();
    h.mirror.refresh().await.unwrap();

    h.api.reject_removal(&ids[2]);
    let report = h.mirror.remove_many(&[ids[2].clone(), ids[0].clone()]).await.unwrap();

    assert_eq!(report.removed, vec![ids[0].clone()]);
    assert_eq!(report.failed, vec![ids[2].clone()]);
    assert_eq!(
        local_products(&h),
        vec!["b".to_owned(), "c".to_owned(), "d".to_owned()]
    );
}

#[tokio::test]
async fn test_bulk_removal_sends_ids_missing_from_local_copy() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let remote_only = h.api.seed_wishlist(&product("x", 9));
    let ghost = WishlistEntryId::new("ghost");

    let report = h
        .mirror
        .remove_many(&[remote_only.clone(), ghost.clone()])
        .await
        .unwrap();

    assert_eq!(report.removed, vec![remote_only]);
    assert_eq!(report.failed, vec![ghost]);
    assert!(h.api.wishlist_products().is_empty());
}

#[tokio::test]
async fn test_note_on_entry_missing_from_local_copy_reaches_server() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let x = product("x", 9);
    h.api.seed_wishlist(&x);

    h.mirror.update_note(&x.id, "gift").await.unwrap();
    assert_eq!(h.api.wishlist_notes(&x.id).as_deref(), Some("gift"));
}

#[tokio::test]
async fn test_note_on_unknown_product_is_not_found() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let (warnings, _sub) = h.record_warnings();

    let result = h.mirror.update_note(&product("nowhere", 1).id, "gift").await;
    assert!(matches!(
        result,
        Err(MirrorError::Remote(ApiError::NotFound(_)))
    ));
    assert_eq!(warnings.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_mutations_require_a_session() {
    let h = Harness::new(FailurePolicy::Rollback);
    let result = h.mirror.add(&product("p1", 5), None).await;
    assert!(matches!(result, Err(MirrorError::NotSignedIn)));
    assert!(h.api.wishlist_products().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poller_picks_up_changes_from_other_devices() {
    let h = signed_in(FailurePolicy::Rollback).await;
    let cancel = CancellationToken::new();
    let poller = h.mirror.spawn_poller(Duration::from_secs(10), cancel.clone());

    h.api.seed_wishlist(&product("elsewhere", 25));
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(h.mirror.count(), 1);
    assert_eq!(h.bridge.wishlist_count(Some(&shopper())), 1);

    cancel.cancel();
    poller.await.unwrap();
    let calls = h.api.list_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.api.list_calls.load(Ordering::SeqCst), calls);
}
