//! Change notification bridge.
//!
//! [`SyncBridge`] fans typed [`StoreEvent`]s out to every subscriber so that
//! independent consumers (a badge counter, a wishlist view, a product page)
//! stay current without knowing about each other. It is an ordinary value
//! built by the composition root and handed to whoever needs it; clones
//! share the same subscriber list.
//!
//! Delivery is synchronous and best-effort: each live subscriber is called
//! exactly once per published event, in subscription order, and a
//! panicking subscriber is logged and skipped.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use emporium_core::{Email, WishlistSnapshot};

use crate::storage::{Storage, load_json, wishlist_key};

/// Something changed that subscribers may want to re-render for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The cart was mutated; carries the new item count.
    CartChanged { item_count: u64 },
    /// A user's wishlist changed locally or was refreshed from the server.
    WishlistChanged { user: Email },
    /// A non-fatal failure the user should be told about.
    Warning { message: String },
}

type Callback = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

struct BridgeInner {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, Callback>>,
    storage: Arc<dyn Storage>,
}

/// Typed publish/subscribe hub for client state changes.
#[derive(Clone)]
pub struct SyncBridge {
    inner: Arc<BridgeInner>,
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`SyncBridge::subscribe`].
///
/// Dropping it unsubscribes. Call [`Subscription::detach`] to keep the
/// callback registered for the life of the bridge.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    bridge: Weak<BridgeInner>,
    detached: bool,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the callback registered until the bridge itself is dropped.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        if let Some(inner) = self.bridge.upgrade() {
            inner
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

impl SyncBridge {
    /// Create a bridge reading cached wishlist counts from `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(BTreeMap::new()),
                storage,
            }),
        }
    }

    /// Register a callback for every future event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(callback));
        Subscription {
            id,
            bridge: Arc::downgrade(&self.inner),
            detached: false,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&self, event: &StoreEvent) {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let callbacks: Vec<(u64, Callback)> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        tracing::trace!(?event, subscribers = callbacks.len(), "Publishing store event");
        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::warn!(subscriber = id, ?event, "Subscriber panicked; skipping");
            }
        }
    }

    /// Announce that `user`'s wishlist changed.
    pub fn trigger_update(&self, user: &Email) {
        self.publish(&StoreEvent::WishlistChanged { user: user.clone() });
    }

    /// Surface a non-blocking warning.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "User-facing warning");
        self.publish(&StoreEvent::Warning { message });
    }

    /// Number of entries in the locally cached wishlist for `user`.
    ///
    /// Zero when there is no user, no cache, or the cache is corrupt.
    #[must_use]
    pub fn wishlist_count(&self, user: Option<&Email>) -> usize {
        user.and_then(|email| {
            load_json::<Vec<WishlistSnapshot>>(self.inner.storage.as_ref(), &wishlist_key(email))
        })
        .map_or(0, |items| items.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::storage::MemoryStorage;

    fn bridge() -> (SyncBridge, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (SyncBridge::new(storage.clone()), storage)
    }

    fn email() -> Email {
        Email::parse("jane@shop.io").unwrap()
    }

    #[test]
    fn test_trigger_update_calls_each_subscriber_once() {
        let (bridge, _) = bridge();
        let hits = Arc::new(AtomicUsize::new(0));
        let subs: Vec<Subscription> = (0..5)
            .map(|_| {
                let hits = Arc::clone(&hits);
                bridge.subscribe(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        bridge.trigger_update(&email());
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        bridge.trigger_update(&email());
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        drop(subs);
    }

    #[test]
    fn test_unsubscribe_and_drop_stop_delivery() {
        let (bridge, _) = bridge();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let first = bridge.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let h = Arc::clone(&hits);
        let second = bridge.subscribe(move |_| {
            h.fetch_add(10, Ordering::SeqCst);
        });

        first.unsubscribe();
        bridge.warn("offline");
        assert_eq!(hits.load(Ordering::SeqCst), 10);

        drop(second);
        bridge.warn("offline");
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(bridge.subscriber_count(), 0);
    }

    #[test]
    fn test_detached_subscription_stays_registered() {
        let (bridge, _) = bridge();
        bridge.subscribe(|_| {}).detach();
        assert_eq!(bridge.subscriber_count(), 1);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let (bridge, _) = bridge();
        let hits = Arc::new(AtomicUsize::new(0));
        let _bad = bridge.subscribe(|_| panic!("subscriber bug"));
        let h = Arc::clone(&hits);
        let _good = bridge.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bridge.publish(&StoreEvent::CartChanged { item_count: 1 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_can_unsubscribe_during_publish() {
        let (bridge, _) = bridge();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_in = Arc::clone(&slot);
        let sub = bridge.subscribe(move |_| {
            slot_in.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        bridge.warn("x");
        assert_eq!(bridge.subscriber_count(), 0);
    }

    #[test]
    fn test_wishlist_count_is_defensive() {
        let (bridge, storage) = bridge();
        let user = email();
        assert_eq!(bridge.wishlist_count(None), 0);
        assert_eq!(bridge.wishlist_count(Some(&user)), 0);

        storage.set(&wishlist_key(&user), "not json").unwrap();
        assert_eq!(bridge.wishlist_count(Some(&user)), 0);

        storage
            .set(
                &wishlist_key(&user),
                r#"[{"productId":"p1","addedAt":"2024-01-01T00:00:00Z"},{"productId":"p2","addedAt":"2024-01-02T00:00:00Z"}]"#,
            )
            .unwrap();
        assert_eq!(bridge.wishlist_count(Some(&user)), 2);
    }
}
