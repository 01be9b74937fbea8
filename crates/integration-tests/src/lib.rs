//! Integration tests for Emporium.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p emporium-integration-tests
//! ```
//!
//! The tests drive `emporium-client` against [`FakeStore`], an in-memory
//! stand-in for the REST backend that can be switched offline to exercise
//! the failure paths.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use emporium_client::api::{ApiError, OrderApi, WishlistApi, WishlistCheck};
use emporium_client::events::{StoreEvent, Subscription, SyncBridge};
use emporium_client::session::Session;
use emporium_client::storage::{MemoryStorage, Storage};
use emporium_client::wishlist::{FailurePolicy, WishlistMirror};
use emporium_core::order::NewOrder;
use emporium_core::{
    Email, Order, Product, ProductId, UserProfile, WishlistEntry, WishlistEntryId,
};

/// In-memory backend for one signed-in user.
#[derive(Default)]
pub struct FakeStore {
    wishlist: Mutex<BTreeMap<String, WishlistEntry>>,
    orders: Mutex<Vec<NewOrder>>,
    rejected_removals: Mutex<BTreeSet<String>>,
    next_id: AtomicUsize,
    offline: AtomicBool,
    pub list_calls: AtomicUsize,
}

impl FakeStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Server-side wishlist product ids.
    #[must_use]
    pub fn wishlist_products(&self) -> Vec<String> {
        self.wishlist
            .lock()
            .unwrap()
            .values()
            .filter_map(|e| e.product_id().map(|p| p.as_str().to_owned()))
            .collect()
    }

    /// Server-side notes on `product_id`'s entry.
    #[must_use]
    pub fn wishlist_notes(&self, product_id: &ProductId) -> Option<String> {
        self.wishlist
            .lock()
            .unwrap()
            .values()
            .find(|e| e.product_id() == Some(product_id))
            .and_then(|e| e.notes.clone())
    }

    /// Make every `DELETE` of `id` fail while the rest succeed.
    pub fn reject_removal(&self, id: &WishlistEntryId) {
        self.rejected_removals
            .lock()
            .unwrap()
            .insert(id.as_str().to_owned());
    }

    /// Seed a server-side entry as if added from another device.
    pub fn seed_wishlist(&self, product: &Product) -> WishlistEntryId {
        let id = self.next_entry_id();
        self.wishlist.lock().unwrap().insert(
            id.clone(),
            WishlistEntry {
                id: WishlistEntryId::new(id.clone()),
                product: Some(product.clone()),
                product_id: None,
                added_at: Utc::now(),
                notes: None,
            },
        );
        WishlistEntryId::new(id)
    }

    #[must_use]
    pub fn placed_orders(&self) -> Vec<NewOrder> {
        self.orders.lock().unwrap().clone()
    }

    fn next_entry_id(&self) -> String {
        format!("w{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn online(&self) -> Result<(), ApiError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                message: "Service Unavailable".to_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WishlistApi for FakeStore {
    async fn list_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.online()?;
        Ok(self.wishlist.lock().unwrap().values().cloned().collect())
    }

    async fn check_wishlist(&self, product_id: &ProductId) -> Result<WishlistCheck, ApiError> {
        self.online()?;
        let entries = self.wishlist.lock().unwrap();
        let found = entries.values().find(|e| e.product_id() == Some(product_id));
        Ok(WishlistCheck {
            exists: found.is_some(),
            wishlist_id: found.map(|e| e.id.clone()),
        })
    }

    async fn add_to_wishlist(
        &self,
        product_id: &ProductId,
        notes: Option<&str>,
    ) -> Result<WishlistEntry, ApiError> {
        self.online()?;
        let id = self.next_entry_id();
        let entry = WishlistEntry {
            id: WishlistEntryId::new(id.clone()),
            product: None,
            product_id: Some(product_id.clone()),
            added_at: Utc::now(),
            notes: notes.map(str::to_owned),
        };
        self.wishlist.lock().unwrap().insert(id, entry.clone());
        Ok(entry)
    }

    async fn update_wishlist_notes(&self, id: &WishlistEntryId, notes: &str) -> Result<(), ApiError> {
        self.online()?;
        let mut entries = self.wishlist.lock().unwrap();
        let entry = entries
            .get_mut(id.as_str())
            .ok_or_else(|| ApiError::NotFound(format!("wishlist entry {id}")))?;
        entry.notes = Some(notes.to_owned());
        Ok(())
    }

    async fn remove_from_wishlist(&self, id: &WishlistEntryId) -> Result<(), ApiError> {
        self.online()?;
        if self.rejected_removals.lock().unwrap().contains(id.as_str()) {
            return Err(ApiError::Status {
                status: 500,
                message: "Failed to remove from wishlist".to_owned(),
            });
        }
        self.wishlist
            .lock()
            .unwrap()
            .remove(id.as_str())
            .map(drop)
            .ok_or_else(|| ApiError::NotFound(format!("wishlist entry {id}")))
    }
}

#[async_trait]
impl OrderApi for FakeStore {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, ApiError> {
        self.online()?;
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        Ok(serde_json::from_value(serde_json::json!({
            "_id": format!("o{}", orders.len()),
            "userEmail": order.contact.email,
            "items": [],
            "grandTotal": order.grand_total,
            "status": "pending",
            "createdAt": Utc::now(),
        }))
        .unwrap())
    }
}

/// A catalog product with the given price in whole dollars.
#[must_use]
pub fn product(id: &str, dollars: i64) -> Product {
    serde_json::from_value(serde_json::json!({
        "_id": id,
        "name": format!("Product {id}"),
        "price": dollars,
        "category": "Shirts",
    }))
    .unwrap()
}

#[must_use]
pub fn session(email: &str) -> Session {
    Session::new(
        UserProfile::new(Email::parse(email).unwrap()),
        "test-token".to_owned().into(),
    )
}

/// Everything a wishlist test needs, wired like the application does.
pub struct Harness {
    pub api: Arc<FakeStore>,
    pub storage: Arc<dyn Storage>,
    pub bridge: SyncBridge,
    pub mirror: WishlistMirror<Arc<FakeStore>>,
}

impl Harness {
    #[must_use]
    pub fn new(policy: FailurePolicy) -> Self {
        Self::with_storage(policy, Arc::new(MemoryStorage::new()))
    }

    #[must_use]
    pub fn with_storage(policy: FailurePolicy, storage: Arc<dyn Storage>) -> Self {
        let api = FakeStore::new();
        let bridge = SyncBridge::new(Arc::clone(&storage));
        let mirror = WishlistMirror::new(Arc::clone(&api), Arc::clone(&storage), bridge.clone(), policy);
        Self {
            api,
            storage,
            bridge,
            mirror,
        }
    }

    /// Collect warning messages published on the bridge.
    #[must_use]
    pub fn record_warnings(&self) -> (Arc<Mutex<Vec<String>>>, Subscription) {
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&warnings);
        let subscription = self.bridge.subscribe(move |event| {
            if let StoreEvent::Warning { message } = event {
                sink.lock().unwrap().push(message.clone());
            }
        });
        (warnings, subscription)
    }
}
