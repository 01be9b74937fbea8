//! Durable cart store.
//!
//! [`CartStore`] is the single writer of the `cart` snapshot. Every
//! mutation is written through to storage and announced on the bridge.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use emporium_core::order::{CheckoutValidationError, NewOrder};
use emporium_core::{
    Cart, CartItem, CheckoutForm, Money, Order, OrderTotals, Product, ProductId, Size,
};
use thiserror::Error;
use tracing::instrument;

use crate::api::{ApiError, OrderApi};
use crate::events::{StoreEvent, SyncBridge};
use crate::storage::{CART_KEY, Storage};

/// Errors from [`CartStore::checkout`].
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Your cart is empty")]
    EmptyCart,

    #[error(transparent)]
    Invalid(#[from] CheckoutValidationError),

    #[error("Failed to place order: {0}")]
    Api(#[from] ApiError),
}

/// The shopping cart, persisted after every change.
#[derive(Debug)]
pub struct CartStore {
    cart: Mutex<Cart>,
    storage: Arc<dyn Storage>,
    bridge: SyncBridge,
}

impl CartStore {
    /// Load the cart from storage. Missing or corrupt data gives an empty cart.
    pub fn load(storage: Arc<dyn Storage>, bridge: SyncBridge) -> Self {
        let cart = match storage.get(CART_KEY) {
            Ok(Some(raw)) => Cart::from_snapshot(&raw).unwrap_or_else(|| {
                tracing::warn!("Discarding corrupt cart snapshot");
                Cart::new()
            }),
            Ok(None) => Cart::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cart snapshot");
                Cart::new()
            }
        };
        tracing::debug!(lines = cart.items().len(), "Cart loaded");
        Self {
            cart: Mutex::new(cart),
            storage,
            bridge,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cart> {
        self.cart.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the cart, then persist and notify.
    fn mutate<R>(&self, f: impl FnOnce(&mut Cart) -> R) -> R {
        let (result, snapshot, item_count) = {
            let mut cart = self.lock();
            let result = f(&mut cart);
            (result, cart.to_snapshot(), cart.item_count())
        };

        let written = snapshot
            .map_err(|e| e.to_string())
            .and_then(|raw| self.storage.set(CART_KEY, &raw).map_err(|e| e.to_string()));
        if let Err(error) = written {
            tracing::error!(%error, "Failed to persist cart");
            self.bridge.warn("Your cart could not be saved on this device");
        }

        self.bridge.publish(&StoreEvent::CartChanged { item_count });
        result
    }

    /// Add one unit of `product`. `None` picks the default size.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub fn add_item(&self, product: &Product, size: Option<Size>) {
        let size = size.unwrap_or_default();
        self.mutate(|cart| cart.add_item(product, size, Utc::now()));
    }

    /// Remove the matching line, if any.
    #[instrument(skip(self))]
    pub fn remove_item(&self, product_id: &ProductId, size: &Size) {
        self.mutate(|cart| cart.remove_item(product_id, size));
    }

    /// Set a line's quantity; below one removes the line.
    #[instrument(skip(self))]
    pub fn update_quantity(&self, product_id: &ProductId, size: &Size, quantity: i64) {
        self.mutate(|cart| cart.update_quantity(product_id, size, quantity));
    }

    /// Empty the cart and erase the persisted snapshot.
    #[instrument(skip(self))]
    pub fn clear(&self) {
        self.lock().clear();
        if let Err(e) = self.storage.remove(CART_KEY) {
            tracing::error!(error = %e, "Failed to erase cart snapshot");
            self.bridge.warn("Your cart could not be saved on this device");
        }
        self.bridge.publish(&StoreEvent::CartChanged { item_count: 0 });
    }

    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.lock().items().to_vec()
    }

    /// A copy of the whole cart.
    #[must_use]
    pub fn snapshot(&self) -> Cart {
        self.lock().clone()
    }

    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lock().item_count()
    }

    #[must_use]
    pub fn cart_total(&self) -> Money {
        self.lock().total()
    }

    /// Shipping, tax and grand total for the current cart.
    #[must_use]
    pub fn totals(&self) -> OrderTotals {
        OrderTotals::for_cart(&self.lock())
    }

    /// Validate `form`, submit the order and clear the cart on success.
    ///
    /// On any failure the cart is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` for an empty cart,
    /// `CheckoutError::Invalid` listing every bad field, or
    /// `CheckoutError::Api` if the backend rejects the order.
    #[instrument(skip_all)]
    pub async fn checkout(
        &self,
        api: &(impl OrderApi + ?Sized),
        form: &CheckoutForm,
    ) -> Result<Order, CheckoutError> {
        let cart = self.snapshot();
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let contact = form.validate()?;
        let order = NewOrder::new(contact, &cart);

        let placed = api.create_order(&order).await.inspect_err(|e| {
            tracing::warn!(error = %e, "Order submission failed");
        })?;

        tracing::info!(order_id = %placed.id, total = %order.grand_total, "Order placed");
        self.clear();
        Ok(placed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::storage::MemoryStorage;

    fn product(id: &str, dollars: i64) -> Product {
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "name": format!("Product {id}"),
            "price": dollars,
        }))
        .unwrap()
    }

    fn store() -> (CartStore, Arc<MemoryStorage>, SyncBridge) {
        let storage = Arc::new(MemoryStorage::new());
        let bridge = SyncBridge::new(storage.clone());
        (CartStore::load(storage.clone(), bridge.clone()), storage, bridge)
    }

    fn size(s: &str) -> Size {
        Size::parse(s).unwrap()
    }

    #[test]
    fn test_two_sizes_scenario() {
        let (cart, _, _) = store();
        let p1 = product("p1", 20);
        cart.add_item(&p1, Some(size("M")));
        cart.add_item(&p1, None);
        cart.add_item(&p1, Some(size("L")));

        let items = cart.items();
        assert_eq!(items.len(), 2);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.cart_total(), Money::from_dollars(60));
    }

    #[test]
    fn test_mutations_write_through() {
        let (cart, storage, bridge) = store();
        cart.add_item(&product("p1", 5), None);
        cart.add_item(&product("p1", 5), None);

        let reloaded = CartStore::load(storage.clone(), bridge);
        assert_eq!(reloaded.item_count(), 2);

        cart.clear();
        assert_eq!(storage.get(CART_KEY).unwrap(), None);
    }

    #[test]
    fn test_corrupt_snapshot_loads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(CART_KEY, "{{not json").unwrap();
        let cart = CartStore::load(storage.clone(), SyncBridge::new(storage));
        assert_eq!(cart.item_count(), 0);
    }

    #[test]
    fn test_remove_then_add_starts_fresh() {
        let (cart, _, _) = store();
        let p = product("p1", 10);
        cart.add_item(&p, None);
        cart.add_item(&p, None);
        cart.remove_item(&p.id, &Size::default());
        cart.add_item(&p, None);
        assert_eq!(cart.items()[0].quantity, 1);
    }

    #[test]
    fn test_update_quantity_below_one_removes() {
        let (cart, _, _) = store();
        let p = product("p1", 10);
        cart.add_item(&p, None);
        cart.update_quantity(&p.id, &Size::default(), 4);
        assert_eq!(cart.item_count(), 4);
        cart.update_quantity(&p.id, &Size::default(), 0);
        assert!(cart.items().is_empty());
    }

    #[test]
    fn test_mutations_publish_item_count() {
        let (cart, _, bridge) = store();
        let last = Arc::new(AtomicU64::new(u64::MAX));
        let seen = Arc::clone(&last);
        let _sub = bridge.subscribe(move |event| {
            if let StoreEvent::CartChanged { item_count } = event {
                seen.store(*item_count, Ordering::SeqCst);
            }
        });

        cart.add_item(&product("p1", 10), None);
        cart.add_item(&product("p2", 10), None);
        assert_eq!(last.load(Ordering::SeqCst), 2);
        cart.clear();
        assert_eq!(last.load(Ordering::SeqCst), 0);
    }

    struct RecordingOrders {
        fail: bool,
    }

    #[async_trait]
    impl OrderApi for RecordingOrders {
        async fn create_order(&self, order: &NewOrder) -> Result<Order, ApiError> {
            if self.fail {
                return Err(ApiError::Status {
                    status: 500,
                    message: "down".to_string(),
                });
            }
            Ok(serde_json::from_value(serde_json::json!({
                "_id": "o1",
                "userEmail": order.contact.email,
                "items": [],
                "grandTotal": order.grand_total,
                "createdAt": "2024-05-01T10:00:00Z",
            }))
            .unwrap())
        }
    }

    fn valid_form() -> CheckoutForm {
        CheckoutForm {
            email: "jane@shop.io".to_string(),
            phone: "+15551234567".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            payment: "COD".to_string(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_checkout_clears_cart_on_success() {
        let (cart, _, _) = store();
        cart.add_item(&product("p1", 20), None);
        let order = cart
            .checkout(&RecordingOrders { fail: false }, &valid_form())
            .await
            .unwrap();
        assert_eq!(order.id.as_str(), "o1");
        assert_eq!(cart.item_count(), 0);
    }

    #[tokio::test]
    async fn test_checkout_failure_keeps_cart() {
        let (cart, _, _) = store();
        cart.add_item(&product("p1", 20), None);
        let err = cart
            .checkout(&RecordingOrders { fail: true }, &valid_form())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Api(_)));
        assert_eq!(cart.item_count(), 1);
    }

    #[tokio::test]
    async fn test_checkout_rejects_invalid_form_and_empty_cart() {
        let (cart, _, _) = store();
        let api = RecordingOrders { fail: false };
        assert!(matches!(
            cart.checkout(&api, &valid_form()).await,
            Err(CheckoutError::EmptyCart)
        ));

        cart.add_item(&product("p1", 20), None);
        let mut form = valid_form();
        form.phone = "123".to_string();
        let Err(CheckoutError::Invalid(errors)) = cart.checkout(&api, &form).await else {
            panic!("expected validation failure");
        };
        assert!(errors.message_for("phone").is_some());
        assert_eq!(cart.item_count(), 1);
    }
}
