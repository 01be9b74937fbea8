//! Shopping cart lines and totals.
//!
//! [`Cart`] is the pure in-memory model. Persistence and change
//! notification live in the client crate's `CartStore`, which wraps it.
//!
//! # Invariants
//!
//! - At most one line per `(product_id, size)` pair.
//! - Every line has `quantity >= 1`.
//! - `item_count` and `total` are derived on read, never cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::product::Product;
use crate::types::{CartLineId, Money, ProductId, Size};

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub size: Size,
    pub quantity: u32,
    pub cart_line_id: CartLineId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CartItem {
    /// Line identifier in the `<product>-<size>-<millis>` form.
    #[must_use]
    pub fn line_id(product_id: &ProductId, size: &Size, at: DateTime<Utc>) -> CartLineId {
        CartLineId::new(format!("{product_id}-{size}-{}", at.timestamp_millis()))
    }

    /// `quantity × price`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.price * self.quantity
    }

    fn is(&self, product_id: &ProductId, size: &Size) -> bool {
        &self.product_id == product_id && &self.size == size
    }
}

/// The cart contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Rebuild a cart from arbitrary lines, restoring the invariants.
    ///
    /// Lines with zero quantity are dropped and duplicate pairs are merged
    /// into the first occurrence.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut cart = Self::new();
        for item in items.into_iter().filter(|i| i.quantity > 0) {
            match cart.find_mut(&item.product_id, &item.size) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
                None => cart.items.push(item),
            }
        }
        cart
    }

    /// Parse a persisted JSON snapshot. Missing or corrupt data yields `None`.
    #[must_use]
    pub fn from_snapshot(raw: &str) -> Option<Self> {
        serde_json::from_str::<Vec<CartItem>>(raw)
            .ok()
            .map(Self::from_items)
    }

    /// Serialize to the persisted JSON snapshot form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.items)
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, product_id: &ProductId, size: &Size) -> Option<&CartItem> {
        self.items.iter().find(|i| i.is(product_id, size))
    }

    fn find_mut(&mut self, product_id: &ProductId, size: &Size) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|i| i.is(product_id, size))
    }

    /// Add one unit of `product` in `size`.
    pub fn add_item(&mut self, product: &Product, size: Size, at: DateTime<Utc>) {
        if let Some(line) = self.find_mut(&product.id, &size) {
            line.quantity = line.quantity.saturating_add(1);
            return;
        }
        self.items.push(CartItem {
            cart_line_id: CartItem::line_id(&product.id, &size, at),
            product_id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            size,
            quantity: 1,
            image: product.image.clone(),
        });
    }

    /// Remove the matching line. Returns whether anything was removed.
    pub fn remove_item(&mut self, product_id: &ProductId, size: &Size) -> bool {
        let before = self.items.len();
        self.items.retain(|i| !i.is(product_id, size));
        self.items.len() != before
    }

    /// Set a line's quantity; anything below one removes the line.
    ///
    /// Returns whether the cart changed.
    pub fn update_quantity(&mut self, product_id: &ProductId, size: &Size, quantity: i64) -> bool {
        if quantity < 1 {
            return self.remove_item(product_id, size);
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        match self.find_mut(product_id, size) {
            Some(line) if line.quantity != quantity => {
                line.quantity = quantity;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Sum of `quantity × price` across lines.
    #[must_use]
    pub fn total(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn product(id: &str, dollars: i64) -> Product {
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "name": format!("Product {id}"),
            "price": dollars,
        }))
        .unwrap()
    }

    fn size(s: &str) -> Size {
        Size::parse(s).unwrap()
    }

    #[test]
    fn test_repeated_add_increments_single_line() {
        let mut cart = Cart::new();
        let p = product("p1", 20);
        for _ in 0..5 {
            cart.add_item(&p, size("M"), Utc::now());
        }
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 5);
    }

    #[test]
    fn test_two_sizes_example() {
        let mut cart = Cart::new();
        let p1 = product("P1", 20);
        cart.add_item(&p1, size("M"), Utc::now());
        cart.add_item(&p1, size("M"), Utc::now());
        cart.add_item(&p1, size("L"), Utc::now());

        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.get(&p1.id, &size("M")).unwrap().quantity, 2);
        assert_eq!(cart.get(&p1.id, &size("L")).unwrap().quantity, 1);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total(), Money::from_dollars(60));
    }

    #[test]
    fn test_remove_then_add_starts_fresh() {
        let mut cart = Cart::new();
        let p = product("p1", 10);
        cart.add_item(&p, size("S"), Utc::now());
        cart.add_item(&p, size("S"), Utc::now());
        assert!(cart.remove_item(&p.id, &size("S")));
        cart.add_item(&p, size("S"), Utc::now());
        assert_eq!(cart.get(&p.id, &size("S")).unwrap().quantity, 1);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut cart = Cart::new();
        assert!(!cart.remove_item(&ProductId::new("nope"), &Size::default()));
    }

    #[test]
    fn test_update_quantity_below_one_removes() {
        let mut cart = Cart::new();
        let p = product("p1", 10);
        cart.add_item(&p, size("M"), Utc::now());
        assert!(cart.update_quantity(&p.id, &size("M"), 4));
        assert_eq!(cart.item_count(), 4);
        assert!(cart.update_quantity(&p.id, &size("M"), 0));
        assert!(cart.is_empty());
        assert!(!cart.update_quantity(&p.id, &size("M"), -3));
    }

    #[test]
    fn test_update_quantity_unknown_line_is_noop() {
        let mut cart = Cart::new();
        assert!(!cart.update_quantity(&ProductId::new("x"), &size("M"), 3));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_line_id_format() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let id = CartItem::line_id(&ProductId::new("p9"), &size("XL"), at);
        assert_eq!(id.as_str(), "p9-XL-1700000000000");
    }

    #[test]
    fn test_snapshot_restores_invariants() {
        let raw = r#"[
            {"productId":"a","name":"A","price":"5","size":"m","quantity":2,"cartLineId":"a-M-1"},
            {"productId":"a","name":"A","price":"5","size":"M","quantity":1,"cartLineId":"a-M-2"},
            {"productId":"b","name":"B","price":"7","size":"M","quantity":0,"cartLineId":"b-M-3"}
        ]"#;
        let cart = Cart::from_snapshot(raw).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_corrupt_snapshot_is_none() {
        assert!(Cart::from_snapshot("{not json").is_none());
        assert!(Cart::from_snapshot(r#"{"items":1}"#).is_none());
    }

    #[test]
    fn test_snapshot_roundtrip_keeps_lines() {
        let mut cart = Cart::new();
        cart.add_item(&product("p1", 3), size("M"), Utc::now());
        let restored = Cart::from_snapshot(&cart.to_snapshot().unwrap()).unwrap();
        assert_eq!(restored, cart);
    }
}
