//! Wishlist entries, the local snapshot form, and list views.

use std::collections::HashSet;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::product::Product;
use crate::types::{Money, ProductId, WishlistEntryId};

/// A wishlist entry as returned by the backend.
///
/// The backend populates `product`; older documents only carry
/// `product_id`. Use [`WishlistEntry::product_id`] to read either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistEntry {
    #[serde(rename = "_id")]
    pub id: WishlistEntryId,
    #[serde(default)]
    pub product: Option<Product>,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl WishlistEntry {
    /// The referenced product, from whichever field is populated.
    #[must_use]
    pub fn product_id(&self) -> Option<&ProductId> {
        self.product
            .as_ref()
            .map(|p| &p.id)
            .or(self.product_id.as_ref())
    }

    #[must_use]
    pub fn product_name(&self) -> Option<&str> {
        self.product.as_ref().map(|p| p.name.as_str())
    }

    #[must_use]
    pub fn price(&self) -> Option<Money> {
        self.product.as_ref().map(|p| p.price)
    }

    /// The compact form cached locally per user.
    #[must_use]
    pub fn to_snapshot(&self) -> Option<WishlistSnapshot> {
        Some(WishlistSnapshot {
            entry_id: Some(self.id.clone()),
            product_id: self.product_id()?.clone(),
            name: self.product_name().map(str::to_owned),
            price: self.price(),
            added_at: self.added_at,
            notes: self.notes.clone(),
        })
    }
}

/// Drop entries that point at a product already seen. First one wins.
///
/// The backend enforces one entry per product per user; this is the
/// client-side guard for when it does not.
#[must_use]
pub fn dedupe_entries(entries: Vec<WishlistEntry>) -> Vec<WishlistEntry> {
    let mut seen: HashSet<ProductId> = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| {
            entry
                .product_id()
                .is_none_or(|pid| seen.insert(pid.clone()))
        })
        .collect()
}

/// A locally cached wishlist record (stored under `wishlist_<email>`).
///
/// `entry_id` is `None` for an optimistic add the server has not
/// acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<WishlistEntryId>,
    pub product_id: ProductId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Money>,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// =============================================================================
// Wishlist page views
// =============================================================================

/// Wishlist page filter tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WishlistFilter {
    #[default]
    All,
    InStock,
    OutOfStock,
    Sale,
    /// Added within the last month.
    New,
}

/// Wishlist page ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WishlistSort {
    /// Date added, newest first.
    #[default]
    Newest,
    Oldest,
    PriceHigh,
    PriceLow,
    Name,
}

/// Wishlist page query: search, filter tab, ordering.
#[derive(Debug, Clone, Default)]
pub struct WishlistQuery {
    pub search: String,
    pub filter: WishlistFilter,
    pub sort: WishlistSort,
}

impl WishlistQuery {
    #[must_use]
    pub fn apply<'a>(&self, entries: &'a [WishlistEntry], now: DateTime<Utc>) -> Vec<&'a WishlistEntry> {
        let needle = self.search.trim().to_lowercase();
        let month_ago = now.checked_sub_months(Months::new(1)).unwrap_or(now);

        let mut rows: Vec<&WishlistEntry> = entries
            .iter()
            .filter(|e| needle.is_empty() || entry_matches(e, &needle))
            .filter(|e| {
                let product = e.product.as_ref();
                match self.filter {
                    WishlistFilter::All => true,
                    WishlistFilter::InStock => product.is_some_and(|p| p.in_stock),
                    WishlistFilter::OutOfStock => !product.is_some_and(|p| p.in_stock),
                    WishlistFilter::Sale => product.is_some_and(Product::is_discounted),
                    WishlistFilter::New => e.added_at > month_ago,
                }
            })
            .collect();

        let price = |e: &WishlistEntry| e.price().unwrap_or(Money::ZERO);
        match self.sort {
            WishlistSort::Newest => rows.sort_by(|a, b| b.added_at.cmp(&a.added_at)),
            WishlistSort::Oldest => rows.sort_by(|a, b| a.added_at.cmp(&b.added_at)),
            WishlistSort::PriceHigh => rows.sort_by(|a, b| price(b).cmp(&price(a))),
            WishlistSort::PriceLow => rows.sort_by(|a, b| price(a).cmp(&price(b))),
            WishlistSort::Name => rows.sort_by(|a, b| {
                a.product_name()
                    .unwrap_or_default()
                    .cmp(b.product_name().unwrap_or_default())
            }),
        }
        rows
    }
}

fn entry_matches(entry: &WishlistEntry, needle: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(needle);
    entry.product_name().is_some_and(contains)
        || entry
            .product
            .as_ref()
            .and_then(|p| p.category.as_deref())
            .is_some_and(contains)
        || entry.notes.as_deref().is_some_and(contains)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn entry(id: &str, product: &str, price: i64, days_ago: i64) -> WishlistEntry {
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "product": {"_id": product, "name": format!("Item {product}"), "price": price, "category": "Shoes"},
            "addedAt": Utc::now() - Duration::days(days_ago),
        }))
        .unwrap()
    }

    #[test]
    fn test_product_id_falls_back_to_bare_field() {
        let bare: WishlistEntry = serde_json::from_value(serde_json::json!({
            "_id": "w1",
            "productId": "p7",
            "addedAt": "2024-03-01T00:00:00Z",
        }))
        .unwrap();
        assert_eq!(bare.product_id().unwrap().as_str(), "p7");
        assert!(bare.to_snapshot().unwrap().name.is_none());
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let entries = vec![entry("w1", "p1", 5, 1), entry("w2", "p1", 5, 2), entry("w3", "p2", 5, 3)];
        let ids: Vec<_> = dedupe_entries(entries).into_iter().map(|e| e.id.into_inner()).collect();
        assert_eq!(ids, ["w1", "w3"]);
    }

    #[test]
    fn test_query_new_filter_and_sorts() {
        let entries = vec![entry("w1", "p1", 30, 60), entry("w2", "p2", 10, 2)];
        let now = Utc::now();

        let recent = WishlistQuery {
            filter: WishlistFilter::New,
            ..Default::default()
        };
        assert_eq!(recent.apply(&entries, now).len(), 1);

        let by_price = WishlistQuery {
            sort: WishlistSort::PriceHigh,
            ..Default::default()
        };
        assert_eq!(by_price.apply(&entries, now)[0].id.as_str(), "w1");

        let newest = WishlistQuery::default();
        assert_eq!(newest.apply(&entries, now)[0].id.as_str(), "w2");
    }

    #[test]
    fn test_query_search_notes() {
        let mut noted = entry("w1", "p1", 30, 1);
        noted.notes = Some("Birthday gift".to_owned());
        let entries = vec![noted, entry("w2", "p2", 10, 2)];
        let q = WishlistQuery {
            search: "BIRTHDAY".to_owned(),
            ..Default::default()
        };
        assert_eq!(q.apply(&entries, Utc::now()).len(), 1);
    }
}
