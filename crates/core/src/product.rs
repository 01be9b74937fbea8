//! Catalog products and the storefront's product list filtering.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Money, ProductId};

/// A product as returned by the catalog endpoints.
///
/// Optional fields default so partially populated documents still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    #[serde(default)]
    pub stock: Option<u32>,
    /// Discount percentage; zero when not on sale.
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub sold: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

const fn default_in_stock() -> bool {
    true
}

impl Product {
    /// Whether the product carries a positive discount.
    #[must_use]
    pub fn is_discounted(&self) -> bool {
        self.discount.is_some_and(|d| d > 0.0)
    }

    /// `created_at`, falling back to `updated_at`, if either is known.
    #[must_use]
    pub fn listed_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.or(self.updated_at)
    }
}

/// Payload for creating or updating a product from the admin console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: rust_decimal::Decimal,
    pub category: String,
    pub image: String,
    pub description: String,
    pub stock: u32,
    pub in_stock: bool,
    pub tags: Vec<String>,
}

impl ProductInput {
    /// Split a comma separated tag field, dropping blanks.
    #[must_use]
    pub fn parse_tags(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

impl From<&Product> for ProductInput {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            price: product.price.amount(),
            category: product.category.clone().unwrap_or_default(),
            image: product.image.clone().unwrap_or_default(),
            description: product.description.clone().unwrap_or_default(),
            stock: product.stock.unwrap_or(100),
            in_stock: product.in_stock,
            tags: product.tags.clone(),
        }
    }
}

// =============================================================================
// Shop filtering
// =============================================================================

/// Category selector on the shop page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    /// Discounted or priced under $100.
    Sale,
    /// Listed within the last 30 days.
    NewArrivals,
    /// Rated 4+ or sold more than 50 units.
    BestSellers,
    Named(String),
}

impl CategoryFilter {
    pub const ALL_LABEL: &'static str = "All";
    pub const SPECIAL_LABELS: [&'static str; 3] = ["Sale", "New Arrivals", "Best Sellers"];

    /// Parse a category label as shown on the shop sidebar.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "" | "All" | "all" => Self::All,
            "Sale" => Self::Sale,
            "New Arrivals" => Self::NewArrivals,
            "Best Sellers" => Self::BestSellers,
            other => Self::Named(other.to_owned()),
        }
    }

    fn matches(&self, product: &Product, now: DateTime<Utc>) -> bool {
        match self {
            Self::All => true,
            Self::Sale => product.is_discounted() || product.price < Money::from_dollars(100),
            Self::NewArrivals => {
                // Products without any timestamp count as just listed.
                let listed = product.listed_at().unwrap_or(now);
                (now - listed).abs() <= Duration::days(30)
            }
            Self::BestSellers => {
                product.rating.is_some_and(|r| r >= 4.0) || product.sold.is_some_and(|s| s > 50)
            }
            Self::Named(name) => product.category.as_deref() == Some(name.as_str()),
        }
    }
}

/// Shop page filter state.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub category: CategoryFilter,
    pub max_price: Option<Money>,
    pub in_stock_only: bool,
    pub search: String,
}

impl CatalogFilter {
    /// Apply the filter, preserving catalog order.
    #[must_use]
    pub fn apply<'a>(&self, products: &'a [Product], now: DateTime<Utc>) -> Vec<&'a Product> {
        let needle = self.search.trim().to_lowercase();
        products
            .iter()
            .filter(|p| self.category.matches(p, now))
            .filter(|p| self.max_price.is_none_or(|max| p.price <= max))
            .filter(|p| !self.in_stock_only || p.in_stock)
            .filter(|p| needle.is_empty() || search_matches(p, &needle))
            .collect()
    }
}

fn search_matches(product: &Product, needle: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(needle);
    contains(&product.name)
        || product.description.as_deref().is_some_and(contains)
        || product.category.as_deref().is_some_and(contains)
        || product.tags.iter().any(|t| contains(t))
}

/// Sidebar categories: `All`, then real categories by descending product
/// count (ties alphabetical), then the special categories.
#[must_use]
pub fn shop_categories(products: &[Product]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for category in products.iter().filter_map(|p| p.category.as_deref()) {
        if !category.is_empty() {
            *counts.entry(category).or_default() += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    std::iter::once(CategoryFilter::ALL_LABEL)
        .chain(ranked.into_iter().map(|(name, _)| name))
        .chain(CategoryFilter::SPECIAL_LABELS)
        .map(str::to_owned)
        .collect()
}

// =============================================================================
// Admin product views
// =============================================================================

/// Admin product table ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductSort {
    #[default]
    Newest,
    Oldest,
    PriceHigh,
    PriceLow,
    NameAsc,
    NameDesc,
}

/// Stock filter in the admin product table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockFilter {
    #[default]
    All,
    InStock,
    OutOfStock,
}

/// Admin product table query.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub search: String,
    /// `None` shows every category.
    pub category: Option<String>,
    pub stock: StockFilter,
    pub sort: ProductSort,
}

impl ProductQuery {
    #[must_use]
    pub fn apply<'a>(&self, products: &'a [Product]) -> Vec<&'a Product> {
        let needle = self.search.trim().to_lowercase();
        let mut rows: Vec<&Product> = products
            .iter()
            .filter(|p| {
                needle.is_empty()
                    || p.name.to_lowercase().contains(&needle)
                    || p.category.as_deref().is_some_and(|c| c.to_lowercase().contains(&needle))
                    || p.description.as_deref().is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .filter(|p| {
                self.category
                    .as_deref()
                    .is_none_or(|c| p.category.as_deref() == Some(c))
            })
            .filter(|p| match self.stock {
                StockFilter::All => true,
                StockFilter::InStock => p.in_stock,
                StockFilter::OutOfStock => !p.in_stock,
            })
            .collect();

        match self.sort {
            ProductSort::Newest => rows.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ProductSort::Oldest => rows.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            ProductSort::PriceHigh => rows.sort_by(|a, b| b.price.cmp(&a.price)),
            ProductSort::PriceLow => rows.sort_by(|a, b| a.price.cmp(&b.price)),
            ProductSort::NameAsc => rows.sort_by(|a, b| a.name.cmp(&b.name)),
            ProductSort::NameDesc => rows.sort_by(|a, b| b.name.cmp(&a.name)),
        }
        rows
    }
}

/// Summary cards on the admin product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductStats {
    pub total: usize,
    pub in_stock: usize,
    pub out_of_stock: usize,
    pub categories: usize,
    /// Sum of unit prices (not stock-weighted).
    pub total_value: Money,
}

impl ProductStats {
    #[must_use]
    pub fn from_products(products: &[Product]) -> Self {
        let in_stock = products.iter().filter(|p| p.in_stock).count();
        let mut categories: Vec<&str> = products
            .iter()
            .filter_map(|p| p.category.as_deref())
            .filter(|c| !c.is_empty())
            .collect();
        categories.sort_unstable();
        categories.dedup();

        Self {
            total: products.len(),
            in_stock,
            out_of_stock: products.len() - in_stock,
            categories: categories.len(),
            total_value: products.iter().map(|p| p.price).sum(),
        }
    }
}
