//! REST client for the store backend.
//!
//! # Architecture
//!
//! - `reqwest` with JSON bodies; every endpoint lives under `<base>/api/`
//! - Bearer token on every request once a session is set
//! - Catalog reads cached in memory via `moka` (5 minute TTL)
//! - The backend is the source of truth; local state only mirrors it
//!
//! The wishlist and order operations the state layer depends on are also
//! exposed through the [`WishlistApi`] and [`OrderApi`] traits so the cart
//! and wishlist mirror can be driven by a fake backend in tests.

mod cache;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use emporium_core::order::NewOrder;
use emporium_core::user::{ManagedUser, UserSync, UserSyncResponse};
use emporium_core::{
    Order, OrderId, OrderStats, OrderStatus, Product, ProductId, ProductInput, UserRole, UserId,
    WishlistEntry, WishlistEntryId,
};
use moka::future::Cache;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::ClientConfig;

use cache::{CacheKey, CacheValue};

/// Errors that can occur when talking to the store backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing or rejected bearer token.
    #[error("Authentication required")]
    Unauthorized,

    /// Authenticated but not allowed (e.g. non-admin on admin endpoints).
    #[error("Admin access required")]
    Forbidden,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
}

/// Response of `GET /wishlist/check/{productId}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistCheck {
    pub exists: bool,
    #[serde(default)]
    pub wishlist_id: Option<WishlistEntryId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewWishlistEntry<'a> {
    product_id: &'a ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct NotesUpdate<'a> {
    notes: &'a str,
}

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: OrderStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StockUpdate {
    in_stock: bool,
}

#[derive(Debug, Serialize)]
struct RoleUpdate {
    role: UserRole,
}

/// Error body shape used by the backend.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// =============================================================================
// Seams used by the state layer
// =============================================================================

/// Remote wishlist operations for the signed-in user.
#[async_trait]
pub trait WishlistApi: Send + Sync {
    async fn list_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError>;
    async fn check_wishlist(&self, product_id: &ProductId) -> Result<WishlistCheck, ApiError>;
    async fn add_to_wishlist(
        &self,
        product_id: &ProductId,
        notes: Option<&str>,
    ) -> Result<WishlistEntry, ApiError>;
    async fn update_wishlist_notes(&self, id: &WishlistEntryId, notes: &str) -> Result<(), ApiError>;
    async fn remove_from_wishlist(&self, id: &WishlistEntryId) -> Result<(), ApiError>;
}

/// Order submission.
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, ApiError>;
}

#[async_trait]
impl<T: WishlistApi + ?Sized> WishlistApi for Arc<T> {
    async fn list_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError> {
        (**self).list_wishlist().await
    }

    async fn check_wishlist(&self, product_id: &ProductId) -> Result<WishlistCheck, ApiError> {
        (**self).check_wishlist(product_id).await
    }

    async fn add_to_wishlist(
        &self,
        product_id: &ProductId,
        notes: Option<&str>,
    ) -> Result<WishlistEntry, ApiError> {
        (**self).add_to_wishlist(product_id, notes).await
    }

    async fn update_wishlist_notes(&self, id: &WishlistEntryId, notes: &str) -> Result<(), ApiError> {
        (**self).update_wishlist_notes(id, notes).await
    }

    async fn remove_from_wishlist(&self, id: &WishlistEntryId) -> Result<(), ApiError> {
        (**self).remove_from_wishlist(id).await
    }
}

#[async_trait]
impl<T: OrderApi + ?Sized> OrderApi for Arc<T> {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, ApiError> {
        (**self).create_order(order).await
    }
}

// =============================================================================
// StoreClient
// =============================================================================

/// Client for the store backend REST API.
#[derive(Clone)]
pub struct StoreClient {
    inner: Arc<StoreClientInner>,
}

struct StoreClientInner {
    client: reqwest::Client,
    config: ClientConfig,
    token: RwLock<Option<SecretString>>,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("base_url", &self.inner.config.api_base_url.as_str())
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl StoreClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Ok(Self {
            inner: Arc::new(StoreClientInner {
                client,
                token: RwLock::new(config.api_token.clone()),
                config: config.clone(),
                cache,
            }),
        })
    }

    /// Replace the bearer token (sign-in, token refresh) or clear it.
    pub fn set_token(&self, token: Option<SecretString>) {
        *self.inner.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .inner
            .client
            .request(method, self.inner.config.endpoint(path));
        let token = self
            .inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.expose_secret().to_string());
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and return the body of a successful response.
    async fn execute(&self, request: RequestBuilder, what: &str) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        tracing::warn!(
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "Store API returned non-success status"
        );
        Err(match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::FORBIDDEN => ApiError::Forbidden,
            StatusCode::NOT_FOUND => ApiError::NotFound(what.to_string()),
            _ => ApiError::Status {
                status: status.as_u16(),
                message: serde_json::from_str::<ErrorBody>(&body)
                    .ok()
                    .and_then(|b| b.message)
                    .unwrap_or_else(|| body.chars().take(200).collect()),
            },
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, ApiError> {
        let body = self.execute(request, what).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse store API response"
            );
            ApiError::Parse(e)
        })
    }

    /// Fetch a list; a body that is not a JSON array counts as empty.
    async fn fetch_list<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<Vec<T>, ApiError> {
        match self.fetch::<serde_json::Value>(request, what).await? {
            value @ serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
            other => {
                tracing::warn!(what, kind = %json_kind(&other), "Expected a list; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    // =========================================================================
    // Product Methods
    // =========================================================================

    /// List products, optionally by category and/or limited in count.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        category: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Product>, ApiError> {
        let cache_key = CacheKey::Products {
            category: category.map(str::to_owned),
            limit,
        };
        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(category) = category {
            query.push(("category", category.to_owned()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        let products: Vec<Product> = self
            .fetch_list(self.request(Method::GET, "products").query(&query), "products")
            .await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    /// Get a single product.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the product does not exist, or another
    /// error if the request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: &ProductId) -> Result<Product, ApiError> {
        let cache_key = CacheKey::Product(id.clone());
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self
            .fetch(
                self.request(Method::GET, &format!("products/{id}")),
                &format!("product {id}"),
            )
            .await?;
        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// Products in the same category, excluding `product` itself (up to 4).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn related_products(&self, product: &Product) -> Result<Vec<Product>, ApiError> {
        let Some(category) = product.category.as_deref() else {
            return Ok(Vec::new());
        };
        let mut related = self.list_products(Some(category), None).await?;
        related.retain(|p| p.id != product.id);
        related.truncate(4);
        Ok(related)
    }

    /// Create a product (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: &ProductInput) -> Result<Product, ApiError> {
        let product = self
            .fetch(self.request(Method::POST, "products").json(input), "products")
            .await?;
        self.inner.cache.invalidate_all();
        Ok(product)
    }

    /// Update a product (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip(self, input), fields(product_id = %id))]
    pub async fn update_product(&self, id: &ProductId, input: &ProductInput) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::PUT, &format!("products/{id}")).json(input),
            &format!("product {id}"),
        )
        .await?;
        self.inner.cache.invalidate_all();
        Ok(())
    }

    /// Flip a product's stock flag (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn set_product_stock(&self, id: &ProductId, in_stock: bool) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::PUT, &format!("products/{id}"))
                .json(&StockUpdate { in_stock }),
            &format!("product {id}"),
        )
        .await?;
        self.inner.cache.invalidate_all();
        Ok(())
    }

    /// Delete a product (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_product(&self, id: &ProductId) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::DELETE, &format!("products/{id}")),
            &format!("product {id}"),
        )
        .await?;
        self.inner.cache.invalidate_all();
        Ok(())
    }

    // =========================================================================
    // Order Methods
    // =========================================================================

    /// Orders placed by the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn my_orders(&self) -> Result<Vec<Order>, ApiError> {
        self.fetch_list(self.request(Method::GET, "orders/my"), "orders")
            .await
    }

    /// Every order (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn all_orders(&self) -> Result<Vec<Order>, ApiError> {
        self.fetch_list(self.request(Method::GET, "orders"), "orders")
            .await
    }

    /// Dashboard statistics (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn order_stats(&self) -> Result<OrderStats, ApiError> {
        self.fetch(self.request(Method::GET, "orders/stats"), "order stats")
            .await
    }

    /// Move an order to a new status (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip(self), fields(order_id = %id, status = %status))]
    pub async fn update_order_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::PUT, &format!("orders/{id}"))
                .json(&StatusUpdate { status }),
            &format!("order {id}"),
        )
        .await
        .map(drop)
    }

    /// Delete an order (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn delete_order(&self, id: &OrderId) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::DELETE, &format!("orders/{id}")),
            &format!("order {id}"),
        )
        .await
        .map(drop)
    }

    // =========================================================================
    // User Methods
    // =========================================================================

    /// Register or refresh the signed-in user and learn their role.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn sync_user(&self, email: &str, name: &str) -> Result<UserRole, ApiError> {
        let response: UserSyncResponse = self
            .fetch(
                self.request(Method::POST, "users/sync")
                    .json(&UserSync { email, name }),
                "user sync",
            )
            .await?;
        Ok(response.role)
    }

    /// Every registered user (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<ManagedUser>, ApiError> {
        self.fetch_list(self.request(Method::GET, "users"), "users")
            .await
    }

    /// Change a user's role (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip(self), fields(user_id = %id, role = %role))]
    pub async fn update_user_role(&self, id: &UserId, role: UserRole) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::PUT, &format!("users/{id}/role"))
                .json(&RoleUpdate { role }),
            &format!("user {id}"),
        )
        .await
        .map(drop)
    }
}

#[async_trait]
impl WishlistApi for StoreClient {
    #[instrument(skip(self))]
    async fn list_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError> {
        self.fetch_list(self.request(Method::GET, "wishlist"), "wishlist")
            .await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn check_wishlist(&self, product_id: &ProductId) -> Result<WishlistCheck, ApiError> {
        self.fetch(
            self.request(Method::GET, &format!("wishlist/check/{product_id}")),
            "wishlist check",
        )
        .await
    }

    #[instrument(skip(self, notes), fields(product_id = %product_id))]
    async fn add_to_wishlist(
        &self,
        product_id: &ProductId,
        notes: Option<&str>,
    ) -> Result<WishlistEntry, ApiError> {
        self.fetch(
            self.request(Method::POST, "wishlist")
                .json(&NewWishlistEntry { product_id, notes }),
            "wishlist",
        )
        .await
    }

    #[instrument(skip(self, notes), fields(entry_id = %id))]
    async fn update_wishlist_notes(&self, id: &WishlistEntryId, notes: &str) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::PUT, &format!("wishlist/{id}"))
                .json(&NotesUpdate { notes }),
            &format!("wishlist entry {id}"),
        )
        .await
        .map(drop)
    }

    #[instrument(skip(self), fields(entry_id = %id))]
    async fn remove_from_wishlist(&self, id: &WishlistEntryId) -> Result<(), ApiError> {
        self.execute(
            self.request(Method::DELETE, &format!("wishlist/{id}")),
            &format!("wishlist entry {id}"),
        )
        .await
        .map(drop)
    }
}

#[async_trait]
impl OrderApi for StoreClient {
    #[instrument(skip(self, order), fields(items = order.items.len()))]
    async fn create_order(&self, order: &NewOrder) -> Result<Order, ApiError> {
        self.fetch(self.request(Method::POST, "orders").json(order), "orders")
            .await
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        assert_eq!(ApiError::NotFound("product p1".to_string()).to_string(), "Not found: product p1");
        assert_eq!(ApiError::RateLimited(60).to_string(), "Rate limited, retry after 60 seconds");
        let err = ApiError::Status {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }

    #[test]
    fn test_wishlist_check_deserialize() {
        let check: WishlistCheck = serde_json::from_str(r#"{"exists":true,"wishlistId":"w1"}"#).unwrap();
        assert!(check.exists);
        assert_eq!(check.wishlist_id.unwrap().as_str(), "w1");

        let check: WishlistCheck = serde_json::from_str(r#"{"exists":false}"#).unwrap();
        assert!(check.wishlist_id.is_none());
    }

    #[test]
    fn test_new_entry_body_omits_empty_notes() {
        let pid = ProductId::new("p1");
        let body = serde_json::to_value(NewWishlistEntry {
            product_id: &pid,
            notes: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"productId": "p1"}));
    }

    #[test]
    fn test_client_tracks_token() {
        let config = ClientConfig::new("http://localhost:5000").unwrap();
        let client = StoreClient::new(&config).unwrap();
        assert!(!client.is_authenticated());
        client.set_token(Some(SecretString::from("tok")));
        assert!(client.is_authenticated());
        client.set_token(None);
        assert!(!client.is_authenticated());
    }

    #[test]
    fn test_status_update_body() {
        let body = serde_json::to_value(StatusUpdate {
            status: OrderStatus::Shipped,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"status": "shipped"}));
    }
}
