//! Admin console operations.
//!
//! Thin orchestration over [`StoreClient`]: every write is followed by the
//! reload the dashboard needs, and statistics degrade to defaults rather
//! than failing the whole view.

use emporium_core::user::ManagedUser;
use emporium_core::{
    Order, OrderId, OrderStats, OrderStatus, Product, ProductId, ProductInput, UserId, UserRole,
};
use thiserror::Error;
use tracing::instrument;

use crate::api::{ApiError, StoreClient};
use crate::session::Session;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Admin access required")]
    NotAdmin,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Orders and statistics as shown on the dashboard.
#[derive(Debug, Clone, Default)]
pub struct OrderBoard {
    pub orders: Vec<Order>,
    pub stats: OrderStats,
}

/// Admin operations for a signed-in administrator.
#[derive(Debug, Clone)]
pub struct AdminConsole {
    client: StoreClient,
}

impl AdminConsole {
    /// Open the console for `session`.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotAdmin` unless the session has the admin role.
    pub fn open(client: StoreClient, session: &Session) -> Result<Self, AdminError> {
        if !session.is_admin() {
            tracing::warn!(email = %session.email(), "Non-admin tried to open the admin console");
            return Err(AdminError::NotAdmin);
        }
        Ok(Self { client })
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn products(&self) -> Result<Vec<Product>, AdminError> {
        Ok(self.client.list_products(None, None).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip_all, fields(name = %input.name))]
    pub async fn create_product(&self, input: &ProductInput) -> Result<Product, AdminError> {
        let product = self.client.create_product(input).await?;
        tracing::info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip(self, input))]
    pub async fn update_product(&self, id: &ProductId, input: &ProductInput) -> Result<(), AdminError> {
        self.client.update_product(id, input).await?;
        tracing::info!("Product updated");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: &ProductId) -> Result<(), AdminError> {
        self.client.delete_product(id).await?;
        tracing::info!("Product deleted");
        Ok(())
    }

    /// Flip `product`'s stock flag and return the new value.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip_all, fields(product_id = %product.id))]
    pub async fn toggle_stock(&self, product: &Product) -> Result<bool, AdminError> {
        let in_stock = !product.in_stock;
        self.client.set_product_stock(&product.id, in_stock).await?;
        tracing::info!(in_stock, "Stock status changed");
        Ok(in_stock)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Statistics, or defaults when they cannot be fetched.
    pub async fn stats(&self) -> OrderStats {
        self.client.order_stats().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Order stats unavailable; showing defaults");
            OrderStats::default()
        })
    }

    /// All orders plus statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the orders cannot be fetched.
    pub async fn order_board(&self) -> Result<OrderBoard, AdminError> {
        let orders = self.client.all_orders().await?;
        let stats = self.stats().await;
        Ok(OrderBoard { orders, stats })
    }

    /// Move an order to `status`, then reload the board.
    ///
    /// # Errors
    ///
    /// Returns an error if the update or the reload fails.
    #[instrument(skip(self))]
    pub async fn update_order_status(&self, id: &OrderId, status: OrderStatus) -> Result<OrderBoard, AdminError> {
        self.client.update_order_status(id, status).await?;
        tracing::info!("Order status updated");
        self.order_board().await
    }

    /// Delete an order, then reload the board.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete or the reload fails.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, id: &OrderId) -> Result<OrderBoard, AdminError> {
        self.client.delete_order(id).await?;
        tracing::info!("Order deleted");
        self.order_board().await
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn users(&self) -> Result<Vec<ManagedUser>, AdminError> {
        Ok(self.client.list_users().await?)
    }

    /// # Errors
    ///
    /// Returns an error if the request is rejected or fails.
    #[instrument(skip(self))]
    pub async fn set_role(&self, id: &UserId, role: UserRole) -> Result<(), AdminError> {
        self.client.update_user_role(id, role).await?;
        tracing::info!("User role updated");
        Ok(())
    }
}
