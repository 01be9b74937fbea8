//! Admin console commands.
//!
//! # Usage
//!
//! ```bash
//! # Catalog
//! emporium admin products --stock out-of-stock --sort price-high
//! emporium admin product-create --name "Linen Shirt" --price 49.90 --category Shirts --tags "linen, summer"
//! emporium admin stock <product-id>
//!
//! # Orders
//! emporium admin orders --window week --status pending
//! emporium admin order-status <order-id> shipped
//!
//! # Users
//! emporium admin users --activity inactive
//! emporium admin set-role <user-id> admin
//! ```
//!
//! The signed-in user must have the admin role.

use chrono::Utc;
use clap::{Args, Subcommand, ValueEnum};
use emporium_client::state::AppState;
use emporium_core::order::{DateWindow, OrderQuery, OrderSort};
use emporium_core::product::{ProductQuery, ProductSort, ProductStats, StockFilter};
use emporium_core::user::{ActivityFilter, UserQuery, UserStats};
use emporium_core::{OrderId, OrderStats, OrderStatus, ProductId, ProductInput, UserId, UserRole};
use rust_decimal::Decimal;

use super::CommandError;
use super::orders::print_orders;

#[derive(Clone, Copy, ValueEnum)]
pub enum ProductSortArg {
    Newest,
    Oldest,
    PriceHigh,
    PriceLow,
    NameAsc,
    NameDesc,
}

impl From<ProductSortArg> for ProductSort {
    fn from(arg: ProductSortArg) -> Self {
        match arg {
            ProductSortArg::Newest => Self::Newest,
            ProductSortArg::Oldest => Self::Oldest,
            ProductSortArg::PriceHigh => Self::PriceHigh,
            ProductSortArg::PriceLow => Self::PriceLow,
            ProductSortArg::NameAsc => Self::NameAsc,
            ProductSortArg::NameDesc => Self::NameDesc,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StockArg {
    All,
    InStock,
    OutOfStock,
}

impl From<StockArg> for StockFilter {
    fn from(arg: StockArg) -> Self {
        match arg {
            StockArg::All => Self::All,
            StockArg::InStock => Self::InStock,
            StockArg::OutOfStock => Self::OutOfStock,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum WindowArg {
    All,
    Today,
    Week,
    Month,
    Year,
}

impl From<WindowArg> for DateWindow {
    fn from(arg: WindowArg) -> Self {
        match arg {
            WindowArg::All => Self::All,
            WindowArg::Today => Self::Today,
            WindowArg::Week => Self::Week,
            WindowArg::Month => Self::Month,
            WindowArg::Year => Self::Year,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OrderSortArg {
    Newest,
    Oldest,
    TotalHigh,
    TotalLow,
}

impl From<OrderSortArg> for OrderSort {
    fn from(arg: OrderSortArg) -> Self {
        match arg {
            OrderSortArg::Newest => Self::Newest,
            OrderSortArg::Oldest => Self::Oldest,
            OrderSortArg::TotalHigh => Self::TotalHigh,
            OrderSortArg::TotalLow => Self::TotalLow,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ActivityArg {
    All,
    Active,
    Inactive,
}

impl From<ActivityArg> for ActivityFilter {
    fn from(arg: ActivityArg) -> Self {
        match arg {
            ActivityArg::All => Self::All,
            ActivityArg::Active => Self::Active,
            ActivityArg::Inactive => Self::Inactive,
        }
    }
}

/// Fields of a product form.
#[derive(Args)]
pub struct ProductForm {
    #[arg(long)]
    name: String,
    #[arg(long)]
    price: Decimal,
    #[arg(long, default_value = "")]
    category: String,
    #[arg(long, default_value = "")]
    image: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value_t = 100)]
    stock: u32,
    /// Mark the product out of stock
    #[arg(long)]
    out_of_stock: bool,
    /// Comma-separated tags
    #[arg(long, default_value = "")]
    tags: String,
}

impl ProductForm {
    fn into_input(self) -> Result<ProductInput, CommandError> {
        if self.name.trim().is_empty() {
            return Err(CommandError::InvalidArgument {
                field: "name",
                message: "must not be blank".to_string(),
            });
        }
        if self.price <= Decimal::ZERO {
            return Err(CommandError::InvalidArgument {
                field: "price",
                message: "must be positive".to_string(),
            });
        }
        Ok(ProductInput {
            name: self.name.trim().to_string(),
            price: self.price,
            category: self.category,
            image: self.image,
            description: self.description,
            stock: self.stock,
            in_stock: !self.out_of_stock,
            tags: ProductInput::parse_tags(&self.tags),
        })
    }
}

#[derive(Subcommand)]
pub enum AdminAction {
    /// List products with stats
    Products {
        #[arg(short, long, default_value = "")]
        search: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_enum, default_value = "all")]
        stock: StockArg,
        #[arg(long, value_enum, default_value = "newest")]
        sort: ProductSortArg,
    },
    /// Create a product
    ProductCreate(ProductForm),
    /// Replace a product's fields
    ProductUpdate {
        product_id: String,
        #[command(flatten)]
        form: ProductForm,
    },
    /// Delete a product
    ProductDelete { product_id: String },
    /// Flip a product between in stock and out of stock
    Stock { product_id: String },
    /// List orders with dashboard stats
    Orders {
        #[arg(short, long, default_value = "")]
        search: String,
        #[arg(long)]
        status: Option<OrderStatus>,
        #[arg(long, value_enum, default_value = "all")]
        window: WindowArg,
        #[arg(long, value_enum, default_value = "newest")]
        sort: OrderSortArg,
        /// Only the N most relevant rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Move an order to a new status
    OrderStatus { order_id: String, status: OrderStatus },
    /// Delete an order
    OrderDelete { order_id: String },
    /// Print dashboard statistics
    Stats,
    /// List users
    Users {
        #[arg(short, long, default_value = "")]
        search: String,
        #[arg(long)]
        role: Option<UserRole>,
        #[arg(long, value_enum, default_value = "all")]
        activity: ActivityArg,
    },
    /// Change a user's role
    SetRole { user_id: String, role: UserRole },
}

#[allow(clippy::print_stdout, clippy::too_many_lines)]
pub async fn run(state: &AppState, action: AdminAction) -> Result<(), Box<dyn std::error::Error>> {
    let admin = state.admin()?;
    let now = Utc::now();

    match action {
        AdminAction::Products {
            search,
            category,
            stock,
            sort,
        } => {
            let products = admin.products().await?;
            let query = ProductQuery {
                search,
                category,
                stock: stock.into(),
                sort: sort.into(),
            };
            for product in query.apply(&products) {
                println!(
                    "{:<26} {:<28} {:>10}  {:<12} {}",
                    product.id,
                    product.name,
                    product.price.display(),
                    product.category.as_deref().unwrap_or("-"),
                    if product.in_stock { "in stock" } else { "OUT" }
                );
            }
            let stats = ProductStats::from_products(&products);
            println!(
                "{} products, {} in stock, {} out of stock, {} categories, value {}",
                stats.total,
                stats.in_stock,
                stats.out_of_stock,
                stats.categories,
                stats.total_value.display()
            );
        }
        AdminAction::ProductCreate(form) => {
            let product = admin.create_product(&form.into_input()?).await?;
            println!("Created {} ({})", product.name, product.id);
        }
        AdminAction::ProductUpdate { product_id, form } => {
            admin
                .update_product(&ProductId::new(product_id), &form.into_input()?)
                .await?;
            println!("Product updated");
        }
        AdminAction::ProductDelete { product_id } => {
            admin.delete_product(&ProductId::new(product_id)).await?;
            println!("Product deleted");
        }
        AdminAction::Stock { product_id } => {
            let product = state.api().get_product(&ProductId::new(product_id)).await?;
            let in_stock = admin.toggle_stock(&product).await?;
            println!(
                "{} is now {}",
                product.name,
                if in_stock { "in stock" } else { "out of stock" }
            );
        }
        AdminAction::Orders {
            search,
            status,
            window,
            sort,
            limit,
        } => {
            let board = admin.order_board().await?;
            let query = OrderQuery {
                search,
                status,
                window: window.into(),
                sort: sort.into(),
                limit,
            };
            print_orders(&query.apply(&board.orders, now));
            print_stats(&board.stats);
        }
        AdminAction::OrderStatus { order_id, status } => {
            let board = admin
                .update_order_status(&OrderId::new(order_id), status)
                .await?;
            println!("Order moved to {}", status.label());
            print_stats(&board.stats);
        }
        AdminAction::OrderDelete { order_id } => {
            let board = admin.delete_order(&OrderId::new(order_id)).await?;
            println!("Order deleted; {} remaining", board.orders.len());
        }
        AdminAction::Stats => print_stats(&admin.stats().await),
        AdminAction::Users {
            search,
            role,
            activity,
        } => {
            let users = admin.users().await?;
            let query = UserQuery {
                search,
                role,
                activity: activity.into(),
            };
            for user in query.apply(&users, now) {
                println!(
                    "{:<26} {:<32} {:<6} {:>4} orders {:>10}  {}",
                    user.id,
                    user.email,
                    user.role,
                    user.orders,
                    user.total_spent.display(),
                    if user.is_active(now) { "active" } else { "inactive" }
                );
            }
            let stats = UserStats::from_users(&users, now);
            println!(
                "{} users ({} admins), {} active, revenue {}",
                stats.total,
                stats.admins,
                stats.active,
                stats.total_revenue.display()
            );
        }
        AdminAction::SetRole { user_id, role } => {
            admin.set_role(&UserId::new(user_id), role).await?;
            println!("Role set to {role}");
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_stats(stats: &OrderStats) {
    println!(
        "{} orders, revenue {}",
        stats.total_orders,
        stats.total_revenue.display()
    );
    for row in &stats.orders_by_status {
        println!("  {:<11} {}", row.status.label(), row.count);
    }
}
