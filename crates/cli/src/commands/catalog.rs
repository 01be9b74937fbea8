//! Catalog commands.

use chrono::Utc;
use clap::Args;
use emporium_client::state::AppState;
use emporium_core::product::{CatalogFilter, CategoryFilter, shop_categories};
use emporium_core::{Money, Product, ProductId};
use rust_decimal::Decimal;

#[derive(Args)]
pub struct CatalogArgs {
    /// Category name, or one of "Sale", "New Arrivals", "Best Sellers"
    #[arg(short, long, default_value = "All")]
    category: String,
    /// Only products at or below this price
    #[arg(long)]
    max_price: Option<Decimal>,
    /// Hide out-of-stock products
    #[arg(long)]
    in_stock: bool,
    /// Search name, description, category and tags
    #[arg(short, long, default_value = "")]
    search: String,
    /// Ask the server for at most this many products
    #[arg(long)]
    limit: Option<u32>,
    /// Print the category list instead of products
    #[arg(long)]
    categories: bool,
}

#[derive(Args)]
pub struct ProductArgs {
    product_id: String,
}

#[allow(clippy::print_stdout)]
pub async fn list(state: &AppState, args: &CatalogArgs) -> Result<(), Box<dyn std::error::Error>> {
    let products = state.api().list_products(None, args.limit).await?;

    if args.categories {
        for category in shop_categories(&products) {
            println!("{category}");
        }
        return Ok(());
    }

    let filter = CatalogFilter {
        category: CategoryFilter::from_label(&args.category),
        max_price: args.max_price.map(Money::new),
        in_stock_only: args.in_stock,
        search: args.search.clone(),
    };
    let shown = filter.apply(&products, Utc::now());
    for product in &shown {
        print_row(product);
    }
    println!("{} of {} products", shown.len(), products.len());
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn show(state: &AppState, args: &ProductArgs) -> Result<(), Box<dyn std::error::Error>> {
    let product = state
        .api()
        .get_product(&ProductId::new(args.product_id.as_str()))
        .await?;

    println!("{}  ({})", product.name, product.id);
    println!("Price:    {}", product.price.display());
    if let Some(category) = &product.category {
        println!("Category: {category}");
    }
    println!("Stock:    {}", if product.in_stock { "in stock" } else { "out of stock" });
    if !product.sizes.is_empty() {
        println!("Sizes:    {}", product.sizes.join(", "));
    }
    if let Some(description) = &product.description {
        println!();
        println!("{description}");
    }

    let related = state.api().related_products(&product).await?;
    if !related.is_empty() {
        println!();
        println!("Related:");
        for product in &related {
            print_row(product);
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_row(product: &Product) {
    println!(
        "{:<26} {:<28} {:>10}  {}",
        product.id,
        product.name,
        product.price.display(),
        product.category.as_deref().unwrap_or("-")
    );
}
