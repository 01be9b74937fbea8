//! Cart commands.
//!
//! ```bash
//! emporium cart add <product-id> [--size L]
//! emporium cart set <product-id> <quantity> [--size L]
//! emporium cart remove <product-id> [--size L]
//! emporium cart list
//! emporium cart clear
//! ```

use clap::Subcommand;
use emporium_client::state::AppState;
use emporium_core::{ProductId, Size};

use super::CommandError;

#[derive(Subcommand)]
pub enum CartAction {
    /// Show cart lines and totals
    List,
    /// Add one unit of a product
    Add {
        product_id: String,
        /// Size (defaults to M)
        #[arg(short, long)]
        size: Option<String>,
    },
    /// Set a line's quantity (0 removes it)
    Set {
        product_id: String,
        quantity: i64,
        #[arg(short, long)]
        size: Option<String>,
    },
    /// Remove a line
    Remove {
        product_id: String,
        #[arg(short, long)]
        size: Option<String>,
    },
    /// Empty the cart
    Clear,
}

fn parse_size(raw: Option<&str>) -> Result<Size, CommandError> {
    raw.map_or_else(
        || Ok(Size::default()),
        |s| {
            Size::parse(s).map_err(|e| CommandError::InvalidArgument {
                field: "size",
                message: e.to_string(),
            })
        },
    )
}

pub async fn run(state: &AppState, action: CartAction) -> Result<(), Box<dyn std::error::Error>> {
    let cart = state.cart();
    match action {
        CartAction::List => {}
        CartAction::Add { product_id, size } => {
            let size = parse_size(size.as_deref())?;
            let product = state.api().get_product(&ProductId::new(product_id)).await?;
            cart.add_item(&product, Some(size));
            tracing::info!(product = %product.name, "Added to cart");
        }
        CartAction::Set {
            product_id,
            quantity,
            size,
        } => {
            let size = parse_size(size.as_deref())?;
            cart.update_quantity(&ProductId::new(product_id), &size, quantity);
        }
        CartAction::Remove { product_id, size } => {
            let size = parse_size(size.as_deref())?;
            cart.remove_item(&ProductId::new(product_id), &size);
        }
        CartAction::Clear => cart.clear(),
    }
    print_cart(state);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cart(state: &AppState) {
    let cart = state.cart();
    let items = cart.items();
    if items.is_empty() {
        println!("Your cart is empty.");
        return;
    }
    for item in &items {
        println!(
            "{:<24} {:>4} x {:>10}  size {:<4} {:>10}",
            item.name,
            item.quantity,
            item.price.display(),
            item.size,
            item.line_total().display()
        );
    }
    let totals = cart.totals();
    println!();
    println!("Items:    {}", cart.item_count());
    println!("Subtotal: {}", totals.subtotal.display());
    println!("Shipping: {}", totals.shipping.display());
    println!("Tax:      {}", totals.tax.display());
    println!("Total:    {}", totals.grand_total.display());
}
