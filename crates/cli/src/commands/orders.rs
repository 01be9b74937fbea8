//! Checkout and order history.

use chrono::Utc;
use clap::Args;
use emporium_client::CheckoutError;
use emporium_client::state::AppState;
use emporium_core::order::{OrderQuery, OrderSort};
use emporium_core::{CheckoutForm, Order, OrderStatus};

#[derive(Args)]
pub struct CheckoutArgs {
    /// Contact email (defaults to the signed-in user)
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    /// 10 to 15 digits, optional leading +
    #[arg(long)]
    phone: String,
    #[arg(long)]
    address: String,
    #[arg(long)]
    city: String,
    #[arg(long)]
    postal_code: String,
    /// Delivery notes (up to 200 characters)
    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Args)]
pub struct OrdersArgs {
    /// Only orders in this status
    #[arg(long)]
    status: Option<OrderStatus>,
    /// Search order id, names, phone or item names
    #[arg(short, long, default_value = "")]
    search: String,
}

#[allow(clippy::print_stdout)]
pub async fn checkout(state: &AppState, args: CheckoutArgs) -> Result<(), Box<dyn std::error::Error>> {
    let session = state.session();
    let mut form = CheckoutForm::prefilled(
        session.as_ref().map(|s| s.email()),
        session.as_ref().and_then(|s| s.profile.display_name.as_deref()),
    );
    if let Some(email) = args.email {
        form.email = email;
    }
    if let Some(first_name) = args.first_name {
        form.first_name = first_name;
    }
    if let Some(last_name) = args.last_name {
        form.last_name = last_name;
    }
    form.phone = args.phone;
    form.address = args.address;
    form.city = args.city;
    form.postal_code = args.postal_code;
    form.notes = args.notes;

    match state.cart().checkout(state.api(), &form).await {
        Ok(order) => {
            println!("Order {} placed. Total {}", order.id, order.amount().display());
            Ok(())
        }
        Err(CheckoutError::Invalid(errors)) => {
            for error in &errors.0 {
                println!("{}: {}", error.field, error.message);
            }
            Err(CheckoutError::Invalid(errors).into())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn list(state: &AppState, args: &OrdersArgs) -> Result<(), Box<dyn std::error::Error>> {
    let orders = state.api().my_orders().await?;
    let query = OrderQuery {
        search: args.search.clone(),
        status: args.status,
        sort: OrderSort::Newest,
        ..OrderQuery::default()
    };
    print_orders(&query.apply(&orders, Utc::now()));
    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn print_orders(orders: &[&Order]) {
    if orders.is_empty() {
        println!("No orders.");
        return;
    }
    for order in orders {
        let items: u32 = order.items.iter().map(|i| i.quantity).sum();
        println!(
            "{:<26} {}  {:<11} {:>3} items {:>10}  {}",
            order.id,
            order.created_at.format("%Y-%m-%d"),
            order.status.label(),
            items,
            order.amount().display(),
            order.user_email.as_deref().unwrap_or("-")
        );
    }
}
