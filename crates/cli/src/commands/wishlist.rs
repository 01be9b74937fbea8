//! Wishlist commands.
//!
//! Every command signs in first, which refreshes the local copy from the
//! server. `watch` keeps polling and prints each change until Ctrl-C.

use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use emporium_client::events::StoreEvent;
use emporium_client::state::AppState;
use emporium_client::wishlist::Toggled;
use emporium_core::wishlist::{WishlistFilter, WishlistQuery, WishlistSort};
use emporium_core::{ProductId, WishlistEntryId};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, ValueEnum)]
pub enum FilterArg {
    All,
    InStock,
    OutOfStock,
    Sale,
    New,
}

impl From<FilterArg> for WishlistFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => Self::All,
            FilterArg::InStock => Self::InStock,
            FilterArg::OutOfStock => Self::OutOfStock,
            FilterArg::Sale => Self::Sale,
            FilterArg::New => Self::New,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SortArg {
    Newest,
    Oldest,
    PriceHigh,
    PriceLow,
    Name,
}

impl From<SortArg> for WishlistSort {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Newest => Self::Newest,
            SortArg::Oldest => Self::Oldest,
            SortArg::PriceHigh => Self::PriceHigh,
            SortArg::PriceLow => Self::PriceLow,
            SortArg::Name => Self::Name,
        }
    }
}

#[derive(Subcommand)]
pub enum WishlistAction {
    /// Show wishlist entries
    List {
        #[arg(short, long, default_value = "")]
        search: String,
        #[arg(short, long, value_enum, default_value = "all")]
        filter: FilterArg,
        #[arg(long, value_enum, default_value = "newest")]
        sort: SortArg,
    },
    /// Add a product
    Add {
        product_id: String,
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Remove a product
    Remove { product_id: String },
    /// Remove several entries by entry id
    RemoveMany {
        #[arg(required = true)]
        entry_ids: Vec<String>,
    },
    /// Replace the notes on an entry
    Note { product_id: String, notes: String },
    /// Add the product if absent, remove it if present
    Toggle { product_id: String },
    /// Print the number of saved items
    Count,
    /// Keep the wishlist in sync and print changes until Ctrl-C
    Watch,
}

#[allow(clippy::print_stdout)]
pub async fn run(state: &AppState, action: WishlistAction) -> Result<(), Box<dyn std::error::Error>> {
    let wishlist = state.wishlist();
    match action {
        WishlistAction::List { search, filter, sort } => {
            let query = WishlistQuery {
                search,
                filter: filter.into(),
                sort: sort.into(),
            };
            let entries = wishlist.entries();
            if entries.is_empty() && wishlist.count() > 0 {
                // Server unreachable: show the saved copy unfiltered.
                for item in wishlist.items() {
                    println!(
                        "{:<26} {:<28} {:>10}  {}",
                        item.product_id,
                        item.name.as_deref().unwrap_or("-"),
                        item.price.map_or_else(|| "-".to_string(), |p| p.display()),
                        item.added_at.format("%Y-%m-%d")
                    );
                }
                return Ok(());
            }
            let shown = query.apply(&entries, Utc::now());
            for entry in &shown {
                println!(
                    "{:<26} {:<28} {:>10}  {}  {}",
                    entry.id,
                    entry.product_name().unwrap_or("(unavailable)"),
                    entry.price().map_or_else(|| "-".to_string(), |p| p.display()),
                    entry.added_at.format("%Y-%m-%d"),
                    entry.notes.as_deref().unwrap_or("")
                );
            }
            println!("{} of {} items", shown.len(), entries.len());
        }
        WishlistAction::Add { product_id, notes } => {
            let product = state.api().get_product(&ProductId::new(product_id)).await?;
            wishlist.add(&product, notes.as_deref()).await?;
            println!("Added {} to your wishlist", product.name);
        }
        WishlistAction::Remove { product_id } => {
            wishlist.remove(&ProductId::new(product_id)).await?;
            println!("Removed from your wishlist");
        }
        WishlistAction::RemoveMany { entry_ids } => {
            let ids: Vec<WishlistEntryId> = entry_ids.into_iter().map(WishlistEntryId::new).collect();
            let report = wishlist.remove_many(&ids).await?;
            println!("Removed {}, failed {}", report.removed.len(), report.failed.len());
        }
        WishlistAction::Note { product_id, notes } => {
            wishlist.update_note(&ProductId::new(product_id), &notes).await?;
            println!("Note saved");
        }
        WishlistAction::Toggle { product_id } => {
            let product = state.api().get_product(&ProductId::new(product_id)).await?;
            match wishlist.toggle(&product).await? {
                Toggled::Added => println!("Added {} to your wishlist", product.name),
                Toggled::Removed => println!("Removed {} from your wishlist", product.name),
            }
        }
        WishlistAction::Count => {
            println!("{}", state.bridge().wishlist_count(wishlist.user().as_ref()));
        }
        WishlistAction::Watch => watch(state).await?,
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn watch(state: &AppState) -> Result<(), std::io::Error> {
    let bridge = state.bridge().clone();
    let counter = bridge.clone();
    let _changes = bridge.subscribe(move |event| {
        if let StoreEvent::WishlistChanged { user } = event {
            println!("{user}: {} item(s)", counter.wishlist_count(Some(user)));
        }
    });

    let cancel = CancellationToken::new();
    let poller = state
        .wishlist()
        .spawn_poller(state.config().wishlist_poll_interval, cancel.clone());
    tracing::info!(
        interval_secs = state.config().wishlist_poll_interval.as_secs(),
        "Watching wishlist; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    if let Err(e) = poller.await {
        tracing::warn!(error = %e, "Wishlist poller ended abnormally");
    }
    Ok(())
}
