//! Emporium CLI - Storefront client from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog
//! emporium products --category "Best Sellers" --max-price 80
//!
//! # Cart
//! emporium cart add 65f1c0 --size L
//! emporium cart list
//!
//! # Place the order (cash on delivery)
//! emporium checkout --phone +15551234567 --address "1 Main St" --city Springfield --postal-code 12345
//!
//! # Wishlist (needs EMPORIUM_USER_EMAIL and EMPORIUM_API_TOKEN)
//! emporium wishlist toggle 65f1c0
//! emporium wishlist watch
//!
//! # Admin console
//! emporium admin orders --status pending
//! emporium admin order-status 66a0b1 shipped
//! ```
//!
//! Configuration is read from the environment (and `.env`); see
//! [`emporium_client::config`].

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use emporium_client::config::ClientConfig;
use emporium_client::state::AppState;
use emporium_client::wishlist::FailurePolicy;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::admin::AdminAction;
use commands::cart::CartAction;
use commands::catalog::{CatalogArgs, ProductArgs};
use commands::orders::{CheckoutArgs, OrdersArgs};
use commands::wishlist::WishlistAction;

#[derive(Parser)]
#[command(name = "emporium")]
#[command(author, version, about = "Emporium storefront client")]
struct Cli {
    /// Keep optimistic wishlist changes when the server rejects them
    /// (they are replaced on the next refresh) instead of rolling back.
    #[arg(long, global = true)]
    keep_optimistic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog products
    Products(CatalogArgs),
    /// Show one product and related items
    Product(ProductArgs),
    /// Manage the shopping cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Place an order for the current cart
    Checkout(CheckoutArgs),
    /// List your orders
    Orders(OrdersArgs),
    /// Manage your wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Admin console
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "emporium_client=info,emporium_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let policy = if cli.keep_optimistic {
        FailurePolicy::KeepOptimistic
    } else {
        FailurePolicy::Rollback
    };
    let state = AppState::new(config, policy)?;
    commands::report_warnings(state.bridge()).detach();

    match cli.command {
        Commands::Products(args) => commands::catalog::list(&state, &args).await?,
        Commands::Product(args) => commands::catalog::show(&state, &args).await?,
        Commands::Cart { action } => commands::cart::run(&state, action).await?,
        Commands::Checkout(args) => {
            state.sign_in_from_config().await;
            commands::orders::checkout(&state, args).await?;
        }
        Commands::Orders(args) => {
            commands::require_session(&state).await?;
            commands::orders::list(&state, &args).await?;
        }
        Commands::Wishlist { action } => {
            commands::require_session(&state).await?;
            commands::wishlist::run(&state, action).await?;
        }
        Commands::Admin { action } => {
            commands::require_session(&state).await?;
            commands::admin::run(&state, action).await?;
        }
    }
    Ok(())
}
