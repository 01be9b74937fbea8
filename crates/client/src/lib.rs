//! Emporium client library.
//!
//! Client-side state for the storefront and admin console, backed by the
//! store's REST API:
//!
//! - [`cart`] - Durable cart store and checkout
//! - [`events`] - Typed change notifications ([`events::SyncBridge`])
//! - [`wishlist`] - Wishlist cache mirrored to the server
//! - [`api`] - REST client
//! - [`admin`] - Admin console operations
//! - [`state`] - Composition root wiring the above together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod admin;
pub mod api;
pub mod cart;
pub mod config;
pub mod events;
pub mod session;
pub mod state;
pub mod storage;
pub mod wishlist;

pub use api::{ApiError, StoreClient};
pub use cart::{CartStore, CheckoutError};
pub use config::{ClientConfig, ConfigError};
pub use events::{StoreEvent, Subscription, SyncBridge};
pub use session::Session;
pub use state::AppState;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use wishlist::{FailurePolicy, WishlistMirror};
