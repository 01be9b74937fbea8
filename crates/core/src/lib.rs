//! Emporium Core - Shared types library.
//!
//! This crate provides the domain model used across all Emporium components:
//! - `client` - Cart store, wishlist sync and REST access for the storefront
//! - `cli` - Command-line front end over the client
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no storage,
//! no HTTP clients. This keeps it lightweight and trivially testable.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, sizes and statuses
//! - [`product`] - Catalog products, shop filtering, admin product views
//! - [`cart`] - Cart lines and derived totals
//! - [`wishlist`] - Wishlist entries, local snapshots, list views
//! - [`order`] - Checkout validation and pricing, orders, order views
//! - [`user`] - Signed-in profile and admin user views

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod order;
pub mod product;
pub mod types;
pub mod user;
pub mod wishlist;

pub use cart::{Cart, CartItem};
pub use order::{CheckoutForm, NewOrder, Order, OrderStats, OrderTotals};
pub use product::{Product, ProductInput};
pub use types::*;
pub use user::UserProfile;
pub use wishlist::{WishlistEntry, WishlistSnapshot};
