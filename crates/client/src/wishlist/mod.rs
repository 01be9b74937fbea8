//! Wishlist mirror: the signed-in user's wishlist, cached locally and
//! reconciled with the remote API.
//!
//! - [`WishlistMirror`] applies mutations optimistically and records them
//!   in a [`CommandLog`]; a refused write is compensated according to the
//!   [`FailurePolicy`].
//! - Refreshes carry sequence numbers so an out-of-order response never
//!   overwrites newer state.
//! - [`WishlistMirror::spawn_poller`] keeps the cache fresh while a
//!   session is active.

mod log;
mod mirror;
mod poller;

pub use log::{Command, CommandLog, PendingCommand};
pub use mirror::{BulkRemoval, FailurePolicy, MirrorError, Toggled, WishlistMirror};
