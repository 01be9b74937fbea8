//! CLI command implementations.

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod wishlist;

use emporium_client::events::{StoreEvent, Subscription, SyncBridge};
use emporium_client::session::Session;
use emporium_client::state::AppState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Not signed in: set EMPORIUM_USER_EMAIL and EMPORIUM_API_TOKEN")]
    NotSignedIn,

    #[error("Invalid {field}: {message}")]
    InvalidArgument { field: &'static str, message: String },
}

/// Print user-facing warnings from the client as they happen.
#[allow(clippy::print_stderr)]
pub fn report_warnings(bridge: &SyncBridge) -> Subscription {
    bridge.subscribe(|event| {
        if let StoreEvent::Warning { message } = event {
            eprintln!("warning: {message}");
        }
    })
}

/// Sign in with the configured user or fail.
pub async fn require_session(state: &AppState) -> Result<Session, CommandError> {
    state
        .sign_in_from_config()
        .await
        .ok_or(CommandError::NotSignedIn)
}
