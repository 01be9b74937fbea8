//! Composition root for the client.

use std::sync::{Arc, PoisonError, RwLock};

use emporium_core::UserProfile;
use secrecy::SecretString;

use crate::admin::{AdminConsole, AdminError};
use crate::api::{ApiError, StoreClient};
use crate::cart::CartStore;
use crate::config::ClientConfig;
use crate::events::SyncBridge;
use crate::session::Session;
use crate::storage::{FileStorage, Storage, StorageError};
use crate::wishlist::{FailurePolicy, WishlistMirror};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to open local storage: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to build API client: {0}")]
    Api(#[from] ApiError),
}

/// Everything the storefront shares: API client, storage, the change
/// bridge, the cart and the wishlist mirror.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ClientConfig,
    api: StoreClient,
    storage: Arc<dyn Storage>,
    bridge: SyncBridge,
    cart: CartStore,
    wishlist: WishlistMirror<StoreClient>,
    session: RwLock<Option<Session>>,
}

impl AppState {
    /// Build state over file storage in `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or HTTP client cannot be set up.
    pub fn new(config: ClientConfig, policy: FailurePolicy) -> Result<Self, StateError> {
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&config.data_dir)?);
        Self::with_storage(config, storage, policy)
    }

    /// Build state over an explicit storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_storage(
        config: ClientConfig,
        storage: Arc<dyn Storage>,
        policy: FailurePolicy,
    ) -> Result<Self, StateError> {
        let api = StoreClient::new(&config)?;
        let bridge = SyncBridge::new(Arc::clone(&storage));
        let cart = CartStore::load(Arc::clone(&storage), bridge.clone());
        let wishlist = WishlistMirror::new(api.clone(), Arc::clone(&storage), bridge.clone(), policy);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                api,
                storage,
                bridge,
                cart,
                wishlist,
                session: RwLock::new(None),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn api(&self) -> &StoreClient {
        &self.inner.api
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    #[must_use]
    pub fn bridge(&self) -> &SyncBridge {
        &self.inner.bridge
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn wishlist(&self) -> &WishlistMirror<StoreClient> {
        &self.inner.wishlist
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sign in, learn the user's role and start mirroring their wishlist.
    ///
    /// A failed wishlist fetch is not an error here: the mirror falls back
    /// to the cached copy and publishes a warning.
    pub async fn sign_in(&self, profile: UserProfile, token: SecretString) -> Session {
        let session = Session::sign_in(&self.inner.api, profile, token).await;
        *self.inner.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        if let Err(e) = self.inner.wishlist.login(&session).await {
            tracing::debug!(error = %e, "Initial wishlist fetch failed");
        }
        session
    }

    /// Sign in with the user configured in the environment, if any.
    pub async fn sign_in_from_config(&self) -> Option<Session> {
        let configured = Session::from_config(&self.inner.config)?;
        Some(
            self.sign_in(configured.profile.clone(), configured.token().clone())
                .await,
        )
    }

    /// Forget the session and stop mirroring the wishlist.
    pub async fn sign_out(&self) {
        let session = self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.wishlist.logout().await;
        if let Some(session) = session {
            session.sign_out(&self.inner.api);
        }
    }

    /// Admin console for the current session.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotAdmin` without an admin session.
    pub fn admin(&self) -> Result<AdminConsole, AdminError> {
        let session = self.session().ok_or(AdminError::NotAdmin)?;
        AdminConsole::open(self.inner.api.clone(), &session)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_state_shares_one_bridge() {
        let config = ClientConfig::new("http://localhost:5000").unwrap();
        let state = AppState::with_storage(config, Arc::new(MemoryStorage::new()), FailurePolicy::Rollback).unwrap();
        let _sub = state.bridge().subscribe(|_| {});
        assert_eq!(state.bridge().subscriber_count(), 1);
        assert!(state.session().is_none());
        assert!(matches!(state.admin(), Err(AdminError::NotAdmin)));
    }

    #[test]
    fn test_file_state_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::new("http://localhost:5000").unwrap();
        config.data_dir = dir.path().join("store");
        let _state = AppState::new(config, FailurePolicy::default()).unwrap();
        assert!(dir.path().join("store").is_dir());
    }
}
