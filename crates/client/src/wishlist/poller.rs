//! Periodic wishlist refresh.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::mirror::WishlistMirror;
use crate::api::WishlistApi;

impl<A: WishlistApi + 'static> WishlistMirror<A> {
    /// Refresh every `interval` until `cancel` fires.
    ///
    /// Ticks while nobody is signed in are skipped. Refresh failures are
    /// already surfaced as warnings by [`WishlistMirror::refresh`], so the
    /// loop only logs them.
    pub fn spawn_poller(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let mirror = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; login already refreshed.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if mirror.user().is_none() {
                            tracing::trace!("No session; skipping wishlist poll");
                            continue;
                        }
                        if let Err(e) = mirror.refresh().await {
                            tracing::debug!(error = %e, "Wishlist poll failed");
                        }
                    }
                }
            }
            tracing::debug!("Wishlist poller stopped");
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use emporium_core::{Email, ProductId, UserProfile, WishlistEntry, WishlistEntryId};
    use secrecy::SecretString;

    use super::*;
    use crate::api::{ApiError, WishlistCheck};
    use crate::events::SyncBridge;
    use crate::session::Session;
    use crate::storage::{MemoryStorage, Storage};
    use crate::wishlist::FailurePolicy;

    #[derive(Default)]
    struct CountingApi {
        lists: AtomicUsize,
    }

    #[async_trait]
    impl WishlistApi for CountingApi {
        async fn list_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn check_wishlist(&self, _: &ProductId) -> Result<WishlistCheck, ApiError> {
            Ok(WishlistCheck {
                exists: false,
                wishlist_id: None,
            })
        }

        async fn add_to_wishlist(&self, _: &ProductId, _: Option<&str>) -> Result<WishlistEntry, ApiError> {
            Err(ApiError::Forbidden)
        }

        async fn update_wishlist_notes(&self, _: &WishlistEntryId, _: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn remove_from_wishlist(&self, _: &WishlistEntryId) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn mirror() -> (WishlistMirror<Arc<CountingApi>>, Arc<CountingApi>) {
        let api = Arc::new(CountingApi::default());
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let bridge = SyncBridge::new(Arc::clone(&storage));
        (
            WishlistMirror::new(Arc::clone(&api), storage, bridge, FailurePolicy::Rollback),
            api,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_while_signed_in_and_stops_on_cancel() {
        let (mirror, api) = mirror();
        let session = Session::new(
            UserProfile::new(Email::parse("jane@shop.io").unwrap()),
            SecretString::from("tok"),
        );
        mirror.login(&session).await.unwrap();
        assert_eq!(api.lists.load(Ordering::SeqCst), 1);

        let cancel = CancellationToken::new();
        let handle = mirror.spawn_poller(Duration::from_secs(10), cancel.clone());
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(api.lists.load(Ordering::SeqCst), 4);

        cancel.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.lists.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_ticks_while_signed_out() {
        let (mirror, api) = mirror();
        let cancel = CancellationToken::new();
        let handle = mirror.spawn_poller(Duration::from_secs(10), cancel.clone());
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(api.lists.load(Ordering::SeqCst), 0);
        cancel.cancel();
        handle.await.unwrap();
    }
}
