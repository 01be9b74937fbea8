use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use emporium_core::wishlist::dedupe_entries;
use emporium_core::{Email, Product, ProductId, WishlistEntry, WishlistEntryId, WishlistSnapshot};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use super::log::{Command, CommandLog, PendingCommand};
use crate::api::{ApiError, WishlistApi};
use crate::events::SyncBridge;
use crate::session::Session;
use crate::storage::{Storage, load_json, save_json, wishlist_key};

/// Errors from wishlist mutations.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Sign in to use your wishlist")]
    NotSignedIn,

    #[error(transparent)]
    Remote(#[from] ApiError),
}

/// What to do with an optimistic local change the server refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Apply the compensating change immediately.
    #[default]
    Rollback,
    /// Leave the local change until the next refresh replaces it.
    KeepOptimistic,
}

/// Result of [`WishlistMirror::toggle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Added,
    Removed,
}

/// Result of [`WishlistMirror::remove_many`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BulkRemoval {
    pub removed: Vec<WishlistEntryId>,
    pub failed: Vec<WishlistEntryId>,
}

struct MirrorState {
    user: Option<Email>,
    items: Vec<WishlistSnapshot>,
    /// Full entries from the last successful refresh, for list views.
    remote: Vec<WishlistEntry>,
    /// Sequence number of the newest state applied.
    applied_seq: u64,
}

struct MirrorInner<A> {
    api: A,
    storage: Arc<dyn Storage>,
    bridge: SyncBridge,
    policy: FailurePolicy,
    state: Mutex<MirrorState>,
    next_seq: AtomicU64,
    writes: tokio::sync::Mutex<()>,
    log: CommandLog,
}

/// Local wishlist cache kept in step with the remote API.
///
/// The server is authoritative: a successful refresh replaces local
/// state. Mutations are applied locally first, then sent; mutations are
/// serialized so a toggle's check and write happen without interleaving.
pub struct WishlistMirror<A> {
    inner: Arc<MirrorInner<A>>,
}

impl<A> Clone for WishlistMirror<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> std::fmt::Debug for WishlistMirror<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("WishlistMirror")
            .field("user", &state.user)
            .field("items", &state.items.len())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl<A> WishlistMirror<A> {
    fn state(&self) -> MutexGuard<'_, MirrorState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_seq(&self) -> u64 {
        self.inner.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    #[must_use]
    pub fn user(&self) -> Option<Email> {
        self.state().user.clone()
    }

    /// Locally known entries, in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<WishlistSnapshot> {
        self.state().items.clone()
    }

    /// Full entries from the last successful refresh.
    #[must_use]
    pub fn entries(&self) -> Vec<WishlistEntry> {
        self.state().remote.clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.state().items.len()
    }

    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.state().items.iter().any(|i| &i.product_id == product_id)
    }

    #[must_use]
    pub fn policy(&self) -> FailurePolicy {
        self.inner.policy
    }

    /// Optimistic mutations still waiting for the server.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingCommand> {
        self.inner.log.pending()
    }
}

impl<A: WishlistApi> WishlistMirror<A> {
    #[must_use]
    pub fn new(api: A, storage: Arc<dyn Storage>, bridge: SyncBridge, policy: FailurePolicy) -> Self {
        Self {
            inner: Arc::new(MirrorInner {
                api,
                storage,
                bridge,
                policy,
                state: Mutex::new(MirrorState {
                    user: None,
                    items: Vec::new(),
                    remote: Vec::new(),
                    applied_seq: 0,
                }),
                next_seq: AtomicU64::new(1),
                writes: tokio::sync::Mutex::new(()),
                log: CommandLog::default(),
            }),
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Start mirroring `session`'s wishlist: show the cached copy at once,
    /// then refresh from the server.
    ///
    /// # Errors
    ///
    /// Returns the refresh error; the cached copy stays in place.
    #[instrument(skip_all, fields(email = %session.email()))]
    pub async fn login(&self, session: &Session) -> Result<(), ApiError> {
        let user = session.email().clone();
        {
            let _guard = self.inner.writes.lock().await;
            let cached: Vec<WishlistSnapshot> =
                load_json(self.inner.storage.as_ref(), &wishlist_key(&user)).unwrap_or_default();
            let mut state = self.state();
            state.user = Some(user.clone());
            state.items = cached;
            state.remote.clear();
            state.applied_seq = self.next_seq();
            drop(state);
            self.inner.log.clear();
        }
        self.inner.bridge.trigger_update(&user);
        self.refresh().await
    }

    /// Stop mirroring once in-flight mutations have settled. The local
    /// cache is kept for the next login.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let _guard = self.inner.writes.lock().await;
        let previous = {
            let mut state = self.state();
            state.items.clear();
            state.remote.clear();
            state.applied_seq = self.next_seq();
            state.user.take()
        };
        self.inner.log.clear();
        if let Some(user) = previous {
            self.inner.bridge.trigger_update(&user);
        }
    }

    fn require_user(&self) -> Result<Email, MirrorError> {
        self.user().ok_or(MirrorError::NotSignedIn)
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Replace local state with the server's wishlist.
    ///
    /// Responses that arrive after a newer refresh or local mutation was
    /// applied are discarded. On failure the cached snapshot is kept and a
    /// warning is published.
    ///
    /// # Errors
    ///
    /// Returns the API error when the fetch fails.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let Some(user) = self.user() else {
            tracing::debug!("No session; skipping wishlist refresh");
            return Ok(());
        };
        let seq = self.next_seq();

        let entries = match self.inner.api.list_wishlist().await {
            Ok(entries) => dedupe_entries(entries),
            Err(e) => {
                tracing::warn!(error = %e, "Wishlist refresh failed; using cached copy");
                self.restore_cache(&user);
                self.inner
                    .bridge
                    .warn("Could not reach the server; showing your saved wishlist");
                return Err(e);
            }
        };

        if self.apply_remote(&user, seq, entries) {
            tracing::debug!(count = self.count(), "Wishlist refreshed");
            self.persist(&user);
            self.inner.bridge.trigger_update(&user);
        }
        Ok(())
    }

    /// Install a fetched wishlist unless something newer was applied since
    /// `seq` was issued. Returns whether it was installed.
    fn apply_remote(&self, user: &Email, seq: u64, entries: Vec<WishlistEntry>) -> bool {
        let items: Vec<WishlistSnapshot> = entries.iter().filter_map(WishlistEntry::to_snapshot).collect();
        let mut state = self.state();
        if state.user.as_ref() != Some(user) {
            tracing::debug!("Session changed during refresh; discarding response");
            return false;
        }
        if seq < state.applied_seq {
            tracing::debug!(seq, applied = state.applied_seq, "Discarding stale wishlist response");
            return false;
        }
        state.applied_seq = seq;
        state.items = items;
        state.remote = entries;
        true
    }

    fn restore_cache(&self, user: &Email) {
        let Some(cached) = load_json::<Vec<WishlistSnapshot>>(self.inner.storage.as_ref(), &wishlist_key(user))
        else {
            return;
        };
        let mut state = self.state();
        if state.user.as_ref() == Some(user) && state.items.is_empty() {
            state.items = cached;
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add `product`. Adding a product already present does nothing.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::NotSignedIn` without a session, or the API error
    /// after applying the failure policy.
    #[instrument(skip(self, product, notes), fields(product_id = %product.id))]
    pub async fn add(&self, product: &Product, notes: Option<&str>) -> Result<(), MirrorError> {
        let _guard = self.inner.writes.lock().await;
        let user = self.require_user()?;
        if self.contains(&product.id) {
            return Ok(());
        }
        self.add_locked(&user, product, notes).await
    }

    /// Remove `product_id`. Removing an absent product does nothing.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::NotSignedIn` without a session, or the API error
    /// after applying the failure policy.
    #[instrument(skip(self))]
    pub async fn remove(&self, product_id: &ProductId) -> Result<(), MirrorError> {
        let _guard = self.inner.writes.lock().await;
        let user = self.require_user()?;
        self.remove_locked(&user, product_id).await
    }

    /// Replace the notes on `product_id`'s entry.
    ///
    /// An entry missing from the local copy is looked up on the server.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::NotSignedIn` without a session, or the API error
    /// after applying the failure policy. `ApiError::NotFound` when neither
    /// side has the entry.
    #[instrument(skip(self, notes))]
    pub async fn update_note(&self, product_id: &ProductId, notes: &str) -> Result<(), MirrorError> {
        let _guard = self.inner.writes.lock().await;
        let user = self.require_user()?;

        if !self.contains(product_id) {
            return self.send_note(product_id, None, notes).await.map_err(|e| {
                tracing::warn!(error = %e, "Saving note for uncached wishlist entry failed");
                self.inner.bridge.warn("Could not save your note");
                MirrorError::Remote(e)
            });
        }

        let Some((previous, entry_id)) = self
            .edit(&user, |items| {
                let item = items.iter_mut().find(|i| &i.product_id == product_id)?;
                let previous = item.notes.replace(notes.to_string());
                Some((previous, item.entry_id.clone()))
            })
            .flatten()
        else {
            return Err(MirrorError::NotSignedIn);
        };
        let command = self.inner.log.record(Command::UpdateNote {
            product_id: product_id.clone(),
            previous,
        });

        let result = self.send_note(product_id, entry_id, notes).await;
        self.settle(&user, command, result, "Could not save your note")
    }

    /// Add `product` if it is not on the server's wishlist, remove it if
    /// it is. Falls back to local state when the server cannot be asked.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::NotSignedIn` without a session, or the API error
    /// after applying the failure policy.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn toggle(&self, product: &Product) -> Result<Toggled, MirrorError> {
        let _guard = self.inner.writes.lock().await;
        let user = self.require_user()?;

        let present = match self.inner.api.check_wishlist(&product.id).await {
            Ok(check) => check.exists,
            Err(e) => {
                tracing::debug!(error = %e, "Wishlist check failed; using local state");
                self.contains(&product.id)
            }
        };

        if present {
            self.remove_locked(&user, &product.id).await?;
            Ok(Toggled::Removed)
        } else {
            self.add_locked(&user, product, None).await?;
            Ok(Toggled::Added)
        }
    }

    /// Remove several entries. Every id is sent to the server, including
    /// ids not in the local copy, and lands in either `removed` or
    /// `failed`. Only the removals the server refused are compensated.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::NotSignedIn` without a session.
    #[instrument(skip(self), fields(count = entry_ids.len()))]
    pub async fn remove_many(&self, entry_ids: &[WishlistEntryId]) -> Result<BulkRemoval, MirrorError> {
        let _guard = self.inner.writes.lock().await;
        let user = self.require_user()?;

        let mut logged: Vec<(WishlistEntryId, Option<(Uuid, usize)>)> = Vec::with_capacity(entry_ids.len());
        for id in entry_ids {
            let taken = if self.holds_entry(id) {
                self.edit(&user, |items| {
                    let index = items.iter().position(|i| i.entry_id.as_ref() == Some(id))?;
                    Some((items.remove(index), index))
                })
                .flatten()
            } else {
                None
            };
            let command =
                taken.map(|(snapshot, index)| (self.inner.log.record(Command::Remove { snapshot, index }), index));
            logged.push((id.clone(), command));
        }

        let mut report = BulkRemoval::default();
        // (command, index it was removed from, whether the server accepted it)
        let mut outcomes = Vec::with_capacity(logged.len());
        for (id, command) in logged {
            match self.inner.api.remove_from_wishlist(&id).await {
                Ok(()) => {
                    if let Some((command, index)) = command {
                        self.inner.log.commit(command);
                        outcomes.push((command, index, true));
                    }
                    report.removed.push(id);
                }
                Err(e) => {
                    tracing::warn!(entry_id = %id, error = %e, "Bulk wishlist removal failed");
                    if let Some((command, index)) = command {
                        outcomes.push((command, index, false));
                    }
                    report.failed.push(id);
                }
            }
        }

        if !report.failed.is_empty() {
            self.inner.bridge.warn(format!(
                "Could not remove {} wishlist item(s)",
                report.failed.len()
            ));
            // Restore in reverse, shifting each index past the later removals that stuck.
            for (at, &(command, index, accepted)) in outcomes.iter().enumerate().rev() {
                if accepted {
                    continue;
                }
                let index = outcomes
                    .iter()
                    .skip(at + 1)
                    .filter(|&&(_, _, accepted)| accepted)
                    .fold(index, |pos, &(_, removed_at, _)| if removed_at < pos { pos.saturating_sub(1) } else { pos });
                let Some(command) = self.inner.log.take(command) else {
                    continue;
                };
                let command = match command {
                    Command::Remove { snapshot, .. } => Command::Remove { snapshot, index },
                    other => other,
                };
                self.roll_back(&user, command);
            }
        }
        Ok(report)
    }

    // =========================================================================
    // Internals (callers hold `writes`)
    // =========================================================================

    async fn add_locked(&self, user: &Email, product: &Product, notes: Option<&str>) -> Result<(), MirrorError> {
        let snapshot = WishlistSnapshot {
            entry_id: None,
            product_id: product.id.clone(),
            name: Some(product.name.clone()),
            price: Some(product.price),
            added_at: Utc::now(),
            notes: notes.map(str::to_owned),
        };
        self.edit(user, |items| {
            items.retain(|i| i.product_id != product.id);
            items.push(snapshot);
        });
        let command = self.inner.log.record(Command::Add {
            product_id: product.id.clone(),
        });

        let result = self.inner.api.add_to_wishlist(&product.id, notes).await.map(|entry| {
            let mut state = self.state();
            if state.user.as_ref() != Some(user) {
                return;
            }
            if let Some(item) = state.items.iter_mut().find(|i| i.product_id == product.id) {
                item.entry_id = Some(entry.id);
            }
        });
        if result.is_ok() {
            self.persist(user);
        }
        self.settle(user, command, result, "Could not add to your wishlist")
    }

    async fn remove_locked(&self, user: &Email, product_id: &ProductId) -> Result<(), MirrorError> {
        let taken = self
            .edit(user, |items| {
                let index = items.iter().position(|i| &i.product_id == product_id)?;
                Some((items.remove(index), index))
            })
            .flatten();

        let (entry_id, command) = match taken {
            Some((snapshot, index)) => {
                let entry_id = snapshot.entry_id.clone();
                (entry_id, Some(self.inner.log.record(Command::Remove { snapshot, index })))
            }
            None => (None, None),
        };

        let result = match self.resolve_entry_id(product_id, entry_id).await {
            Ok(Some(id)) => self.inner.api.remove_from_wishlist(&id).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        match command {
            Some(command) => self.settle(user, command, result, "Could not remove from your wishlist"),
            None => result.map_err(|e| {
                self.inner.bridge.warn("Could not remove from your wishlist");
                MirrorError::Remote(e)
            }),
        }
    }

    /// The server-side entry id for `product_id`, asking the server when
    /// the local copy has not been acknowledged yet.
    async fn resolve_entry_id(
        &self,
        product_id: &ProductId,
        known: Option<WishlistEntryId>,
    ) -> Result<Option<WishlistEntryId>, ApiError> {
        if known.is_some() {
            return Ok(known);
        }
        let check = self.inner.api.check_wishlist(product_id).await?;
        Ok(check.wishlist_id.filter(|_| check.exists))
    }

    async fn send_note(
        &self,
        product_id: &ProductId,
        known: Option<WishlistEntryId>,
        notes: &str,
    ) -> Result<(), ApiError> {
        match self.resolve_entry_id(product_id, known).await? {
            Some(id) => self.inner.api.update_wishlist_notes(&id, notes).await,
            None => Err(ApiError::NotFound(format!("wishlist entry for {product_id}"))),
        }
    }

    fn holds_entry(&self, id: &WishlistEntryId) -> bool {
        self.state().items.iter().any(|i| i.entry_id.as_ref() == Some(id))
    }

    /// Apply a local edit for `user`, persist it and notify.
    ///
    /// Returns `None` and changes nothing once `user` is no longer the
    /// signed-in user. The edit also supersedes any refresh already in
    /// flight.
    fn edit<R>(&self, user: &Email, f: impl FnOnce(&mut Vec<WishlistSnapshot>) -> R) -> Option<R> {
        let result = {
            let mut state = self.state();
            if state.user.as_ref() != Some(user) {
                tracing::debug!("Session changed; dropping wishlist edit");
                return None;
            }
            state.applied_seq = self.next_seq();
            f(&mut state.items)
        };
        self.persist(user);
        self.inner.bridge.trigger_update(user);
        Some(result)
    }

    /// Commit or compensate a logged command once the server answered.
    fn settle(
        &self,
        user: &Email,
        command: Uuid,
        result: Result<(), ApiError>,
        warning: &str,
    ) -> Result<(), MirrorError> {
        match result {
            Ok(()) => {
                self.inner.log.commit(command);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, policy = ?self.inner.policy, "Wishlist write failed");
                self.inner.bridge.warn(warning);
                self.fail(user, command);
                Err(MirrorError::Remote(e))
            }
        }
    }

    fn fail(&self, user: &Email, command: Uuid) {
        if let Some(command) = self.inner.log.take(command) {
            self.roll_back(user, command);
        }
    }

    fn roll_back(&self, user: &Email, command: Command) {
        if self.inner.policy == FailurePolicy::KeepOptimistic {
            return;
        }
        tracing::debug!(kind = command.kind(), "Rolling back wishlist change");
        self.edit(user, |items| match command {
            Command::Add { product_id } => items.retain(|i| i.product_id != product_id),
            Command::Remove { snapshot, index } => {
                if !items.iter().any(|i| i.product_id == snapshot.product_id) {
                    items.insert(index.min(items.len()), snapshot);
                }
            }
            Command::UpdateNote { product_id, previous } => {
                if let Some(item) = items.iter_mut().find(|i| i.product_id == product_id) {
                    item.notes = previous;
                }
            }
        });
    }

    fn persist(&self, user: &Email) {
        let items = {
            let state = self.state();
            if state.user.as_ref() != Some(user) {
                return;
            }
            state.items.clone()
        };
        if let Err(e) = save_json(self.inner.storage.as_ref(), &wishlist_key(user), &items) {
            tracing::error!(error = %e, "Failed to persist wishlist");
            self.inner
                .bridge
                .warn("Your wishlist could not be saved on this device");
        }
    }
}
