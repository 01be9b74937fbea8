//! Command log of optimistic wishlist mutations awaiting the server.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use emporium_core::{ProductId, WishlistSnapshot};
use uuid::Uuid;

/// A local mutation that has been applied but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A product was added; undo by dropping it again.
    Add { product_id: ProductId },
    /// An entry was removed from `index`; undo by reinserting it there.
    Remove {
        snapshot: WishlistSnapshot,
        index: usize,
    },
    /// Notes were edited; undo by restoring `previous`.
    UpdateNote {
        product_id: ProductId,
        previous: Option<String>,
    },
}

impl Command {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::UpdateNote { .. } => "update_note",
        }
    }
}

/// A logged command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub id: Uuid,
    pub command: Command,
    pub issued_at: DateTime<Utc>,
}

/// Pending optimistic mutations, oldest first.
#[derive(Debug, Default)]
pub struct CommandLog {
    pending: Mutex<Vec<PendingCommand>>,
}

impl CommandLog {
    /// Record a mutation and return its id.
    pub fn record(&self, command: Command) -> Uuid {
        let id = Uuid::new_v4();
        tracing::trace!(%id, kind = command.kind(), "Recording wishlist command");
        self.lock().push(PendingCommand {
            id,
            command,
            issued_at: Utc::now(),
        });
        id
    }

    /// The server accepted the mutation; forget it.
    pub fn commit(&self, id: Uuid) {
        self.lock().retain(|c| c.id != id);
    }

    /// The server rejected the mutation; hand it back for compensation.
    pub fn take(&self, id: Uuid) -> Option<Command> {
        let mut pending = self.lock();
        let index = pending.iter().position(|c| c.id == id)?;
        Some(pending.remove(index).command)
    }

    #[must_use]
    pub fn pending(&self) -> Vec<PendingCommand> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PendingCommand>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
