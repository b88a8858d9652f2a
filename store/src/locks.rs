//! Process-wide item reservations.
//!
//! An item id present here belongs to exactly one in-progress session and
//! cannot enter any other proposal. Reservations remember their holder so a
//! late release from a finished session can never free somebody else's claim.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use fusion_types::{ItemId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("item {item} is already reserved by session {holder}")]
pub struct AlreadyReserved {
    pub item: ItemId,
    pub holder: SessionId,
}

#[derive(Debug, Default)]
pub struct LockRegistry {
    reservations: Mutex<HashMap<ItemId, SessionId>>,
}

impl LockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // The map holds plain ids, so a panic elsewhere cannot leave it half-updated.
    fn guard(&self) -> MutexGuard<'_, HashMap<ItemId, SessionId>> {
        self.reservations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically reserve `item` for `holder`.
    pub fn try_reserve(&self, item: ItemId, holder: SessionId) -> Result<(), AlreadyReserved> {
        let mut reservations = self.guard();
        if let Some(existing) = reservations.get(&item) {
            return Err(AlreadyReserved {
                item,
                holder: *existing,
            });
        }
        reservations.insert(item, holder);
        Ok(())
    }

    /// Release `item` if `holder` owns the reservation. Returns whether anything was released.
    pub fn release(&self, item: ItemId, holder: SessionId) -> bool {
        let mut reservations = self.guard();
        match reservations.get(&item) {
            Some(existing) if *existing == holder => {
                reservations.remove(&item);
                true
            }
            Some(existing) => {
                tracing::warn!(
                    item = %item,
                    holder = %holder,
                    owner = %existing,
                    "Ignoring release of a reservation held by another session"
                );
                false
            }
            None => false,
        }
    }

    /// Release every listed item held by `holder`. Returns the number released.
    pub fn release_all<I>(&self, items: I, holder: SessionId) -> usize
    where
        I: IntoIterator<Item = ItemId>,
    {
        let mut reservations = self.guard();
        let mut released = 0;
        for item in items {
            if reservations.get(&item) == Some(&holder) {
                reservations.remove(&item);
                released += 1;
            }
        }
        released
    }

    #[must_use]
    pub fn is_reserved(&self, item: ItemId) -> bool {
        self.guard().contains_key(&item)
    }

    #[must_use]
    pub fn holder(&self, item: ItemId) -> Option<SessionId> {
        self.guard().get(&item).copied()
    }

    /// Number of reservations currently owned by `holder`.
    #[must_use]
    pub fn held_by(&self, holder: SessionId) -> usize {
        self.guard().values().filter(|h| **h == holder).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}
