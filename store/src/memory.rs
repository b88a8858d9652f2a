//! In-process store used by tests and embedders without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fusion_types::{Item, ItemId, Kind, KindId, NewItem, PlayerId};

use crate::{ExperienceLedger, ItemStore, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    kinds: HashMap<KindId, Kind>,
    items: BTreeMap<ItemId, Item>,
    experience: HashMap<PlayerId, u64>,
    next_kind: i64,
    next_item: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_kind(&self, name: &str, tradeable: bool) -> Kind {
        let mut state = self.guard();
        state.next_kind += 1;
        let kind = Kind::new(KindId::new(state.next_kind), name, tradeable);
        state.kinds.insert(kind.id, kind.clone());
        kind
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.guard().items.len()
    }

    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.guard().items.contains_key(&id)
    }
}

impl ItemStore for MemoryStore {
    fn reload(&self, id: ItemId) -> Result<Item, StoreError> {
        self.guard()
            .items
            .get(&id)
            .cloned()
            .ok_or(StoreError::ItemNotFound(id))
    }

    fn delete(&self, id: ItemId) -> Result<(), StoreError> {
        self.guard()
            .items
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::ItemNotFound(id))
    }

    fn create(&self, item: &NewItem) -> Result<Item, StoreError> {
        let mut state = self.guard();
        let kind = state
            .kinds
            .get(&item.kind)
            .cloned()
            .ok_or(StoreError::KindNotFound(item.kind))?;
        state.next_item += 1;
        let created = Item {
            id: ItemId::new(state.next_item),
            kind,
            owner: item.owner,
            tier: item.tier,
            favorite: item.favorite,
            shiny: item.shiny,
            attack_bonus: item.attack_bonus,
            health_bonus: item.health_bonus,
        };
        state.items.insert(created.id, created.clone());
        Ok(created)
    }

    fn transfer(&self, id: ItemId, new_owner: PlayerId) -> Result<Item, StoreError> {
        let mut state = self.guard();
        let item = state
            .items
            .get_mut(&id)
            .ok_or(StoreError::ItemNotFound(id))?;
        item.owner = new_owner;
        Ok(item.clone())
    }

    fn items_owned_by(&self, owner: PlayerId) -> Result<Vec<Item>, StoreError> {
        Ok(self
            .guard()
            .items
            .values()
            .filter(|item| item.owner == owner)
            .cloned()
            .collect())
    }
}

impl ExperienceLedger for MemoryStore {
    fn award_experience(&self, player: PlayerId, amount: u64) -> Result<u64, StoreError> {
        let mut state = self.guard();
        let total = state.experience.entry(player).or_insert(0);
        *total = total.saturating_add(amount);
        Ok(*total)
    }

    fn experience(&self, player: PlayerId) -> Result<u64, StoreError> {
        Ok(self.guard().experience.get(&player).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use fusion_types::TierId;

    use super::*;
    use crate::{ConversionError, ConversionRequest};

    const ALICE: PlayerId = PlayerId::new(1);
    const BOB: PlayerId = PlayerId::new(2);

    fn request(inputs: Vec<ItemId>) -> ConversionRequest {
        ConversionRequest {
            owner: ALICE,
            inputs,
            tier: TierId::new(1),
            shiny: false,
            attack_bonus: 3,
            health_bonus: -7,
            experience: 50,
        }
    }

    #[test]
    fn create_requires_known_kind() {
        let store = MemoryStore::new();
        let err = store
            .create(&NewItem::plain(KindId::new(99), ALICE))
            .unwrap_err();
        assert!(matches!(err, StoreError::KindNotFound(_)));
    }

    #[test]
    fn default_convert_consumes_inputs() {
        let store = MemoryStore::new();
        let kind = store.insert_kind("France", true);
        let ids: Vec<ItemId> = (0..3)
            .map(|_| store.create(&NewItem::plain(kind.id, ALICE)).unwrap().id)
            .collect();

        let conversion = store.convert(&request(ids.clone())).unwrap();
        // The composed default leaves the award to the caller.
        assert_eq!(conversion.experience_total, None);
        assert_eq!(store.experience(ALICE).unwrap(), 0);

        let created = conversion.item;
        assert_eq!(created.kind.id, kind.id);
        assert_eq!(created.owner, ALICE);
        assert_eq!(created.tier, Some(TierId::new(1)));
        assert_eq!(created.health_bonus, -7);
        assert!(ids.iter().all(|id| !store.contains(*id)));
        assert_eq!(store.item_count(), 1);
    }

    #[test]
    fn default_convert_checks_every_owner_before_deleting() {
        let store = MemoryStore::new();
        let kind = store.insert_kind("France", true);
        let ids: Vec<ItemId> = (0..3)
            .map(|_| store.create(&NewItem::plain(kind.id, ALICE)).unwrap().id)
            .collect();
        store.transfer(ids[2], BOB).unwrap();

        let err = store.convert(&request(ids.clone())).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::OwnershipMismatch { actual, .. } if actual == BOB
        ));
        assert_eq!(store.item_count(), 3);
    }

    #[test]
    fn experience_accumulates() {
        let store = MemoryStore::new();
        assert_eq!(store.experience(ALICE).unwrap(), 0);
        assert_eq!(store.award_experience(ALICE, 50).unwrap(), 50);
        assert_eq!(store.award_experience(ALICE, 100).unwrap(), 150);
        assert_eq!(store.experience(BOB).unwrap(), 0);
    }
}
