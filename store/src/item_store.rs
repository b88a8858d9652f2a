use std::path::PathBuf;

use thiserror::Error;

use fusion_types::{Item, ItemId, KindId, NewItem, PlayerId, TierId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item {0} no longer exists")]
    ItemNotFound(ItemId),
    #[error("kind {0} does not exist")]
    KindNotFound(KindId),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare database at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConversionError {
    /// An input changed hands after it was proposed.
    #[error("item {item} is owned by player {actual}, expected player {expected}")]
    OwnershipMismatch {
        item: ItemId,
        expected: PlayerId,
        actual: PlayerId,
    },
    #[error("conversion requires at least one input item")]
    NoInputs,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything needed to turn a locked proposal into one upgraded item.
///
/// The output kind is taken from the first input as it exists in storage at
/// conversion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub owner: PlayerId,
    pub inputs: Vec<ItemId>,
    pub tier: TierId,
    pub shiny: bool,
    pub attack_bonus: i32,
    pub health_bonus: i32,
    /// Experience earned by `owner` for this conversion.
    pub experience: u64,
}

/// A committed conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub item: Item,
    /// The owner's experience total when the store recorded the award in the
    /// same commit. `None` means the caller still has to award it.
    pub experience_total: Option<u64>,
}

impl ConversionRequest {
    #[must_use]
    pub fn output(&self, kind: KindId) -> NewItem {
        NewItem {
            kind,
            owner: self.owner,
            tier: Some(self.tier),
            favorite: false,
            shiny: self.shiny,
            attack_bonus: self.attack_bonus,
            health_bonus: self.health_bonus,
        }
    }
}

/// Persisted item records.
///
/// Implementations are synchronous; callers on an async runtime treat every
/// call as a storage round-trip.
pub trait ItemStore: Send + Sync {
    /// Fetch the latest persisted state of an item.
    fn reload(&self, id: ItemId) -> Result<Item, StoreError>;

    fn delete(&self, id: ItemId) -> Result<(), StoreError>;

    fn create(&self, item: &NewItem) -> Result<Item, StoreError>;

    /// Move an item to a new owner.
    fn transfer(&self, id: ItemId, new_owner: PlayerId) -> Result<Item, StoreError>;

    fn items_owned_by(&self, owner: PlayerId) -> Result<Vec<Item>, StoreError>;

    /// Verify ownership of every input, then delete them all and create the output.
    ///
    /// Ownership is checked for every input before anything is deleted. This
    /// default composes the individual calls and is therefore not atomic
    /// against crashes; stores with transactions override it. It leaves the
    /// experience award to the caller.
    fn convert(&self, request: &ConversionRequest) -> Result<Conversion, ConversionError> {
        if request.inputs.is_empty() {
            return Err(ConversionError::NoInputs);
        }

        let mut verified = Vec::with_capacity(request.inputs.len());
        for id in &request.inputs {
            let item = self.reload(*id)?;
            if item.owner != request.owner {
                return Err(ConversionError::OwnershipMismatch {
                    item: item.id,
                    expected: request.owner,
                    actual: item.owner,
                });
            }
            verified.push(item);
        }

        let kind = verified[0].kind.id;
        for item in &verified {
            self.delete(item.id)?;
        }
        Ok(Conversion {
            item: self.create(&request.output(kind))?,
            experience_total: None,
        })
    }
}
