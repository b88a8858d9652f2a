use thiserror::Error;

use fusion_store::StoreError;
use fusion_types::{InvalidLevel, ItemId, TierId};

use crate::channel::ChannelError;

#[derive(Debug, Error)]
pub enum FusionError {
    #[error("you do not have an ongoing fusion")]
    NoActiveSession,
    #[error("you already have an ongoing fusion")]
    AlreadyActive,
    #[error(transparent)]
    InvalidLevel(#[from] InvalidLevel),
    #[error("you are not allowed to interact with this fusion")]
    NotParticipant,

    #[error("item {0} does not belong to you")]
    NotOwner(ItemId),
    #[error("item {0} cannot be fused")]
    NotTradeable(ItemId),
    #[error("item {0} is already in your proposal")]
    AlreadyProposed(ItemId),
    #[error("item {0} is currently in an active fusion, please try again later")]
    ItemLocked(ItemId),
    #[error("item {0} is not in your proposal")]
    NotInProposal(ItemId),

    #[error("you have locked your proposal, it cannot be edited; cancel the fusion instead")]
    ProposalLocked,
    #[error("you have already locked your proposal")]
    AlreadyLocked,
    #[error("lock your proposal before confirming")]
    NotLocked,
    #[error("you have already accepted this fusion")]
    AlreadyAccepted,
    #[error("this fusion has already ended")]
    SessionEnded,

    #[error("you have to use exactly {required} items to fuse, the proposal holds {actual}")]
    WrongCount { required: usize, actual: usize },
    #[error("use only items of one kind")]
    MixedKinds,
    #[error("item {item} does not carry the tier {required} marker from the previous level")]
    WrongTier { item: ItemId, required: TierId },
    #[error("item {0} changed owner during the fusion")]
    OwnershipChanged(ItemId),

    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl FusionError {
    /// User-correctable problems reported inline without changing session state.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, FusionError::Store(_) | FusionError::Channel(_))
    }
}
