use fusion_types::PlayerId;

use crate::StoreError;

/// Experience-point bookkeeping for players.
pub trait ExperienceLedger: Send + Sync {
    /// Add `amount` to the player's experience, creating the record if needed.
    ///
    /// Returns the new total.
    fn award_experience(&self, player: PlayerId, amount: u64) -> Result<u64, StoreError>;

    /// Current experience; players without a record have zero.
    fn experience(&self, player: PlayerId) -> Result<u64, StoreError>;
}
