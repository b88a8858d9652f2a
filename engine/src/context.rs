use std::sync::Arc;

use fusion_config::FusionConfig;
use fusion_store::{ExperienceLedger, ItemStore, LockRegistry};

use crate::reward::{RandomRoller, RewardRoller};
use crate::view::{ProposalRenderer, TextRenderer};

/// Shared collaborators every session in a process uses.
///
/// Cloning is cheap; all members are reference counted.
#[derive(Clone)]
pub struct FusionContext {
    pub config: Arc<FusionConfig>,
    pub store: Arc<dyn ItemStore>,
    pub ledger: Arc<dyn ExperienceLedger>,
    pub locks: Arc<LockRegistry>,
    pub renderer: Arc<dyn ProposalRenderer>,
    pub roller: Arc<dyn RewardRoller>,
}

impl FusionContext {
    pub fn new(
        config: Arc<FusionConfig>,
        store: Arc<dyn ItemStore>,
        ledger: Arc<dyn ExperienceLedger>,
        locks: Arc<LockRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            ledger,
            locks,
            renderer: Arc::new(TextRenderer),
            roller: Arc::new(RandomRoller),
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ProposalRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn with_roller(mut self, roller: Arc<dyn RewardRoller>) -> Self {
        self.roller = roller;
        self
    }
}

impl std::fmt::Debug for FusionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionContext")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}
