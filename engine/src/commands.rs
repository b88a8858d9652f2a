//! Command surface over the session registry.
//!
//! Front-ends translate user input into these calls; every call resolves the
//! caller's live session in the scope first.

use std::sync::Arc;

use fusion_config::LevelPlan;
use fusion_types::{Item, ItemId, Participant, ScopeKey};

use crate::channel::MessageChannel;
use crate::context::FusionContext;
use crate::error::FusionError;
use crate::registry::SessionRegistry;
use crate::session::{FusionOutcome, FusionSession};

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub usage: &'static str,
    pub description: &'static str,
}

const COMMAND_SPECS: &[CommandSpec] = &[
    CommandSpec {
        usage: "levels",
        description: "List fusion levels and their requirements",
    },
    CommandSpec {
        usage: "begin <level>",
        description: "Start a fusion at the given level",
    },
    CommandSpec {
        usage: "add <item>",
        description: "Add an item to your proposal",
    },
    CommandSpec {
        usage: "remove <item>",
        description: "Remove an item from your proposal",
    },
    CommandSpec {
        usage: "lock",
        description: "Lock your proposal",
    },
    CommandSpec {
        usage: "reset",
        description: "Remove every item from your proposal",
    },
    CommandSpec {
        usage: "cancel",
        description: "Cancel the fusion",
    },
    CommandSpec {
        usage: "confirm",
        description: "Accept a locked proposal and fuse",
    },
];

#[must_use]
pub fn command_specs() -> &'static [CommandSpec] {
    COMMAND_SPECS
}

/// What happened to an `add` request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(Item),
    /// The participant declined the favourite prompt.
    Declined,
}

#[derive(Debug)]
pub struct FusionCommands {
    ctx: FusionContext,
    registry: Arc<SessionRegistry>,
}

impl FusionCommands {
    pub fn new(ctx: FusionContext) -> Self {
        Self::with_registry(ctx, Arc::new(SessionRegistry::new()))
    }

    pub fn with_registry(ctx: FusionContext, registry: Arc<SessionRegistry>) -> Self {
        Self { ctx, registry }
    }

    #[must_use]
    pub fn context(&self) -> &FusionContext {
        &self.ctx
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn levels(&self) -> Vec<LevelPlan> {
        self.ctx.config.plans().collect()
    }

    pub async fn session(
        &self,
        scope: ScopeKey,
        participant: &Participant,
    ) -> Result<Arc<FusionSession>, FusionError> {
        self.registry
            .find(scope, participant)
            .await
            .ok_or(FusionError::NoActiveSession)
    }

    /// Open a new session and post its card.
    ///
    /// The session is registered before the card is posted, so a concurrent
    /// `begin` for the same participant sees it and fails.
    pub async fn begin(
        &self,
        scope: ScopeKey,
        participant: Participant,
        level: i64,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<Arc<FusionSession>, FusionError> {
        if self.registry.find(scope, &participant).await.is_some() {
            return Err(FusionError::AlreadyActive);
        }
        let plan = self.ctx.config.plan(level)?;

        let session = FusionSession::new(
            self.registry.next_session_id(),
            scope,
            participant,
            plan,
            self.ctx.clone(),
            channel,
        );
        self.registry.create(Arc::clone(&session))?;
        if let Err(err) = session.start().await {
            self.registry.remove(&session);
            return Err(err);
        }
        Ok(session)
    }

    /// Add a stored item, asking first when it is a favourite.
    pub async fn add(
        &self,
        scope: ScopeKey,
        participant: &Participant,
        item: ItemId,
    ) -> Result<AddOutcome, FusionError> {
        let session = self.session(scope, participant).await?;
        let item = self.ctx.store.reload(item)?;
        if item.owner != participant.id {
            return Err(FusionError::NotOwner(item.id));
        }
        if !item.is_tradeable() {
            return Err(FusionError::NotTradeable(item.id));
        }

        if item.favorite {
            let prompt = format!(
                "This {} is a favorite, are you sure you want to fuse it?",
                self.ctx.config.collectible_name
            );
            if !session.channel().confirm(participant, &prompt).await? {
                tracing::debug!(session = %session.id(), item = %item.id, "Favourite add declined");
                return Ok(AddOutcome::Declined);
            }
        }

        session.add_item(participant, item.clone()).await?;
        Ok(AddOutcome::Added(item))
    }

    pub async fn remove(
        &self,
        scope: ScopeKey,
        participant: &Participant,
        item: ItemId,
    ) -> Result<Item, FusionError> {
        let session = self.session(scope, participant).await?;
        session.remove_item(participant, item).await
    }

    pub async fn lock(&self, scope: ScopeKey, participant: &Participant) -> Result<(), FusionError> {
        let session = self.session(scope, participant).await?;
        session.lock_proposal(participant).await
    }

    pub async fn reset(
        &self,
        scope: ScopeKey,
        participant: &Participant,
    ) -> Result<usize, FusionError> {
        let session = self.session(scope, participant).await?;
        session.clear_proposal(participant).await
    }

    pub async fn cancel(&self, scope: ScopeKey, participant: &Participant) -> Result<(), FusionError> {
        let session = self.session(scope, participant).await?;
        session.user_cancel(participant).await?;
        self.registry.remove(&session);
        Ok(())
    }

    pub async fn confirm(
        &self,
        scope: ScopeKey,
        participant: &Participant,
    ) -> Result<FusionOutcome, FusionError> {
        let session = self.session(scope, participant).await?;
        let outcome = session.confirm(participant).await?;
        self.registry.remove(&session);
        Ok(outcome)
    }
}
