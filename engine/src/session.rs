//! One participant's fusion attempt.
//!
//! A [`FusionSession`] owns the proposal, the reservations taken for it, the
//! card it renders into and the background tasks that keep that card fresh.
//! All mutation goes through one async mutex, so handlers, the refresh loop
//! and the confirmation watchdog observe transitions in a single order.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, sleep_until};

use fusion_config::LevelPlan;
use fusion_store::{ConversionError, ConversionRequest};
use fusion_types::{Item, ItemId, Level, Participant, ScopeKey, SessionId};

use crate::channel::{ChannelError, MessageChannel};
use crate::context::FusionContext;
use crate::error::FusionError;
use crate::state::{CancelOrigin, SessionPhase, SessionState, TimerTask, ViewHeader};
use crate::surface::Surface;
use crate::view::{MAX_VIEW_LEN, ProposalSnapshot, RenderedView, Tone};

pub const TIMEOUT_REASON: &str = "The fusion timed out";
pub const CANCEL_REASON: &str = "The fusion has been cancelled.";

/// Result of a confirmed fusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FusionOutcome {
    /// Inputs consumed and `item` created. `experience` is what was
    /// recorded for the participant, zero if the award could not be saved.
    Completed { item: Item, experience: u64 },
    /// An input changed hands after the lock; nothing was written.
    Tampered { item: ItemId },
    /// The store rejected the conversion.
    Failed { reason: String },
}

impl FusionOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, FusionOutcome::Completed { .. })
    }
}

pub struct FusionSession {
    id: SessionId,
    scope: ScopeKey,
    participant: Participant,
    plan: LevelPlan,
    ctx: FusionContext,
    channel: Arc<dyn MessageChannel>,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for FusionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionSession")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("participant", &self.participant)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl FusionSession {
    pub fn new(
        id: SessionId,
        scope: ScopeKey,
        participant: Participant,
        plan: LevelPlan,
        ctx: FusionContext,
        channel: Arc<dyn MessageChannel>,
    ) -> Arc<Self> {
        let header = ViewHeader::selection(&ctx.config, &participant, plan);
        let surface = Surface::selection(ctx.config.selection_timeout());
        Arc::new(Self {
            id,
            scope,
            participant,
            plan,
            ctx,
            channel,
            state: Mutex::new(SessionState::new(surface, header)),
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn scope(&self) -> ScopeKey {
        self.scope
    }

    #[must_use]
    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.plan.level
    }

    #[must_use]
    pub fn plan(&self) -> LevelPlan {
        self.plan
    }

    #[must_use]
    pub fn channel(&self) -> &Arc<dyn MessageChannel> {
        &self.channel
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    pub async fn proposal(&self) -> Vec<Item> {
        self.state.lock().await.proposal.clone()
    }

    /// The card as it would be rendered right now.
    pub async fn current_view(&self) -> RenderedView {
        let state = self.state.lock().await;
        self.compose_view(&state)
    }

    /// Still routing input: the surface is open and the participant has not
    /// cancelled.
    pub async fn is_live(&self) -> bool {
        let state = self.state.lock().await;
        !(state.surface.is_finished() || state.user_cancelled)
    }

    /// Post the initial card and begin the refresh loop.
    pub async fn start(self: &Arc<Self>) -> Result<(), FusionError> {
        let mut state = self.state.lock().await;
        let view = self.compose_view(&state);
        match self.channel.send(view).await {
            Ok(message) => state.message = Some(message),
            Err(err) => {
                tracing::error!(
                    session = %self.id,
                    player = %self.participant.id,
                    "Failed to post the fusion card: {err}"
                );
                state.phase = SessionPhase::Cancelled;
                state.surface.disable();
                return Err(err.into());
            }
        }
        state.refresh = Some(TimerTask::spawn(refresh_loop(
            Arc::downgrade(self),
            self.ctx.config.refresh_interval(),
            self.ctx.config.session_lifetime(),
        )));
        tracing::info!(
            session = %self.id,
            player = %self.participant.id,
            scope = %self.scope,
            level = %self.plan.level,
            "Fusion started"
        );
        Ok(())
    }

    fn authorize(&self, actor: &Participant) -> Result<(), FusionError> {
        if *actor == self.participant {
            Ok(())
        } else {
            Err(FusionError::NotParticipant)
        }
    }

    /// Add an owned, tradeable item and reserve it for this session.
    pub async fn add_item(&self, actor: &Participant, item: Item) -> Result<(), FusionError> {
        self.authorize(actor)?;
        let mut state = self.state.lock().await;
        state.ensure_editable()?;

        if item.owner != self.participant.id {
            return Err(FusionError::NotOwner(item.id));
        }
        if !item.is_tradeable() {
            return Err(FusionError::NotTradeable(item.id));
        }
        if state.proposal.iter().any(|held| held.id == item.id) {
            return Err(FusionError::AlreadyProposed(item.id));
        }
        self.ctx
            .locks
            .try_reserve(item.id, self.id)
            .map_err(|_| FusionError::ItemLocked(item.id))?;

        tracing::debug!(session = %self.id, item = %item.id, "Item added to proposal");
        state.proposal.push(item);
        Ok(())
    }

    pub async fn remove_item(&self, actor: &Participant, item: ItemId) -> Result<Item, FusionError> {
        self.authorize(actor)?;
        let mut state = self.state.lock().await;
        state.ensure_editable()?;

        let position = state
            .proposal
            .iter()
            .position(|held| held.id == item)
            .ok_or(FusionError::NotInProposal(item))?;
        let removed = state.proposal.remove(position);
        self.ctx.locks.release(item, self.id);
        tracing::debug!(session = %self.id, item = %item, "Item removed from proposal");
        Ok(removed)
    }

    /// Empty the proposal, releasing every reservation. Returns how many items
    /// were dropped.
    pub async fn clear_proposal(&self, actor: &Participant) -> Result<usize, FusionError> {
        self.authorize(actor)?;
        let mut state = self.state.lock().await;
        state.ensure_editable()?;

        let cleared: Vec<Item> = state.proposal.drain(..).collect();
        self.ctx
            .locks
            .release_all(cleared.iter().map(|item| item.id), self.id);
        tracing::debug!(session = %self.id, cleared = cleared.len(), "Proposal cleared");
        Ok(cleared.len())
    }

    /// Validate and freeze the proposal, then open the confirmation surface.
    pub async fn lock_proposal(self: &Arc<Self>, actor: &Participant) -> Result<(), FusionError> {
        self.authorize(actor)?;
        let mut state = self.state.lock().await;
        match state.phase {
            SessionPhase::Selecting => {}
            SessionPhase::Locked | SessionPhase::Confirming => {
                return Err(FusionError::AlreadyLocked);
            }
            SessionPhase::Completed | SessionPhase::Failed | SessionPhase::Cancelled => {
                return Err(FusionError::SessionEnded);
            }
        }

        let fresh = self.validate_proposal(&state.proposal)?;
        state.proposal = fresh;
        state.proposal_locked = true;
        state.phase = SessionPhase::Locked;
        if let Some(task) = state.refresh.take() {
            task.abort();
        }
        state.surface.stop();
        state.surface = Surface::confirmation(self.ctx.config.confirmation_timeout());
        state
            .header
            .set("You can now confirm to conclude this fusion.", Tone::Pending);
        state.watchdog = Some(TimerTask::spawn(confirmation_watchdog(
            Arc::downgrade(self),
            state.surface.deadline(),
        )));

        tracing::info!(
            session = %self.id,
            player = %self.participant.id,
            items = state.proposal.len(),
            "Fusion proposal locked"
        );
        self.publish(&state).await;
        Ok(())
    }

    /// Re-read every proposed item and check the level's requirements.
    fn validate_proposal(&self, proposal: &[Item]) -> Result<Vec<Item>, FusionError> {
        let mut fresh = Vec::with_capacity(proposal.len());
        for item in proposal {
            let current = self.ctx.store.reload(item.id)?;
            if current.owner != self.participant.id {
                tracing::warn!(
                    session = %self.id,
                    item = %item.id,
                    owner = %current.owner,
                    "Proposed item changed owner before lock"
                );
                return Err(FusionError::OwnershipChanged(item.id));
            }
            fresh.push(current);
        }

        if fresh.len() != self.plan.required {
            return Err(FusionError::WrongCount {
                required: self.plan.required,
                actual: fresh.len(),
            });
        }
        if let Some(first) = fresh.first()
            && fresh.iter().any(|item| !item.same_kind(first))
        {
            return Err(FusionError::MixedKinds);
        }
        if let Some(required) = self.plan.input_tier
            && let Some(item) = fresh.iter().find(|item| item.tier != Some(required))
        {
            return Err(FusionError::WrongTier {
                item: item.id,
                required,
            });
        }
        Ok(fresh)
    }

    /// Accept the locked proposal and run the conversion.
    ///
    /// The session mutex is held until a terminal phase is reached, so a
    /// second call always observes the first one's result.
    pub async fn confirm(&self, actor: &Participant) -> Result<FusionOutcome, FusionError> {
        self.authorize(actor)?;
        let mut state = self.state.lock().await;
        match state.phase {
            SessionPhase::Locked => {}
            SessionPhase::Selecting => return Err(FusionError::NotLocked),
            SessionPhase::Confirming | SessionPhase::Completed | SessionPhase::Failed => {
                return Err(FusionError::AlreadyAccepted);
            }
            SessionPhase::Cancelled => return Err(FusionError::SessionEnded),
        }

        state.phase = SessionPhase::Confirming;
        state.stop_timers(CancelOrigin::Participant);
        state.surface.disable();

        let name = &self.ctx.config.collectible_name;
        let outcome = match self.convert(&state.proposal) {
            Ok((item, experience)) => {
                tracing::info!(
                    session = %self.id,
                    player = %self.participant.id,
                    item = %item.id,
                    experience,
                    "Fusion completed"
                );
                state.phase = SessionPhase::Completed;
                state.header.set("Fusion done!", Tone::Success);
                FusionOutcome::Completed { item, experience }
            }
            Err(ConversionError::OwnershipMismatch {
                item,
                expected,
                actual,
            }) => {
                tracing::warn!(
                    session = %self.id,
                    item = %item,
                    %expected,
                    %actual,
                    "Fusion input changed owner after lock"
                );
                state.phase = SessionPhase::Failed;
                state.header.set(
                    format!(
                        "\u{26a0}\u{fe0f} An attempt to modify the {name}s during the fusion \
                         was detected and the fusion was cancelled."
                    ),
                    Tone::Danger,
                );
                FusionOutcome::Tampered { item }
            }
            Err(err) => {
                tracing::error!(
                    session = %self.id,
                    player = %self.participant.id,
                    "Fusion conversion failed: {err}"
                );
                state.phase = SessionPhase::Failed;
                state.header.set(
                    format!("An error occurred when concluding the fusion of your {name}s."),
                    Tone::Danger,
                );
                FusionOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };

        self.release_reservations(&mut state);
        self.publish(&state).await;
        Ok(outcome)
    }

    /// Run the store conversion, then award experience unless the store did
    /// so in the same commit. The returned amount is what was recorded.
    fn convert(&self, proposal: &[Item]) -> Result<(Item, u64), ConversionError> {
        let roll = self.ctx.roller.roll(&self.ctx.config.rewards);
        let experience = self.ctx.config.rewards.xp_per_level * u64::from(self.plan.level.get());
        let request = ConversionRequest {
            owner: self.participant.id,
            inputs: proposal.iter().map(|item| item.id).collect(),
            tier: self.plan.result_tier,
            shiny: roll.shiny,
            attack_bonus: roll.attack_bonus,
            health_bonus: roll.health_bonus,
            experience,
        };
        let conversion = self.ctx.store.convert(&request)?;
        if conversion.experience_total.is_some() {
            return Ok((conversion.item, experience));
        }

        // Inputs are already consumed: an award failure still completes.
        match self
            .ctx
            .ledger
            .award_experience(self.participant.id, experience)
        {
            Ok(_) => Ok((conversion.item, experience)),
            Err(err) => {
                tracing::error!(
                    session = %self.id,
                    player = %self.participant.id,
                    item = %conversion.item.id,
                    experience,
                    "Fused item created but awarding experience failed: {err}"
                );
                Ok((conversion.item, 0))
            }
        }
    }

    /// Cancel on the participant's request.
    pub async fn user_cancel(&self, actor: &Participant) -> Result<(), FusionError> {
        self.authorize(actor)?;
        let mut state = self.state.lock().await;
        match state.phase {
            SessionPhase::Selecting | SessionPhase::Locked => {}
            SessionPhase::Confirming => return Err(FusionError::AlreadyAccepted),
            SessionPhase::Completed | SessionPhase::Failed | SessionPhase::Cancelled => {
                return Err(FusionError::SessionEnded);
            }
        }
        state.user_cancelled = true;
        self.cancel_locked(&mut state, CANCEL_REASON, Tone::Danger, CancelOrigin::Participant)
            .await;
        Ok(())
    }

    /// Cancel from outside the participant's controls. Returns `false` when the
    /// session had already ended.
    pub async fn cancel(&self, reason: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.phase.is_terminal() {
            return false;
        }
        self.cancel_locked(&mut state, reason, Tone::Danger, CancelOrigin::External)
            .await;
        true
    }

    /// Called by the registry when it drops a session that is no longer live.
    pub(crate) async fn reap(&self) {
        let mut state = self.state.lock().await;
        if !state.phase.is_terminal() {
            self.cancel_locked(&mut state, TIMEOUT_REASON, Tone::Expired, CancelOrigin::Registry)
                .await;
        }
    }

    async fn expire(&self, origin: CancelOrigin) {
        let mut state = self.state.lock().await;
        let due = match origin {
            CancelOrigin::Watchdog => state.phase == SessionPhase::Locked,
            _ => !state.phase.is_terminal() && state.phase != SessionPhase::Confirming,
        };
        if due {
            self.cancel_locked(&mut state, TIMEOUT_REASON, Tone::Expired, origin)
                .await;
        }
    }

    async fn cancel_locked(
        &self,
        state: &mut SessionState,
        reason: &str,
        tone: Tone,
        origin: CancelOrigin,
    ) {
        state.stop_timers(origin);
        self.release_reservations(state);
        state.surface.disable();
        state.phase = SessionPhase::Cancelled;
        state.header.set(format!("**{reason}**"), tone);
        tracing::info!(
            session = %self.id,
            player = %self.participant.id,
            ?origin,
            "Fusion cancelled: {reason}"
        );
        self.publish(state).await;
    }

    fn release_reservations(&self, state: &mut SessionState) {
        if state.reservations_released {
            return;
        }
        state.reservations_released = true;
        let released = self
            .ctx
            .locks
            .release_all(state.proposal.iter().map(|item| item.id), self.id);
        tracing::debug!(session = %self.id, released, "Reservations released");
    }

    async fn refresh(&self) -> Result<(), ChannelError> {
        let state = self.state.lock().await;
        if state.phase != SessionPhase::Selecting {
            return Ok(());
        }
        let Some(message) = state.message else {
            return Ok(());
        };
        let view = self.compose_view(&state);
        self.channel.edit(message, view).await
    }

    /// Render the current state into the card, logging transport failures.
    async fn publish(&self, state: &SessionState) {
        let Some(message) = state.message else {
            return;
        };
        let view = self.compose_view(state);
        if let Err(err) = self.channel.edit(message, view).await {
            tracing::error!(
                session = %self.id,
                player = %self.participant.id,
                "Failed to update the fusion card: {err}"
            );
        }
    }

    fn compose_view(&self, state: &SessionState) -> RenderedView {
        let view = self.compose(state, false);
        if view.len() > MAX_VIEW_LEN {
            self.compose(state, true)
        } else {
            view
        }
    }

    fn compose(&self, state: &SessionState, compact: bool) -> RenderedView {
        let snapshot = ProposalSnapshot {
            participant: &self.participant,
            marker: state.marker(),
            locked: state.proposal_locked,
            items: &state.proposal,
        };
        RenderedView {
            content: state.header.content.clone(),
            title: state.header.title.clone(),
            description: state.header.description.clone(),
            tone: state.header.tone,
            fields: self.ctx.renderer.proposal_fields(&snapshot, compact),
            footer: state.header.footer.clone(),
            controls: state.surface.controls(),
        }
    }
}

/// Re-render the card every `interval` until the session ends or `lifetime`
/// has passed.
async fn refresh_loop(session: Weak<FusionSession>, interval: Duration, lifetime: Duration) {
    let started = Instant::now();
    loop {
        sleep(interval).await;
        let Some(session) = session.upgrade() else {
            return;
        };
        if started.elapsed() > lifetime {
            session.expire(CancelOrigin::RefreshLoop).await;
            return;
        }
        if let Err(err) = session.refresh().await {
            tracing::error!(
                session = %session.id,
                player = %session.participant.id,
                "Failed to refresh the fusion card: {err}"
            );
            session.expire(CancelOrigin::RefreshLoop).await;
            return;
        }
    }
}

async fn confirmation_watchdog(session: Weak<FusionSession>, deadline: Instant) {
    sleep_until(deadline).await;
    if let Some(session) = session.upgrade() {
        session.expire(CancelOrigin::Watchdog).await;
    }
}
