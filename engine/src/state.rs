//! Session state machine types.

use std::fmt;
use std::future::Future;

use futures_util::future::{AbortHandle, Abortable};

use fusion_config::{FusionConfig, LevelPlan};
use fusion_types::{Item, Participant};

use crate::channel::MessageId;
use crate::error::FusionError;
use crate::surface::Surface;
use crate::view::{ProposalMarker, Tone};

/// Lifecycle of one fusion attempt.
///
/// Transitions: Selecting -> Locked -> Confirming -> {Completed, Failed};
/// Selecting | Locked -> Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Proposal is editable.
    Selecting,
    /// Proposal validated and frozen, waiting for confirmation.
    Locked,
    /// Confirmed; conversion in progress.
    Confirming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Completed | SessionPhase::Failed | SessionPhase::Cancelled
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Selecting => "selecting",
            SessionPhase::Locked => "locked",
            SessionPhase::Confirming => "confirming",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
            SessionPhase::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path asked for a cancellation.
///
/// A background task that cancels its own session must not abort itself
/// halfway through the final render, so it is detached instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelOrigin {
    Participant,
    External,
    RefreshLoop,
    Watchdog,
    Registry,
}

/// Handle to a background task bound to one session.
#[derive(Debug)]
pub(crate) struct TimerTask {
    abort_handle: AbortHandle,
}

impl TimerTask {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (abort_handle, registration) = AbortHandle::new_pair();
        drop(tokio::spawn(Abortable::new(future, registration)));
        Self { abort_handle }
    }

    pub(crate) fn abort(self) {
        self.abort_handle.abort();
    }

    /// Drop the handle but let the task run to completion.
    pub(crate) fn detach(self) {}
}

/// Card text that changes with the lifecycle; fields are rebuilt on every render.
#[derive(Debug, Clone)]
pub(crate) struct ViewHeader {
    pub(crate) content: Option<String>,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) tone: Tone,
    pub(crate) footer: Option<String>,
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl ViewHeader {
    pub(crate) fn selection(config: &FusionConfig, participant: &Participant, plan: LevelPlan) -> Self {
        let name = &config.collectible_name;
        let minutes = config.timing.session_lifetime_secs / 60;
        let mut description = format!(
            "Add or remove {name}s you want to fuse into a better {name} \
             using the `add` and `remove` commands.\n\
             Once you're finished, click the lock button below to confirm your fusion.\n\
             You have to use exactly {} {name}s to fuse into a better one.\n",
            plan.required
        );
        if plan.input_tier.is_some() {
            description.push_str(
                "\nYou are upgrading past the first level: \
                 only use cards produced by the previous level.\n",
            );
        }
        description.push_str(&format!(
            "*You have {minutes} minutes before this interaction ends.*"
        ));

        Self {
            content: Some(format!("{} started fusioning", participant.name)),
            title: format!("{}s fusion (level {})", capitalize(name), plan.level),
            description,
            tone: Tone::Pending,
            footer: Some(format!(
                "This message is updated every {} seconds, \
                 but you can keep on editing your proposal.",
                config.timing.refresh_interval_secs
            )),
        }
    }

    pub(crate) fn set(&mut self, description: impl Into<String>, tone: Tone) {
        self.content = None;
        self.description = description.into();
        self.tone = tone;
    }
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) phase: SessionPhase,
    pub(crate) proposal: Vec<Item>,
    /// Set once the proposal passes validation; never cleared.
    pub(crate) proposal_locked: bool,
    /// The participant pressed cancel (as opposed to a timeout).
    pub(crate) user_cancelled: bool,
    pub(crate) surface: Surface,
    pub(crate) header: ViewHeader,
    pub(crate) message: Option<MessageId>,
    pub(crate) refresh: Option<TimerTask>,
    pub(crate) watchdog: Option<TimerTask>,
    pub(crate) reservations_released: bool,
}

impl SessionState {
    pub(crate) fn new(surface: Surface, header: ViewHeader) -> Self {
        Self {
            phase: SessionPhase::Selecting,
            proposal: Vec::new(),
            proposal_locked: false,
            user_cancelled: false,
            surface,
            header,
            message: None,
            refresh: None,
            watchdog: None,
            reservations_released: false,
        }
    }

    pub(crate) fn marker(&self) -> ProposalMarker {
        match self.phase {
            SessionPhase::Cancelled => ProposalMarker::Cancelled,
            SessionPhase::Confirming | SessionPhase::Completed | SessionPhase::Failed => {
                ProposalMarker::Accepted
            }
            SessionPhase::Locked => ProposalMarker::Locked,
            SessionPhase::Selecting => ProposalMarker::None,
        }
    }

    pub(crate) fn ensure_editable(&self) -> Result<(), FusionError> {
        match self.phase {
            SessionPhase::Selecting => Ok(()),
            SessionPhase::Locked | SessionPhase::Confirming => Err(FusionError::ProposalLocked),
            SessionPhase::Completed | SessionPhase::Failed | SessionPhase::Cancelled => {
                Err(FusionError::SessionEnded)
            }
        }
    }

    pub(crate) fn stop_timers(&mut self, origin: CancelOrigin) {
        if let Some(task) = self.refresh.take() {
            if origin == CancelOrigin::RefreshLoop {
                task.detach();
            } else {
                task.abort();
            }
        }
        if let Some(task) = self.watchdog.take() {
            if origin == CancelOrigin::Watchdog {
                task.detach();
            } else {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        assert!(!SessionPhase::Selecting.is_terminal());
        assert!(!SessionPhase::Locked.is_terminal());
        assert!(!SessionPhase::Confirming.is_terminal());
        assert!(SessionPhase::Completed.is_terminal());
        assert!(SessionPhase::Failed.is_terminal());
        assert!(SessionPhase::Cancelled.is_terminal());
    }

    #[test]
    fn capitalize_first_letter_only() {
        assert_eq!(capitalize("countryball"), "Countryball");
        assert_eq!(capitalize(""), "");
    }
}
