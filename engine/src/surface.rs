//! The interactive surface currently attached to a session's card.
//!
//! A session starts on the selection surface and swaps to the confirmation
//! surface when its proposal locks. Each surface has its own deadline; once it
//! is stopped or past its deadline it is finished and no longer routes input.

use std::time::Duration;

use tokio::time::Instant;

use crate::view::{Controls, SurfaceKind};

#[derive(Debug, Clone, Copy)]
pub struct SurfaceState {
    opened_at: Instant,
    timeout: Duration,
    stopped: bool,
    disabled: bool,
}

impl SurfaceState {
    fn open(timeout: Duration) -> Self {
        Self {
            opened_at: Instant::now(),
            timeout,
            stopped: false,
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Surface {
    Selection(SurfaceState),
    Confirmation(SurfaceState),
}

impl Surface {
    #[must_use]
    pub fn selection(timeout: Duration) -> Self {
        Surface::Selection(SurfaceState::open(timeout))
    }

    #[must_use]
    pub fn confirmation(timeout: Duration) -> Self {
        Surface::Confirmation(SurfaceState::open(timeout))
    }

    fn state(&self) -> &SurfaceState {
        match self {
            Surface::Selection(state) | Surface::Confirmation(state) => state,
        }
    }

    fn state_mut(&mut self) -> &mut SurfaceState {
        match self {
            Surface::Selection(state) | Surface::Confirmation(state) => state,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SurfaceKind {
        match self {
            Surface::Selection(_) => SurfaceKind::Selection,
            Surface::Confirmation(_) => SurfaceKind::Confirmation,
        }
    }

    /// Stop routing input. The controls stay visible until disabled.
    pub fn stop(&mut self) {
        self.state_mut().stopped = true;
    }

    /// Stop and grey out every control.
    pub fn disable(&mut self) {
        let state = self.state_mut();
        state.stopped = true;
        state.disabled = true;
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        let state = self.state();
        state.stopped || state.opened_at.elapsed() > state.timeout
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        let state = self.state();
        state.opened_at + state.timeout
    }

    #[must_use]
    pub fn controls(&self) -> Controls {
        Controls {
            surface: self.kind(),
            disabled: self.state().disabled,
        }
    }
}
