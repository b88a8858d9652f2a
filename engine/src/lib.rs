//! Core engine for Fusion: the session state machine and its orchestration.
//!
//! A participant opens a [`FusionSession`] for a level, fills a proposal with
//! owned items, locks it and confirms. Confirmation converts the locked items
//! into one upgraded item through the [`ItemStore`](fusion_store::ItemStore)
//! and awards experience. Sessions render into a [`MessageChannel`]; the
//! [`SessionRegistry`] indexes the live ones and [`FusionCommands`] is the
//! surface front-ends drive.
//!
//! ```text
//! FusionCommands
//! ├── SessionRegistry (scope -> sessions, reaps dead ones on lookup)
//! └── FusionSession
//!     ├── SessionState (phase, proposal, surface, timers)
//!     ├── FusionContext (config, store, ledger, locks, renderer, roller)
//!     └── MessageChannel (send / edit / confirm)
//! ```

#![allow(clippy::missing_errors_doc)]

mod channel;
mod commands;
mod context;
mod error;
mod registry;
mod reward;
mod session;
mod state;
mod surface;
mod view;

pub use channel::{ChannelError, ChannelFut, MemoryChannel, MessageChannel, MessageId};
pub use commands::{AddOutcome, CommandSpec, FusionCommands, command_specs};
pub use context::FusionContext;
pub use error::FusionError;
pub use registry::SessionRegistry;
pub use reward::{FixedRoller, RandomRoller, RewardRoll, RewardRoller};
pub use session::{CANCEL_REASON, FusionOutcome, FusionSession, TIMEOUT_REASON};
pub use state::SessionPhase;
pub use surface::Surface;
pub use view::{
    Controls, MAX_FIELD_LEN, MAX_VIEW_LEN, ProposalMarker, ProposalRenderer, ProposalSnapshot,
    RenderedView, SurfaceKind, TextRenderer, Tone, ViewField,
};

pub use fusion_config::{FusionConfig, LevelPlan};
