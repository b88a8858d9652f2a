//! Core domain types for Fusion.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

#![allow(clippy::missing_errors_doc)]

mod ids;

pub use ids::{ItemId, KindId, PlayerId, ScopeKey, SessionId, TierId};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Kinds & Items
// ============================================================================

/// The template an item was minted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kind {
    pub id: KindId,
    pub name: String,
    /// Items of untradeable kinds can never enter a proposal.
    pub tradeable: bool,
}

impl Kind {
    #[must_use]
    pub fn new(id: KindId, name: impl Into<String>, tradeable: bool) -> Self {
        Self {
            id,
            name: name.into(),
            tradeable,
        }
    }
}

/// One owned, individually stateful collectible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub kind: Kind,
    pub owner: PlayerId,
    /// Tier marker left by the fusion level that produced this item.
    pub tier: Option<TierId>,
    pub favorite: bool,
    pub shiny: bool,
    pub attack_bonus: i32,
    pub health_bonus: i32,
}

impl Item {
    #[must_use]
    pub fn is_tradeable(&self) -> bool {
        self.kind.tradeable
    }

    #[must_use]
    pub fn same_kind(&self, other: &Item) -> bool {
        self.kind.id == other.kind.id
    }

    /// One-line human description used in proposal listings.
    ///
    /// The short form drops stats and markers so large proposals still fit.
    #[must_use]
    pub fn description(&self, short: bool) -> String {
        if short {
            return format!("{} {}", self.id, self.kind.name);
        }
        let mut text = format!("{} {}", self.id, self.kind.name);
        if self.shiny {
            text.push_str(" \u{2728}");
        }
        if let Some(tier) = self.tier {
            text.push_str(&format!(" [T{tier}]"));
        }
        if self.favorite {
            text.push_str(" \u{2764}\u{fe0f}");
        }
        text.push_str(&format!(
            " (ATK:{:+}% HP:{:+}%)",
            self.attack_bonus, self.health_bonus
        ));
        text
    }
}

/// Attributes of an item about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub kind: KindId,
    pub owner: PlayerId,
    pub tier: Option<TierId>,
    pub favorite: bool,
    pub shiny: bool,
    pub attack_bonus: i32,
    pub health_bonus: i32,
}

impl NewItem {
    /// A plain, unmarked item with zero bonuses.
    #[must_use]
    pub fn plain(kind: KindId, owner: PlayerId) -> Self {
        Self {
            kind,
            owner,
            tier: None,
            favorite: false,
            shiny: false,
            attack_bonus: 0,
            health_bonus: 0,
        }
    }

    #[must_use]
    pub fn with_tier(mut self, tier: TierId) -> Self {
        self.tier = Some(tier);
        self
    }

    #[must_use]
    pub fn with_favorite(mut self, favorite: bool) -> Self {
        self.favorite = favorite;
        self
    }
}

// ============================================================================
// Participants
// ============================================================================

/// A user taking part in a fusion.
///
/// Equality and hashing use the stable player id only; the display name is
/// cosmetic and may change between interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: PlayerId,
    pub name: String,
}

impl Participant {
    #[must_use]
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Participant {}

impl Hash for Participant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ============================================================================
// Levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fusion level {requested} does not exist (levels 1..={max})")]
pub struct InvalidLevel {
    pub requested: i64,
    pub max: u32,
}

/// A 1-indexed fusion level, validated against the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(NonZeroU32);

impl Level {
    pub const FIRST: Level = Level(NonZeroU32::MIN);

    pub fn new(requested: i64, max: u32) -> Result<Self, InvalidLevel> {
        let err = InvalidLevel { requested, max };
        let value = u32::try_from(requested).map_err(|_| err)?;
        if value > max {
            return Err(err);
        }
        NonZeroU32::new(value).map(Self).ok_or(err)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Zero-based position of this level in per-level tables.
    #[must_use]
    pub const fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// The level whose output this level consumes, if any.
    #[must_use]
    pub fn previous(self) -> Option<Level> {
        NonZeroU32::new(self.0.get() - 1).map(Level)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
