//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests: a command surface over an
//! in-memory SQLite store and a recording channel.

#![allow(dead_code)]

use std::sync::Arc;

use fusion_config::{FusionConfig, LevelRule};
use fusion_engine::{
    AddOutcome, FixedRoller, FusionCommands, FusionContext, FusionSession, MemoryChannel,
    RewardRoll,
};
use fusion_store::{ExperienceLedger, ItemStore, LockRegistry, SqliteStore};
use fusion_types::{Item, Kind, NewItem, Participant, ScopeKey, TierId};

pub const SCOPE: ScopeKey = ScopeKey::new(100, 1);

pub const ROLL: RewardRoll = RewardRoll {
    shiny: true,
    attack_bonus: 12,
    health_bonus: -7,
};

pub struct Fixture {
    pub commands: FusionCommands,
    pub store: Arc<SqliteStore>,
    pub locks: Arc<LockRegistry>,
    pub channel: Arc<MemoryChannel>,
    pub kind: Kind,
    pub player: Participant,
}

/// Two levels: ten plain items make a tier 1 item, five tier 1 items make a
/// tier 2 item.
pub fn two_level_config() -> FusionConfig {
    FusionConfig::with_levels(vec![
        LevelRule {
            required: 10,
            result_tier: TierId::new(1),
        },
        LevelRule {
            required: 5,
            result_tier: TierId::new(2),
        },
    ])
    .expect("valid level table")
}

pub fn fixture() -> Fixture {
    fixture_with_store(SqliteStore::open_in_memory().expect("in-memory store"))
}

pub fn fixture_with_store(store: SqliteStore) -> Fixture {
    let store = Arc::new(store);
    fixture_with_ledger(store.clone(), store)
}

/// Items live in `store`; experience awarded outside a conversion goes to
/// `ledger`.
pub fn fixture_with_ledger(store: Arc<SqliteStore>, ledger: Arc<dyn ExperienceLedger>) -> Fixture {
    let kind = store.ensure_kind("Germany").expect("kind");
    let player = Participant::new(store.player_named("ada").expect("player"), "ada");
    let locks = Arc::new(LockRegistry::new());
    let ctx = FusionContext::new(
        Arc::new(two_level_config()),
        store.clone(),
        ledger,
        locks.clone(),
    )
    .with_roller(Arc::new(FixedRoller(ROLL)));

    Fixture {
        commands: FusionCommands::new(ctx),
        store,
        locks,
        channel: Arc::new(MemoryChannel::new()),
        kind,
        player,
    }
}

impl Fixture {
    pub fn grant(&self, count: usize, tier: Option<TierId>) -> Vec<Item> {
        (0..count)
            .map(|_| {
                let mut item = NewItem::plain(self.kind.id, self.player.id);
                item.tier = tier;
                self.store.create(&item).expect("create item")
            })
            .collect()
    }

    pub async fn begin(&self, level: i64) -> Arc<FusionSession> {
        self.commands
            .begin(SCOPE, self.player.clone(), level, self.channel.clone())
            .await
            .expect("begin fusion")
    }

    pub async fn propose(&self, items: &[Item]) {
        for item in items {
            let outcome = self
                .commands
                .add(SCOPE, &self.player, item.id)
                .await
                .expect("add item");
            assert!(matches!(outcome, AddOutcome::Added(_)));
        }
    }

    pub fn owned(&self) -> Vec<Item> {
        self.store
            .items_owned_by(self.player.id)
            .expect("list owned items")
    }
}
