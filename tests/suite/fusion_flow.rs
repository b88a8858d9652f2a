//! End-to-end fusion scenarios through the command surface.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use fusion_engine::{FusionError, FusionOutcome, SessionPhase, TIMEOUT_REASON, Tone};
use fusion_store::{ExperienceLedger, ItemStore, SqliteStore, StoreError};
use fusion_types::{PlayerId, ScopeKey, TierId};

use crate::common::{ROLL, SCOPE, fixture, fixture_with_ledger};

#[tokio::test]
async fn ten_items_fuse_into_one() {
    let f = fixture();
    let items = f.grant(10, None);
    f.begin(1).await;
    f.propose(&items).await;
    f.commands.lock(SCOPE, &f.player).await.unwrap();

    let outcome = f.commands.confirm(SCOPE, &f.player).await.unwrap();
    let FusionOutcome::Completed { item, experience } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(experience, 50);
    assert_eq!(item.tier, Some(TierId::new(1)));
    assert_eq!(item.shiny, ROLL.shiny);
    assert_eq!(item.attack_bonus, ROLL.attack_bonus);
    assert_eq!(item.health_bonus, ROLL.health_bonus);

    let owned = f.owned();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, item.id);
    assert_eq!(f.store.experience(f.player.id).unwrap(), 50);
    assert!(f.locks.is_empty());
}

#[tokio::test]
async fn fused_items_feed_the_next_level() {
    let f = fixture();
    let upgraded = f.grant(5, Some(TierId::new(1)));
    f.begin(2).await;
    f.propose(&upgraded).await;
    f.commands.lock(SCOPE, &f.player).await.unwrap();

    let outcome = f.commands.confirm(SCOPE, &f.player).await.unwrap();
    let FusionOutcome::Completed { item, experience } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(item.tier, Some(TierId::new(2)));
    assert_eq!(experience, 100);
}

#[tokio::test]
async fn reserved_item_cannot_join_another_fusion() {
    let f = fixture();
    let items = f.grant(1, None);
    f.begin(1).await;
    f.propose(&items).await;

    let elsewhere = ScopeKey::new(200, 1);
    f.commands
        .begin(elsewhere, f.player.clone(), 1, f.channel.clone())
        .await
        .unwrap();
    let err = f
        .commands
        .add(elsewhere, &f.player, items[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, FusionError::ItemLocked(_)));
}

#[tokio::test]
async fn short_proposal_cannot_lock() {
    let f = fixture();
    let items = f.grant(7, None);
    let session = f.begin(1).await;
    f.propose(&items).await;

    let err = f.commands.lock(SCOPE, &f.player).await.unwrap_err();
    assert!(matches!(
        err,
        FusionError::WrongCount {
            required: 10,
            actual: 7
        }
    ));
    assert_eq!(session.phase().await, SessionPhase::Selecting);
    assert_eq!(f.locks.len(), 7);
}

#[tokio::test(start_paused = true)]
async fn abandoned_fusion_times_out() {
    let f = fixture();
    let items = f.grant(3, None);
    let session = f.begin(1).await;
    f.propose(&items).await;

    sleep(Duration::from_secs(700)).await;

    assert_eq!(session.phase().await, SessionPhase::Cancelled);
    assert!(f.locks.is_empty());
    assert_eq!(f.owned().len(), 3);
    let view = f.channel.last_view().unwrap();
    assert_eq!(view.description, format!("**{TIMEOUT_REASON}**"));
    assert_eq!(view.tone, Tone::Expired);

    let err = f.commands.lock(SCOPE, &f.player).await.unwrap_err();
    assert!(matches!(err, FusionError::NoActiveSession));
}

#[tokio::test]
async fn transfer_during_confirmation_changes_nothing() {
    let f = fixture();
    let items = f.grant(10, None);
    let session = f.begin(1).await;
    f.propose(&items).await;
    f.commands.lock(SCOPE, &f.player).await.unwrap();

    f.store.transfer(items[9].id, PlayerId::new(4242)).unwrap();

    let outcome = f.commands.confirm(SCOPE, &f.player).await.unwrap();
    assert_eq!(outcome, FusionOutcome::Tampered { item: items[9].id });
    assert_eq!(session.phase().await, SessionPhase::Failed);
    assert_eq!(f.owned().len(), 9);
    assert_eq!(f.store.reload(items[9].id).unwrap().owner, PlayerId::new(4242));
    assert_eq!(f.store.experience(f.player.id).unwrap(), 0);
    assert!(f.locks.is_empty());
}

#[tokio::test]
async fn fusion_can_restart_after_cancel() {
    let f = fixture();
    let items = f.grant(10, None);
    f.begin(1).await;
    f.propose(&items[..4]).await;
    f.commands.cancel(SCOPE, &f.player).await.unwrap();
    assert!(f.locks.is_empty());

    f.begin(1).await;
    f.propose(&items).await;
    f.commands.lock(SCOPE, &f.player).await.unwrap();
    let outcome = f.commands.confirm(SCOPE, &f.player).await.unwrap();
    assert!(outcome.is_success());
}

struct UnreachableLedger;

impl ExperienceLedger for UnreachableLedger {
    fn award_experience(&self, _player: PlayerId, _amount: u64) -> Result<u64, StoreError> {
        Err(StoreError::Io {
            path: PathBuf::from("experience"),
            source: io::Error::other("ledger unreachable"),
        })
    }

    fn experience(&self, _player: PlayerId) -> Result<u64, StoreError> {
        Ok(0)
    }
}

#[tokio::test]
async fn experience_commits_with_the_conversion() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let f = fixture_with_ledger(store, Arc::new(UnreachableLedger));
    let items = f.grant(10, None);
    f.begin(1).await;
    f.propose(&items).await;
    f.commands.lock(SCOPE, &f.player).await.unwrap();

    let outcome = f.commands.confirm(SCOPE, &f.player).await.unwrap();
    let FusionOutcome::Completed { experience, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(experience, 50);
    assert_eq!(f.store.experience(f.player.id).unwrap(), 50);
    assert_eq!(f.owned().len(), 1);
}
