//! Fusions against a file-backed store.

use fusion_store::{ExperienceLedger, ItemStore, SqliteStore};
use fusion_types::TierId;
use tempfile::tempdir;

use crate::common::{SCOPE, fixture_with_store};

#[tokio::test]
async fn completed_fusion_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("fusion.db");

    let created = {
        let f = fixture_with_store(SqliteStore::open(&path).unwrap());
        let items = f.grant(10, None);
        f.begin(1).await;
        f.propose(&items).await;
        f.commands.lock(SCOPE, &f.player).await.unwrap();
        let outcome = f.commands.confirm(SCOPE, &f.player).await.unwrap();
        assert!(outcome.is_success());
        f.owned()
    };

    let store = SqliteStore::open(&path).unwrap();
    let player = store.player_named("ada").unwrap();
    let owned = store.items_owned_by(player).unwrap();
    assert_eq!(owned, created);
    assert_eq!(owned[0].tier, Some(TierId::new(1)));
    assert_eq!(store.experience(player).unwrap(), 50);
}
