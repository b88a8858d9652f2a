//! SQLite-backed item store.
//!
//! Kinds, items and player experience share one database so a conversion
//! (verify owners, delete inputs, insert output, award experience) commits as
//! a single transaction or not at all.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension, Row, params};

use fusion_types::{Item, ItemId, Kind, KindId, NewItem, PlayerId};

use crate::sqlite_security::prepare_db_path;
use crate::{
    Conversion, ConversionError, ConversionRequest, ExperienceLedger, ItemStore, StoreError,
};

const ITEM_COLUMNS: &str = "i.id, i.owner, i.tier, i.favorite, i.shiny, i.attack_bonus, \
     i.health_bonus, k.id, k.name, k.tradeable";

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS kinds (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            tradeable INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY,
            kind_id INTEGER NOT NULL,
            owner INTEGER NOT NULL,
            tier INTEGER,
            favorite INTEGER NOT NULL DEFAULT 0,
            shiny INTEGER NOT NULL DEFAULT 0,
            attack_bonus INTEGER NOT NULL DEFAULT 0,
            health_bonus INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (kind_id) REFERENCES kinds(id)
        );

        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY,
            name TEXT UNIQUE,
            experience INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_items_owner
        ON items(owner);
    ";

    /// Open or create the store database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        prepare_db_path(path)?;
        let db = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "Opened fusion item store");
        Self::initialize(db)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;")?;
        db.execute_batch(Self::SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_kind(&self, name: &str, tradeable: bool) -> Result<Kind, StoreError> {
        let db = self.conn();
        db.execute(
            "INSERT INTO kinds (name, tradeable) VALUES (?1, ?2)",
            params![name, tradeable],
        )?;
        Ok(Kind::new(KindId::new(db.last_insert_rowid()), name, tradeable))
    }

    pub fn kind_by_name(&self, name: &str) -> Result<Option<Kind>, StoreError> {
        let db = self.conn();
        let kind = db
            .query_row(
                "SELECT id, name, tradeable FROM kinds WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Kind::new(
                        KindId::new(row.get(0)?),
                        row.get::<_, String>(1)?,
                        row.get(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(kind)
    }

    /// Look a kind up by name, creating a tradeable one if it is unknown.
    pub fn ensure_kind(&self, name: &str) -> Result<Kind, StoreError> {
        match self.kind_by_name(name)? {
            Some(kind) => Ok(kind),
            None => self.insert_kind(name, true),
        }
    }

    /// Id of the player registered under `name`, registering them on first use.
    pub fn player_named(&self, name: &str) -> Result<PlayerId, StoreError> {
        let id: i64 = self.conn().query_row(
            "INSERT INTO players (name) VALUES (?1)
             ON CONFLICT(name) DO UPDATE SET name = excluded.name
             RETURNING id",
            params![name],
            |row| row.get(0),
        )?;
        Ok(PlayerId::new(id))
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: ItemId::new(row.get(0)?),
        owner: PlayerId::new(row.get(1)?),
        tier: row.get::<_, Option<i64>>(2)?.map(fusion_types::TierId::new),
        favorite: row.get(3)?,
        shiny: row.get(4)?,
        attack_bonus: row.get(5)?,
        health_bonus: row.get(6)?,
        kind: Kind::new(KindId::new(row.get(7)?), row.get::<_, String>(8)?, row.get(9)?),
    })
}

fn load_item(db: &Connection, id: ItemId) -> Result<Item, StoreError> {
    db.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM items i JOIN kinds k ON k.id = i.kind_id WHERE i.id = ?1"),
        params![id.value()],
        item_from_row,
    )
    .optional()?
    .ok_or(StoreError::ItemNotFound(id))
}

fn add_experience(db: &Connection, player: PlayerId, amount: u64) -> Result<u64, StoreError> {
    let amount = i64::try_from(amount).unwrap_or(i64::MAX);
    let total: i64 = db.query_row(
        "INSERT INTO players (id, experience) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET experience = experience + excluded.experience
         RETURNING experience",
        params![player.value(), amount],
        |row| row.get(0),
    )?;
    Ok(u64::try_from(total).unwrap_or(0))
}

fn insert_item(db: &Connection, item: &NewItem) -> Result<ItemId, StoreError> {
    let known: Option<i64> = db
        .query_row(
            "SELECT id FROM kinds WHERE id = ?1",
            params![item.kind.value()],
            |row| row.get(0),
        )
        .optional()?;
    if known.is_none() {
        return Err(StoreError::KindNotFound(item.kind));
    }
    db.execute(
        "INSERT INTO items (kind_id, owner, tier, favorite, shiny, attack_bonus, health_bonus)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            item.kind.value(),
            item.owner.value(),
            item.tier.map(fusion_types::TierId::value),
            item.favorite,
            item.shiny,
            item.attack_bonus,
            item.health_bonus
        ],
    )?;
    Ok(ItemId::new(db.last_insert_rowid()))
}

impl ItemStore for SqliteStore {
    fn reload(&self, id: ItemId) -> Result<Item, StoreError> {
        load_item(&self.conn(), id)
    }

    fn delete(&self, id: ItemId) -> Result<(), StoreError> {
        let changed = self
            .conn()
            .execute("DELETE FROM items WHERE id = ?1", params![id.value()])?;
        if changed == 0 {
            return Err(StoreError::ItemNotFound(id));
        }
        Ok(())
    }

    fn create(&self, item: &NewItem) -> Result<Item, StoreError> {
        let db = self.conn();
        let id = insert_item(&db, item)?;
        load_item(&db, id)
    }

    fn transfer(&self, id: ItemId, new_owner: PlayerId) -> Result<Item, StoreError> {
        let db = self.conn();
        let changed = db.execute(
            "UPDATE items SET owner = ?1, favorite = 0 WHERE id = ?2",
            params![new_owner.value(), id.value()],
        )?;
        if changed == 0 {
            return Err(StoreError::ItemNotFound(id));
        }
        load_item(&db, id)
    }

    fn items_owned_by(&self, owner: PlayerId) -> Result<Vec<Item>, StoreError> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items i JOIN kinds k ON k.id = i.kind_id
             WHERE i.owner = ?1 ORDER BY i.id ASC"
        ))?;
        let items = stmt
            .query_map(params![owner.value()], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn convert(&self, request: &ConversionRequest) -> Result<Conversion, ConversionError> {
        if request.inputs.is_empty() {
            return Err(ConversionError::NoInputs);
        }

        let mut db = self.conn();
        let tx = db.transaction().map_err(StoreError::from)?;

        let mut kind = None;
        for id in &request.inputs {
            let item = load_item(&tx, *id)?;
            if item.owner != request.owner {
                // Dropping `tx` rolls back; nothing has been written yet anyway.
                return Err(ConversionError::OwnershipMismatch {
                    item: item.id,
                    expected: request.owner,
                    actual: item.owner,
                });
            }
            kind.get_or_insert(item.kind.id);
        }
        let kind = kind.ok_or(ConversionError::NoInputs)?;

        for id in &request.inputs {
            tx.execute("DELETE FROM items WHERE id = ?1", params![id.value()])
                .map_err(StoreError::from)?;
        }
        let created_id = insert_item(&tx, &request.output(kind))?;
        let created = load_item(&tx, created_id)?;
        let total = add_experience(&tx, request.owner, request.experience)?;

        tx.commit().map_err(StoreError::from)?;
        tracing::debug!(
            created = %created.id,
            consumed = request.inputs.len(),
            experience = request.experience,
            "Committed fusion conversion"
        );
        Ok(Conversion {
            item: created,
            experience_total: Some(total),
        })
    }
}

impl ExperienceLedger for SqliteStore {
    fn award_experience(&self, player: PlayerId, amount: u64) -> Result<u64, StoreError> {
        add_experience(&self.conn(), player, amount)
    }

    fn experience(&self, player: PlayerId) -> Result<u64, StoreError> {
        let total: Option<i64> = self
            .conn()
            .query_row(
                "SELECT experience FROM players WHERE id = ?1",
                params![player.value()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(total.map_or(0, |total| u64::try_from(total).unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use fusion_types::TierId;

    use super::*;

    const ALICE: PlayerId = PlayerId::new(1);
    const BOB: PlayerId = PlayerId::new(2);

    fn seeded(count: usize) -> (SqliteStore, Kind, Vec<ItemId>) {
        let store = SqliteStore::open_in_memory().unwrap();
        let kind = store.insert_kind("Germany", true).unwrap();
        let ids = (0..count)
            .map(|_| store.create(&NewItem::plain(kind.id, ALICE)).unwrap().id)
            .collect();
        (store, kind, ids)
    }

    fn request(inputs: Vec<ItemId>) -> ConversionRequest {
        ConversionRequest {
            owner: ALICE,
            inputs,
            tier: TierId::new(4),
            shiny: true,
            attack_bonus: -40,
            health_bonus: 40,
            experience: 50,
        }
    }

    #[test]
    fn create_and_reload_round_trip_fields() {
        let (store, kind, _) = seeded(0);
        let created = store
            .create(&NewItem::plain(kind.id, ALICE).with_tier(TierId::new(2)).with_favorite(true))
            .unwrap();
        let reloaded = store.reload(created.id).unwrap();
        assert_eq!(reloaded, created);
        assert_eq!(reloaded.kind.name, "Germany");
        assert!(reloaded.favorite);
        assert_eq!(reloaded.tier, Some(TierId::new(2)));
    }

    #[test]
    fn reload_missing_item_is_not_found() {
        let (store, _, _) = seeded(0);
        assert!(matches!(
            store.reload(ItemId::new(404)),
            Err(StoreError::ItemNotFound(_))
        ));
    }

    #[test]
    fn transfer_changes_owner_and_clears_favorite() {
        let (store, kind, _) = seeded(0);
        let item = store
            .create(&NewItem::plain(kind.id, ALICE).with_favorite(true))
            .unwrap();
        let moved = store.transfer(item.id, BOB).unwrap();
        assert_eq!(moved.owner, BOB);
        assert!(!moved.favorite);
        assert!(store.items_owned_by(ALICE).unwrap().is_empty());
    }

    #[test]
    fn convert_replaces_inputs_with_one_output() {
        let (store, kind, ids) = seeded(10);
        store.award_experience(ALICE, 100).unwrap();
        let conversion = store.convert(&request(ids.clone())).unwrap();
        assert_eq!(conversion.experience_total, Some(150));
        assert_eq!(store.experience(ALICE).unwrap(), 150);

        let created = conversion.item;
        assert_eq!(created.kind.id, kind.id);
        assert_eq!(created.tier, Some(TierId::new(4)));
        assert!(created.shiny);
        assert_eq!((created.attack_bonus, created.health_bonus), (-40, 40));
        for id in ids {
            assert!(matches!(store.reload(id), Err(StoreError::ItemNotFound(_))));
        }
        assert_eq!(store.items_owned_by(ALICE).unwrap(), vec![created]);
    }

    #[test]
    fn convert_with_foreign_item_changes_nothing() {
        let (store, _, ids) = seeded(10);
        store.transfer(ids[9], BOB).unwrap();

        let err = store.convert(&request(ids.clone())).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::OwnershipMismatch { item, .. } if item == ids[9]
        ));
        assert_eq!(store.items_owned_by(ALICE).unwrap().len(), 9);
        assert_eq!(store.items_owned_by(BOB).unwrap().len(), 1);
        assert_eq!(store.experience(ALICE).unwrap(), 0);
    }

    #[test]
    fn convert_with_missing_item_rolls_back() {
        let (store, _, mut ids) = seeded(3);
        ids.push(ItemId::new(999));
        let err = store.convert(&request(ids)).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Store(StoreError::ItemNotFound(_))
        ));
        assert_eq!(store.items_owned_by(ALICE).unwrap().len(), 3);
        assert_eq!(store.experience(ALICE).unwrap(), 0);
    }

    #[test]
    fn players_are_registered_once_by_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.player_named("ada").unwrap();
        assert_eq!(store.player_named("ada").unwrap(), first);
        assert_ne!(store.player_named("grace").unwrap(), first);

        store.award_experience(first, 10).unwrap();
        assert_eq!(store.experience(first).unwrap(), 10);
    }

    #[test]
    fn ensure_kind_reuses_existing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let kind = store.ensure_kind("France").unwrap();
        assert_eq!(store.ensure_kind("France").unwrap(), kind);
    }

    #[test]
    fn experience_upserts() {
        let (store, _, _) = seeded(0);
        assert_eq!(store.experience(ALICE).unwrap(), 0);
        assert_eq!(store.award_experience(ALICE, 50).unwrap(), 50);
        assert_eq!(store.award_experience(ALICE, 100).unwrap(), 150);
        assert_eq!(store.experience(ALICE).unwrap(), 150);
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fusion.db");
        let kind_id = {
            let store = SqliteStore::open(&path).unwrap();
            let kind = store.insert_kind("Japan", false).unwrap();
            store.create(&NewItem::plain(kind.id, ALICE)).unwrap();
            kind.id
        };
        let store = SqliteStore::open(&path).unwrap();
        let items = store.items_owned_by(ALICE).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind.id, kind_id);
        assert!(!items[0].is_tradeable());
        assert_eq!(store.kind_by_name("Japan").unwrap().map(|k| k.id), Some(kind_id));
    }
}
