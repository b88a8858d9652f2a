//! Storage collaborators for the fusion engine.
//!
//! This crate provides:
//! - Process-wide item reservations ([`LockRegistry`])
//! - Item persistence behind the [`ItemStore`] trait
//! - Experience bookkeeping behind the [`ExperienceLedger`] trait
//!
//! # Architecture
//!
//! ```text
//! ItemStore + ExperienceLedger
//! ├── SqliteStore (durable, transactional conversion)
//! └── MemoryStore (HashMap-backed, tests and embedders)
//!
//! LockRegistry (item id -> holding session, in-process only)
//! ```

mod experience;
mod item_store;
mod locks;
mod memory;
mod sqlite;
mod sqlite_security;

pub use experience::ExperienceLedger;
pub use item_store::{Conversion, ConversionError, ConversionRequest, ItemStore, StoreError};
pub use locks::{AlreadyReserved, LockRegistry};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
