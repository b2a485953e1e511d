//! Infrastructure layer - Storage adapters
//!
//! - `memory`: process-local store (tests, dry runs)
//! - `sqlite`: durable SQLite store (feature `sqlite`)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryFixStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteFixStore;
