//! # storage-adapters
//!
//! Implementations of the storage ports. The in-memory store is always
//! built; Postgres and local-disk media sit behind features.

pub mod memory;

#[cfg(feature = "db-postgres")]
pub mod postgres;

#[cfg(feature = "media-local")]
pub mod media_local;

pub use memory::{InMemoryMediaStorage, InMemoryStore};

#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;

#[cfg(feature = "media-local")]
pub use media_local::LocalMediaStorage;
