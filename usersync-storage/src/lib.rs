//! Model stores and cache persistence for usersync.
//!
//! # Architecture
//!
//! - A [`ModelStore`] is a keyed, insertion-ordered collection of models of
//!   one kind (identity, properties, subscriptions). It re-broadcasts
//!   add/remove events and writes its full contents through the
//!   [`Persistence`] boundary on every change.
//! - [`Persistence`] is the cache boundary: ordered `(key, serialized)`
//!   entries per store key. [`MemoryPersistence`] keeps them in process,
//!   [`SqlitePersistence`] keeps them in a SQLite file.
//! - The cache is best-effort. In-memory state is authoritative for the
//!   running process, so persistence failures are logged, never returned to
//!   the writer of a model.

mod error;
mod persistence;
mod sqlite;
mod store;

pub use error::{StorageError, StorageResult};
pub use persistence::{MemoryPersistence, Persistence, PersistedEntry};
pub use sqlite::SqlitePersistence;
pub use store::{ModelStore, ModelStoreChangedHandler};
