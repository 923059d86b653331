//! SQLite-backed cache persistence.

use crate::error::StorageResult;
use crate::persistence::{PersistedEntry, Persistence};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Persistent cache backed by a single SQLite file.
pub struct SqlitePersistence {
    conn: Mutex<Connection>,
}

impl SqlitePersistence {
    /// Opens (or creates) a cache database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory cache (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache_stores (
                store_key TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                store_key TEXT NOT NULL,
                position INTEGER NOT NULL,
                entry_key TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (store_key, position)
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Persistence for SqlitePersistence {
    fn save(&self, store_key: &str, entries: &[PersistedEntry]) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO cache_stores (store_key) VALUES (?1)",
            params![store_key],
        )?;
        tx.execute(
            "DELETE FROM cache_entries WHERE store_key = ?1",
            params![store_key],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cache_entries (store_key, position, entry_key, data) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, (key, data)) in entries.iter().enumerate() {
                stmt.execute(params![store_key, position as i64, key, data])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&self, store_key: &str) -> StorageResult<Option<Vec<PersistedEntry>>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let known: Option<String> = conn
            .query_row(
                "SELECT store_key FROM cache_stores WHERE store_key = ?1",
                params![store_key],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT entry_key, data FROM cache_entries WHERE store_key = ?1 ORDER BY position",
        )?;
        let entries = stmt
            .query_map(params![store_key], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<PersistedEntry>, _>>()?;
        Ok(Some(entries))
    }
}
