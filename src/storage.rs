use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Slot holding the JSON array of telemetry events.
pub const EVENTS_KEY: &str = "typingTest.events";
/// Slot holding the participant label; survives resets and restarts.
pub const PARTICIPANT_KEY: &str = "typingTest.participantName";

/// Durable key-value slots. A `set` has reached storage when it returns.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed store, one row per slot.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        f(&guard)
    }
}

impl LocalStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
                .optional()?)
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
                "#,
                params![key, value],
            )?;
            Ok(())
        })
    }
}

/// In-memory store for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub fn load_participant(store: &dyn LocalStore) -> Option<String> {
    match store.get(PARTICIPANT_KEY) {
        Ok(name) => name.filter(|n| !n.is_empty()),
        Err(e) => {
            tracing::warn!(target: "storage", error = %e, "participant_read_failed");
            None
        }
    }
}

pub fn save_participant(store: &dyn LocalStore, name: &str) -> Result<()> {
    store.set(PARTICIPANT_KEY, name.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sqlite_set_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn sqlite_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("local.db");
        SqliteStore::open(&path).unwrap().set(EVENTS_KEY, "[]").unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get(EVENTS_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn participant_is_trimmed_and_blank_means_none() {
        let store = MemoryStore::new();
        assert_eq!(load_participant(&store), None);
        save_participant(&store, "  P07 ").unwrap();
        assert_eq!(load_participant(&store).as_deref(), Some("P07"));
        save_participant(&store, "   ").unwrap();
        assert_eq!(load_participant(&store), None);
    }
}
