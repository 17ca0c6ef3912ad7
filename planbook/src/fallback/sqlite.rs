use super::FallbackStore;
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Fallback entries in a device-local SQLite file.
pub struct SqliteFallback {
    conn: Mutex<Connection>,
}

impl SqliteFallback {
    /// Open or create the fallback database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let db = SqliteFallback {
            conn: Mutex::new(conn),
        };
        db.initialize_tables()?;
        Ok(db)
    }

    /// Open an in-memory fallback (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = SqliteFallback {
            conn: Mutex::new(conn),
        };
        db.initialize_tables()?;
        Ok(db)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS fallback (
                key TEXT PRIMARY KEY,
                data_json TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FallbackStore for SqliteFallback {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .conn()
            .query_row(
                "SELECT data_json FROM fallback WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn put(&self, key: &str, payload: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO fallback (key, data_json, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, payload],
        )?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key FROM fallback ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_in_memory() {
        let db = SqliteFallback::open_in_memory().unwrap();
        assert!(db.get("checklist").unwrap().is_none());
        assert!(db.keys().unwrap().is_empty());
    }

    #[test]
    fn test_put_get_keys() {
        let db = SqliteFallback::open_in_memory().unwrap();
        db.put("guest-list", "{\"rows\":[]}").unwrap();
        db.put("guest-list", "{\"rows\":[1]}").unwrap();
        db.put("checklist", "{}").unwrap();

        assert_eq!(db.get("guest-list").unwrap().as_deref(), Some("{\"rows\":[1]}"));
        assert_eq!(db.keys().unwrap(), vec!["checklist", "guest-list"]);
        assert!(db.get("venue-tour/hall-1").unwrap().is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("device").join("fallback.db");
        {
            let db = SqliteFallback::open(&path).unwrap();
            db.put("venue-tour/hall-1", "{\"venueName\":\"Hall\"}").unwrap();
        }
        let db = SqliteFallback::open(&path).unwrap();
        assert_eq!(
            db.get("venue-tour/hall-1").unwrap().as_deref(),
            Some("{\"venueName\":\"Hall\"}")
        );
    }
}
