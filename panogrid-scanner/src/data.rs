use crate::document::DocumentFormat;
use crate::error::{Result, ScanError};
use crate::store::DocumentStore;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed document store. Same contract as the filesystem store,
/// kept in a single database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT NOT NULL,
                format TEXT NOT NULL CHECK(format IN ('json', 'xml')),
                body BLOB NOT NULL,
                fetched_at INTEGER NOT NULL,
                PRIMARY KEY (id, format)
            );

            CREATE TABLE IF NOT EXISTS failed_panos (
                id TEXT PRIMARY KEY,
                recorded_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScanError::Other("database lock poisoned".into()))
    }

    pub fn document_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?)
    }
}

impl DocumentStore for SqliteStore {
    fn get(&self, id: &str, format: DocumentFormat) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT body FROM documents WHERE id = ?1 AND format = ?2")?;
        let body: Option<Vec<u8>> = stmt
            .query_row(params![id, format.as_str()], |row| row.get(0))
            .optional()?;
        Ok(body.filter(|b| !b.is_empty()))
    }

    fn put(&self, id: &str, format: DocumentFormat, raw: &[u8]) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO documents (id, format, body, fetched_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, format.as_str(), raw, current_timestamp()],
        )?;
        Ok(inserted > 0)
    }

    fn has(&self, id: &str, format: DocumentFormat) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM documents WHERE id = ?1 AND format = ?2",
                params![id, format.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn load_failures(&self) -> Result<HashSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM failed_panos")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    fn save_failures(&self, failures: &HashSet<String>) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = current_timestamp();
        for id in failures {
            tx.execute(
                "INSERT OR IGNORE INTO failed_panos (id, recorded_at) VALUES (?1, ?2)",
                params![id, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
