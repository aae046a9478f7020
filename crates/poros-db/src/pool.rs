//! Connection pool creation and SQLite session configuration.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbSettings {
    /// Busy timeout applied to every connection, in milliseconds.
    pub busy_timeout_ms: u32,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            max_connections: 8,
        }
    }
}

/// The SQLite connection pool shared across the server.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur while opening the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool could not be built.
    #[error("failed to open database pool: {0}")]
    Init(#[from] r2d2::Error),
}

/// Opens a pool against `db_path` with WAL journaling, foreign keys, and
/// the configured busy timeout applied to every connection.
///
/// Use `:memory:` as the path for tests.
///
/// # Errors
///
/// Returns [`PoolError::Init`] when the pool cannot be constructed.
pub fn open_pool(db_path: &str, settings: DbSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases report "memory" here, which is fine.
            let mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if mode != "wal" && mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!("could not enable WAL journaling, got {mode:?}")),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                settings.busy_timeout_ms
            ))
        });

    Ok(Pool::builder().max_size(settings.max_connections).build(manager)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pool_applies_settings() {
        let settings = DbSettings {
            busy_timeout_ms: 1_250,
            max_connections: 2,
        };
        let pool = open_pool(":memory:", settings).expect("pool should open");
        let conn = pool.get().expect("connection should check out");

        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("journal_mode should be queryable");
        assert!(mode == "wal" || mode == "memory", "unexpected journal_mode: {mode}");

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .expect("foreign_keys should be queryable");
        assert_eq!(fk, 1);

        let busy: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("busy_timeout should be queryable");
        assert_eq!(busy, 1_250);

        assert_eq!(pool.max_size(), 2);
    }

    #[test]
    fn file_backed_pool_shares_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("poros.db");
        let pool = open_pool(path.to_str().expect("utf-8 path"), DbSettings::default())
            .expect("pool should open");

        {
            let conn = pool.get().expect("conn");
            conn.execute_batch("CREATE TABLE probe (id INTEGER PRIMARY KEY); INSERT INTO probe VALUES (1);")
                .expect("create");
        }
        let conn = pool.get().expect("second conn");
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM probe", [], |row| row.get(0))
            .expect("count");
        assert_eq!(n, 1);
    }
}
