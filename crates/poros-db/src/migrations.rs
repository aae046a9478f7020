//! Embedded SQL migration runner.
//!
//! Migrations are SQL files compiled into the binary. They run sequentially
//! on startup, tracked by the `_poros_migrations` table; each one applies
//! exactly once and is skipped on later runs.

use rusqlite::Connection;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_agents",
        sql: include_str!("migrations/000_agents.sql"),
    },
    Migration {
        name: "001_orchestration_log",
        sql: include_str!("migrations/001_orchestration_log.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed; the migration's changes
    /// were rolled back.
    #[error("migration '{name}' failed: {source}")]
    Failed {
        /// Name of the failed migration.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// The migration tracking table could not be read.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Runs all pending migrations on the given connection, returning how many
/// were applied. Each migration runs inside its own transaction together
/// with its tracking-table insert, so a partial application cannot be
/// recorded as done.
///
/// # Errors
///
/// Returns [`MigrationError`] when a migration fails to execute or the
/// tracking table cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply(conn, MIGRATIONS)
}

fn apply(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _poros_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| MigrationError::Failed {
        name: "_poros_migrations_bootstrap".to_string(),
        source: e,
    })?;

    let mut applied = 0;
    for migration in migrations {
        let done: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _poros_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;
        if done {
            tracing::debug!(migration = migration.name, "already applied, skipping");
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");
        let fail = |source| MigrationError::Failed {
            name: migration.name.to_string(),
            source,
        };
        let tx = conn.unchecked_transaction().map_err(fail)?;
        tx.execute_batch(migration.sql).map_err(fail)?;
        tx.execute("INSERT INTO _poros_migrations (name) VALUES (?1)", [migration.name])
            .map_err(fail)?;
        tx.commit().map_err(fail)?;
        applied += 1;
    }

    Ok(applied)
}
