//! Local SQLite database layer for Counter POS.
//!
//! The database is a plain key-value table: every store (categories, items,
//! sales, settings) is one row whose value is the whole JSON blob. Uses
//! rusqlite with WAL mode, applies schema migrations on open and exposes the
//! connection behind a mutex for the command layer.

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Managed state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
pub(crate) const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{data_dir}/pos.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = data_dir.join("pos.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path).and_then(|c| {
        run_migrations(&c)?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            let conn = open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?;
            run_migrations(&conn)?;
            conn
        }
    };

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open a throwaway in-memory database with the full schema applied.
#[cfg(test)]
pub(crate) fn init_in_memory() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch("PRAGMA busy_timeout = 5000;")
        .expect("pragma setup");
    run_migrations(&conn).expect("migrations");
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current = schema_version(conn);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Highest applied migration, 0 on a fresh database.
pub(crate) fn schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

/// Migration v1: the key-value store backing every collection.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_store (
            store_key TEXT PRIMARY KEY,
            store_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        format!("migration v1: {e}")
    })?;

    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: print attempt log, read by diagnostics.
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS print_attempts (
            id TEXT PRIMARY KEY,
            document_ref TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('printed', 'failed')),
            last_error TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_print_attempts_created_at
            ON print_attempts(created_at);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        format!("migration v2: {e}")
    })?;

    info!("Applied migration v2 (print_attempts table)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Key-value helpers
// ---------------------------------------------------------------------------

/// Read the raw blob stored under `key`.
pub fn get_value(conn: &Connection, key: &str) -> Result<Option<String>, String> {
    conn.query_row(
        "SELECT store_value FROM local_store WHERE store_key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| format!("get_value: {e}"))
}

/// Insert or replace the blob stored under `key`.
pub fn set_value(conn: &Connection, key: &str, value: &str) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_store (store_key, store_value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(store_key) DO UPDATE SET
            store_value = excluded.store_value,
            updated_at = excluded.updated_at",
        params![key, value],
    )
    .map_err(|e| format!("set_value: {e}"))?;
    Ok(())
}

/// Remove `key` entirely. Removing a missing key is not an error.
pub fn delete_value(conn: &Connection, key: &str) -> Result<(), String> {
    conn.execute("DELETE FROM local_store WHERE store_key = ?1", params![key])
        .map_err(|e| format!("delete_value: {e}"))?;
    Ok(())
}

/// Record the outcome of one print attempt.
pub fn record_print_attempt(
    conn: &Connection,
    id: &str,
    document_ref: &str,
    error: Option<&str>,
) -> Result<(), String> {
    let status = if error.is_some() { "failed" } else { "printed" };
    conn.execute(
        "INSERT INTO print_attempts (id, document_ref, status, last_error, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            document_ref,
            status,
            error,
            chrono::Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| format!("record_print_attempt: {e}"))?;
    Ok(())
}
