use std::path::Path;

use rusqlite::{Connection, Result};
use tracing::{debug, info};

use crate::error::IndexError;

/// SQLite schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Columns a database must carry to take part in a federation
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("files", &["id", "path", "timestamp"]),
    ("symbols", &["file_id", "symbol", "scope", "package", "row", "col"]),
];

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version = schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version < SCHEMA_VERSION {
        info!("Upgrading schema from v{} to v{}", current_version, SCHEMA_VERSION);
        apply_migrations(conn, current_version)?;
    }

    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Apply migrations from current version to latest
fn apply_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration v{}", version);
        match version {
            1 => create_v1_schema(conn)?,
            _ => unreachable!("Unknown schema version: {}", version),
        }

        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }

    Ok(())
}

/// Create v1 schema (initial schema)
fn create_v1_schema(conn: &Connection) -> Result<()> {
    // One row per tracked source file; timestamp is the staleness oracle
    conn.execute(
        "CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            timestamp REAL NOT NULL
        )",
        [],
    )?;

    // Occurrences never outlive their file row
    conn.execute(
        "CREATE TABLE IF NOT EXISTS symbols (
            file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            symbol TEXT NOT NULL,
            scope TEXT NOT NULL,
            package TEXT NOT NULL,
            \"row\" INTEGER NOT NULL,
            col INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_symbols_symbol
         ON symbols(symbol)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_symbols_file
         ON symbols(file_id)",
        [],
    )?;

    Ok(())
}

/// Check that an existing database can be read as a symdb index.
///
/// Used when attaching read-only secondaries, which are never migrated.
pub fn verify_schema(conn: &Connection, path: &Path) -> std::result::Result<(), IndexError> {
    for (table, columns) in REQUIRED_COLUMNS {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let present = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>>>()?;

        if present.is_empty() {
            return Err(IndexError::SchemaMismatch {
                path: path.to_path_buf(),
                reason: format!("missing table '{}'", table),
            });
        }

        for column in columns.iter() {
            if !present.iter().any(|c| c == column) {
                return Err(IndexError::SchemaMismatch {
                    path: path.to_path_buf(),
                    reason: format!("table '{}' has no column '{}'", table, column),
                });
            }
        }
    }

    Ok(())
}
