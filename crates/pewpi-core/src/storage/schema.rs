//! SQLite schema for the key-value backend
//!
//! One row per storage key. The value column holds the serialized
//! collection exactly as the other backends store it.

use rusqlite::{params, Connection, OptionalExtension, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Key-value entries
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Check whether the schema still needs to be created
pub fn needs_init(conn: &Connection) -> Result<bool> {
    let version = schema_version(conn)?;
    Ok(version.is_none())
}

/// Read the stored schema version, if any
pub fn schema_version(conn: &Connection) -> Result<Option<i32>> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_info')",
        [],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Ok(None);
    }

    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_info WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(value.and_then(|v| v.parse().ok()))
}
