//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

use super::Dimension;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    // Every dimension shares the same (identifier, month, count) layout.
    for dim in Dimension::ALL {
        let (table, col) = (dim.table(), dim.id_column());
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                {col} TEXT NOT NULL,
                month INTEGER NOT NULL,
                count INTEGER NOT NULL DEFAULT 1 CHECK (count >= 0),
                PRIMARY KEY ({col}, month)
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_month ON {table}(month);"
        ))?;
    }

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (1)",
        [],
    )?;

    Ok(())
}
