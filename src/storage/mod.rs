//! Counter storage -- the store abstraction, SQLite pool, schema, snapshot import.

pub mod memory;
pub mod schema;
pub mod sqlite;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::month::Month;

pub use self::memory::MemoryCounterStore;
pub use self::sqlite::SqliteCounterStore;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// One of the independently tracked counter categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Package,
    Mirror,
    Country,
    SystemArchitecture,
    OsArchitecture,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Package,
        Dimension::Mirror,
        Dimension::Country,
        Dimension::SystemArchitecture,
        Dimension::OsArchitecture,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Dimension::Package => "package",
            Dimension::Mirror => "mirror",
            Dimension::Country => "country",
            Dimension::SystemArchitecture => "system_architecture",
            Dimension::OsArchitecture => "operating_system_architecture",
        }
    }

    pub fn id_column(self) -> &'static str {
        match self {
            Dimension::Mirror => "url",
            Dimension::Country => "code",
            _ => "name",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// Restricts which identifiers a month listing returns.
#[derive(Debug, Clone, Copy)]
pub enum IdentifierFilter<'a> {
    All,
    Only(&'a [String]),
    Excluding(&'a [String]),
}

impl IdentifierFilter<'_> {
    pub fn admits(&self, identifier: &str) -> bool {
        match self {
            IdentifierFilter::All => true,
            IdentifierFilter::Only(ids) => ids.iter().any(|id| id == identifier),
            IdentifierFilter::Excluding(ids) => !ids.iter().any(|id| id == identifier),
        }
    }
}

/// Read access to monthly counters. Detectors depend on nothing else.
pub trait CounterStore {
    /// Count for `identifier` in `month`, 0 when there is no row.
    fn count_in_month(&self, dim: Dimension, identifier: &str, month: Month) -> Result<u64, StoreError>;

    /// Average count per identifier over `[start, end]`, restricted to
    /// identifiers with at least `min_samples` rows in the window.
    fn baseline_averages(
        &self,
        dim: Dimension,
        start: Month,
        end: Month,
        min_samples: usize,
    ) -> Result<BTreeMap<String, f64>, StoreError>;

    /// Whether any row exists for `identifier` in `[from, to_exclusive)`.
    fn exists_before_month(
        &self,
        dim: Dimension,
        identifier: &str,
        from: Month,
        to_exclusive: Month,
    ) -> Result<bool, StoreError>;

    /// All `(identifier, count)` rows of `month` admitted by `filter`.
    fn counts_in_month(
        &self,
        dim: Dimension,
        month: Month,
        filter: IdentifierFilter<'_>,
    ) -> Result<Vec<(String, u64)>, StoreError>;
}

impl<T: CounterStore + ?Sized> CounterStore for &T {
    fn count_in_month(&self, dim: Dimension, identifier: &str, month: Month) -> Result<u64, StoreError> {
        (**self).count_in_month(dim, identifier, month)
    }

    fn baseline_averages(
        &self,
        dim: Dimension,
        start: Month,
        end: Month,
        min_samples: usize,
    ) -> Result<BTreeMap<String, f64>, StoreError> {
        (**self).baseline_averages(dim, start, end, min_samples)
    }

    fn exists_before_month(
        &self,
        dim: Dimension,
        identifier: &str,
        from: Month,
        to_exclusive: Month,
    ) -> Result<bool, StoreError> {
        (**self).exists_before_month(dim, identifier, from, to_exclusive)
    }

    fn counts_in_month(
        &self,
        dim: Dimension,
        month: Month,
        filter: IdentifierFilter<'_>,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        (**self).counts_in_month(dim, month, filter)
    }
}

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create database directory {}", parent.display()))?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Run `f` against a store whose reads all share one read transaction, so a
/// detection run sees a single consistent state of the counters.
pub fn with_snapshot<T, E, F>(pool: &Pool, f: F) -> Result<T, E>
where
    E: From<StoreError>,
    F: FnOnce(&SqliteCounterStore<'_>) -> Result<T, E>,
{
    let conn = pool.get().map_err(StoreError::from)?;
    let tx = conn.unchecked_transaction().map_err(StoreError::from)?;
    let store = SqliteCounterStore::new(&tx);
    let out = f(&store)?;
    // Read-only; nothing to persist.
    tx.rollback().map_err(StoreError::from)?;
    Ok(out)
}

/// A single counter row as exchanged in snapshot files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRow {
    pub dimension: Dimension,
    pub identifier: String,
    pub month: Month,
    pub count: u64,
}

/// Load a JSON array of [`CounterRow`] into the store, replacing existing
/// counts for the same `(identifier, month)`. Returns the number of rows written.
pub fn import_snapshot(pool: &Pool, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot file: {}", path.display()))?;
    let rows: Vec<CounterRow> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse snapshot file: {}", path.display()))?;

    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    for row in &rows {
        sqlite::upsert_count(&tx, row.dimension, &row.identifier, row.month, row.count)?;
    }
    tx.commit().context("failed to commit snapshot import")?;

    info!(path = %path.display(), rows = rows.len(), "imported counter snapshot");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_bindings() {
        assert_eq!(Dimension::Package.table(), "package");
        assert_eq!(Dimension::Package.id_column(), "name");
        assert_eq!(Dimension::Mirror.id_column(), "url");
        assert_eq!(Dimension::Country.id_column(), "code");
        assert_eq!(Dimension::OsArchitecture.table(), "operating_system_architecture");
    }

    #[test]
    fn test_filter_admits() {
        let ids = vec!["pacman".to_string()];
        assert!(IdentifierFilter::All.admits("anything"));
        assert!(IdentifierFilter::Only(&ids).admits("pacman"));
        assert!(!IdentifierFilter::Only(&ids).admits("linux"));
        assert!(IdentifierFilter::Excluding(&ids).admits("linux"));
        assert!(!IdentifierFilter::Excluding(&ids).admits("pacman"));
    }

    #[test]
    fn test_import_snapshot_and_read_back() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let db = dir.path().join("counters.db");
        let pool = open_pool(db.to_str().unwrap())?;

        let file = dir.path().join("snapshot.json");
        std::fs::write(
            &file,
            r#"[
                {"dimension": "package", "identifier": "pacman", "month": 202407, "count": 1000},
                {"dimension": "mirror", "identifier": "https://mirror.example.com/", "month": 202407, "count": 42},
                {"dimension": "package", "identifier": "pacman", "month": 202407, "count": 1200}
            ]"#,
        )?;

        assert_eq!(import_snapshot(&pool, &file)?, 3);

        let month = Month::new(2024, 7)?;
        let count = with_snapshot(&pool, |store| {
            store.count_in_month(Dimension::Package, "pacman", month)
        })?;
        assert_eq!(count, 1200);

        let mirror = with_snapshot(&pool, |store| {
            store.count_in_month(Dimension::Mirror, "https://mirror.example.com/", month)
        })?;
        assert_eq!(mirror, 42);
        Ok(())
    }

    #[test]
    fn test_import_rejects_malformed_file() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let pool = open_pool(dir.path().join("c.db").to_str().unwrap())?;
        let file = dir.path().join("bad.json");
        std::fs::write(&file, r#"[{"dimension": "planet", "identifier": "x", "month": 202407, "count": 1}]"#)?;
        assert!(import_snapshot(&pool, &file).is_err());
        Ok(())
    }
}
