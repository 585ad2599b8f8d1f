//! Counter store backed by the SQLite tables created in [`super::schema`].

use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{CounterStore, Dimension, IdentifierFilter, StoreError};
use crate::month::Month;

/// Aggregating queries over one connection. Wrap the connection in a
/// transaction (see [`super::with_snapshot`]) to pin every read to one snapshot.
pub struct SqliteCounterStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteCounterStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn to_count(raw: i64) -> u64 {
    raw.max(0) as u64
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

impl CounterStore for SqliteCounterStore<'_> {
    fn count_in_month(&self, dim: Dimension, identifier: &str, month: Month) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT count FROM {} WHERE {} = ?1 AND month = ?2",
            dim.table(),
            dim.id_column()
        );
        let count: Option<i64> = self
            .conn
            .query_row(&sql, params![identifier, month.as_u32()], |row| row.get(0))
            .optional()?;
        Ok(count.map(to_count).unwrap_or(0))
    }

    fn baseline_averages(
        &self,
        dim: Dimension,
        start: Month,
        end: Month,
        min_samples: usize,
    ) -> Result<BTreeMap<String, f64>, StoreError> {
        let col = dim.id_column();
        let sql = format!(
            "SELECT {col}, AVG(count) FROM {table}
             WHERE month >= ?1 AND month <= ?2
             GROUP BY {col}
             HAVING COUNT(*) >= ?3",
            table = dim.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![start.as_u32(), end.as_u32(), min_samples as i64],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?;

        let mut averages = BTreeMap::new();
        for r in rows {
            let (id, avg) = r?;
            averages.insert(id, avg);
        }
        Ok(averages)
    }

    fn exists_before_month(
        &self,
        dim: Dimension,
        identifier: &str,
        from: Month,
        to_exclusive: Month,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1 AND month >= ?2 AND month < ?3)",
            dim.table(),
            dim.id_column()
        );
        let exists: bool = self.conn.query_row(
            &sql,
            params![identifier, from.as_u32(), to_exclusive.as_u32()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn counts_in_month(
        &self,
        dim: Dimension,
        month: Month,
        filter: IdentifierFilter<'_>,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        let col = dim.id_column();
        let mut sql = format!("SELECT {col}, count FROM {} WHERE month = ?", dim.table());
        let mut values = vec![Value::Integer(month.as_u32() as i64)];

        match filter {
            IdentifierFilter::All => {}
            IdentifierFilter::Only(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                sql.push_str(&format!(" AND {col} IN ({})", placeholders(ids.len())));
                values.extend(ids.iter().cloned().map(Value::Text));
            }
            IdentifierFilter::Excluding(ids) => {
                if !ids.is_empty() {
                    sql.push_str(&format!(" AND {col} NOT IN ({})", placeholders(ids.len())));
                    values.extend(ids.iter().cloned().map(Value::Text));
                }
            }
        }
        sql.push_str(&format!(" ORDER BY {col}"));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, String>(0)?, to_count(row.get::<_, i64>(1)?)))
        })?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

/// Set the absolute count of one `(identifier, month)` row.
pub fn upsert_count(
    conn: &Connection,
    dim: Dimension,
    identifier: &str,
    month: Month,
    count: u64,
) -> Result<(), StoreError> {
    let col = dim.id_column();
    let sql = format!(
        "INSERT INTO {table} ({col}, month, count) VALUES (?1, ?2, ?3)
         ON CONFLICT({col}, month) DO UPDATE SET count = excluded.count",
        table = dim.table()
    );
    let count = i64::try_from(count).unwrap_or(i64::MAX);
    conn.execute(&sql, params![identifier, month.as_u32(), count])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::migrate;

    fn month(v: u32) -> Month {
        Month::from_yyyymm(v).unwrap()
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        for m in 202401..=202406 {
            upsert_count(&conn, Dimension::Mirror, "https://a.example/", month(m), 100).unwrap();
        }
        upsert_count(&conn, Dimension::Mirror, "https://b.example/", month(202405), 10).unwrap();
        upsert_count(&conn, Dimension::Mirror, "https://b.example/", month(202406), 30).unwrap();
        upsert_count(&conn, Dimension::Mirror, "https://a.example/", month(202407), 500).unwrap();
        upsert_count(&conn, Dimension::Package, "pacman", month(202407), 1000).unwrap();
        upsert_count(&conn, Dimension::Package, "linux", month(202407), 900).unwrap();
        conn
    }

    #[test]
    fn test_count_in_month_defaults_to_zero() {
        let conn = setup();
        let store = SqliteCounterStore::new(&conn);
        assert_eq!(
            store.count_in_month(Dimension::Mirror, "https://a.example/", month(202407)).unwrap(),
            500
        );
        assert_eq!(store.count_in_month(Dimension::Mirror, "missing", month(202407)).unwrap(), 0);
    }

    #[test]
    fn test_baseline_averages_respects_min_samples() {
        let conn = setup();
        let store = SqliteCounterStore::new(&conn);
        let avgs = store
            .baseline_averages(Dimension::Mirror, month(202401), month(202406), 3)
            .unwrap();
        assert_eq!(avgs.len(), 1);
        assert_eq!(avgs["https://a.example/"], 100.0);

        let avgs = store
            .baseline_averages(Dimension::Mirror, month(202401), month(202406), 2)
            .unwrap();
        assert_eq!(avgs["https://b.example/"], 20.0);
    }

    #[test]
    fn test_exists_before_month_is_half_open() {
        let conn = setup();
        let store = SqliteCounterStore::new(&conn);
        let b = "https://b.example/";
        assert!(store.exists_before_month(Dimension::Mirror, b, month(202401), month(202407)).unwrap());
        assert!(store.exists_before_month(Dimension::Mirror, b, month(202405), month(202406)).unwrap());
        assert!(!store.exists_before_month(Dimension::Mirror, b, month(202406), month(202406)).unwrap());
        assert!(!store.exists_before_month(Dimension::Mirror, b, month(202401), month(202405)).unwrap());
    }

    #[test]
    fn test_counts_in_month_filters() {
        let conn = setup();
        let store = SqliteCounterStore::new(&conn);
        let base = vec!["pacman".to_string()];

        let all = store.counts_in_month(Dimension::Package, month(202407), IdentifierFilter::All).unwrap();
        assert_eq!(all, vec![("linux".to_string(), 900), ("pacman".to_string(), 1000)]);

        let only = store
            .counts_in_month(Dimension::Package, month(202407), IdentifierFilter::Only(&base))
            .unwrap();
        assert_eq!(only, vec![("pacman".to_string(), 1000)]);

        let excl = store
            .counts_in_month(Dimension::Package, month(202407), IdentifierFilter::Excluding(&base))
            .unwrap();
        assert_eq!(excl, vec![("linux".to_string(), 900)]);

        let none = store
            .counts_in_month(Dimension::Package, month(202407), IdentifierFilter::Only(&[]))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_upsert_replaces_count() {
        let conn = setup();
        upsert_count(&conn, Dimension::Package, "pacman", month(202407), 1234).unwrap();
        let store = SqliteCounterStore::new(&conn);
        assert_eq!(store.count_in_month(Dimension::Package, "pacman", month(202407)).unwrap(), 1234);
    }
}
