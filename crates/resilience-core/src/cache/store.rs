//! Table-per-category feature storage.
//!
//! The downloader replaces whole tables; the query engine only reads them.
//! Writing one category never touches another category's table, so an
//! interrupted download can be completed later.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::error::StoreError;
use crate::models::FeatureRecord;

/// Table names are interpolated into SQL, so they are restricted to identifiers.
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn checked(table: &str) -> Result<&str, StoreError> {
    if is_valid_table_name(table) {
        Ok(table)
    } else {
        Err(StoreError::InvalidTableName(table.to_string()))
    }
}

pub trait FeatureStore {
    fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    /// All rows of `table`, or `None` if the table was never written.
    fn load_table(&self, table: &str) -> Result<Option<Vec<FeatureRecord>>, StoreError>;

    /// Replace `table` with `rows`, creating it if needed.
    fn write_table(&mut self, table: &str, rows: &[FeatureRecord]) -> Result<(), StoreError>;

    fn table_names(&self) -> Result<Vec<String>, StoreError>;
}

// ============================================================================
// SQLite
// ============================================================================

/// Single-file store, one SQL table per category.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open the store, creating the file if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened feature store");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store for reading only.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureStore for SqliteStore {
    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn load_table(&self, table: &str) -> Result<Option<Vec<FeatureRecord>>, StoreError> {
        let table = checked(table)?;
        if !self.table_exists(table)? {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT source_id, name, source_type, x, y, tags FROM \"{}\" ORDER BY fid",
            table
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let records = rows
            .into_iter()
            .map(|(source_id, name, source_type, x, y, tags)| {
                Ok(FeatureRecord {
                    source_id,
                    name,
                    source_type,
                    tags: serde_json::from_str::<BTreeMap<String, String>>(&tags)?,
                    x,
                    y,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        debug!(table, rows = records.len(), "Loaded feature table");
        Ok(Some(records))
    }

    fn write_table(&mut self, table: &str, rows: &[FeatureRecord]) -> Result<(), StoreError> {
        let table = checked(table)?;

        // One transaction: the previous table stays intact until the new one is complete
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS \"{table}\";
             CREATE TABLE \"{table}\" (
                 fid INTEGER PRIMARY KEY AUTOINCREMENT,
                 source_id TEXT NOT NULL,
                 name TEXT NOT NULL,
                 source_type TEXT NOT NULL,
                 x REAL NOT NULL,
                 y REAL NOT NULL,
                 tags TEXT NOT NULL DEFAULT '{{}}'
             );"
        ))?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO \"{}\" (source_id, name, source_type, x, y, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                table
            ))?;
            for row in rows {
                let tags = serde_json::to_string(&row.tags)?;
                insert.execute(params![row.source_id, row.name, row.source_type, row.x, row.y, tags])?;
            }
        }
        tx.commit()?;

        debug!(table, rows = rows.len(), "Wrote feature table");
        Ok(())
    }

    fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Store backed by a map, for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<FeatureRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, rows: Vec<FeatureRecord>) -> Self {
        self.tables.insert(table.to_string(), rows);
        self
    }
}

impl FeatureStore for MemoryStore {
    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        Ok(self.tables.contains_key(table))
    }

    fn load_table(&self, table: &str) -> Result<Option<Vec<FeatureRecord>>, StoreError> {
        Ok(self.tables.get(table).cloned())
    }

    fn write_table(&mut self, table: &str, rows: &[FeatureRecord]) -> Result<(), StoreError> {
        self.tables.insert(checked(table)?.to_string(), rows.to_vec());
        Ok(())
    }

    fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
