//! Saved-query store
//!
//! CRUD over the single `saved_queries` table of an embedded SQLite database.
//! The store owns exactly one connection behind a mutex, which serializes all
//! access and keeps SQLite from reporting "database is locked".

mod types;

pub use types::{
    QueryAction, SavedQueriesResponse, SavedQuery, SavedQueryInput, ValidQuery, DEFAULT_CATEGORY,
};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::logger;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Input rejected before touching the database; the message is safe to show clients
    #[error("{0}")]
    Validation(String),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store connection poisoned")]
    Poisoned,
}

const PRAGMAS: &str = "
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    PRAGMA busy_timeout=5000;
";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS saved_queries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT DEFAULT '',
        category TEXT DEFAULT 'General',
        action TEXT DEFAULT 'query' CHECK(action IN ('query', 'mutate')),
        query TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_category_name ON saved_queries(category, name);
";

const SELECT_COLUMNS: &str =
    "SELECT id, name, description, category, action, query, created_at, updated_at FROM saved_queries";

/// Handle to the saved-query database, shared by all requests through `AppState`
#[derive(Debug)]
pub struct QueryStore {
    conn: Mutex<Connection>,
}

impl QueryStore {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        if let Err(e) = conn.execute_batch(PRAGMAS) {
            logger::log_warning(&format!("Failed to set SQLite pragmas: {e}"));
        }
        let store = Self::with_connection(conn)?;
        logger::log_info(&format!("SQLite database initialized at {}", path.display()));
        Ok(store)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// All saved queries ordered by category, then name
    pub fn list(&self) -> Result<Vec<SavedQuery>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY category, name"))?;
        let rows = stmt.query_map([], map_row)?;
        let queries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(queries)
    }

    /// One saved query; `Ok(None)` when the id does not exist
    pub fn get(&self, id: i64) -> Result<Option<SavedQuery>, StoreError> {
        let conn = self.conn()?;
        fetch(&conn, id)
    }

    /// Validate and insert a query, returning the stored row
    ///
    /// Blank name or query and unknown actions are rejected with
    /// `StoreError::Validation`. Missing description, category and action take
    /// their defaults; `created_at` and `updated_at` are both set to now.
    ///
    /// # Examples
    /// ```
    /// use ratel::store::{QueryStore, SavedQueryInput};
    ///
    /// let store = QueryStore::open_in_memory().unwrap();
    /// let saved = store
    ///     .create(SavedQueryInput {
    ///         name: "Friends".to_string(),
    ///         query: "{ q(func: has(friend)) { uid } }".to_string(),
    ///         ..Default::default()
    ///     })
    ///     .unwrap();
    /// assert_eq!(saved.category, "General");
    /// assert_eq!(saved.created_at, saved.updated_at);
    ///
    /// let blank = SavedQueryInput { name: " ".to_string(), ..Default::default() };
    /// assert!(store.create(blank).is_err());
    /// ```
    pub fn create(&self, input: SavedQueryInput) -> Result<SavedQuery, StoreError> {
        let q = input.validate().map_err(StoreError::Validation)?;
        let now = timestamp_now();

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO saved_queries (name, description, category, action, query, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![q.name, q.description, q.category, q.action.as_str(), q.query, now],
        )?;
        let id = conn.last_insert_rowid();

        fetch(&conn, id)?.ok_or(StoreError::Sql(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Overwrite every mutable field; `None` when the id does not exist
    pub fn update(&self, id: i64, input: SavedQueryInput) -> Result<Option<SavedQuery>, StoreError> {
        let q = input.validate().map_err(StoreError::Validation)?;
        let now = timestamp_now();

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE saved_queries
             SET name = ?1, description = ?2, category = ?3, action = ?4, query = ?5, updated_at = ?6
             WHERE id = ?7",
            params![q.name, q.description, q.category, q.action.as_str(), q.query, now, id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        fetch(&conn, id)
    }

    /// Idempotent delete; returns whether a row was removed
    pub fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM saved_queries WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<SavedQuery>, StoreError> {
    let query = conn
        .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], map_row)
        .optional()?;
    Ok(query)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<SavedQuery> {
    let action: String = row.get(4)?;
    let action = action.parse::<QueryAction>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into())
    })?;

    Ok(SavedQuery {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        category: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        action,
        query: row.get(5)?,
        created_at: read_timestamp(row, 6)?,
        updated_at: read_timestamp(row, 7)?,
    })
}

fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// RFC 3339 as written by this store, or `YYYY-MM-DD HH:MM:SS` from SQLite's
/// `CURRENT_TIMESTAMP` (always UTC)
fn read_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                format!("invalid timestamp '{raw}'").into(),
            )
        })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, category: &str, query: &str) -> SavedQueryInput {
        SavedQueryInput {
            name: name.into(),
            category: category.into(),
            query: query.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_store() {
        let store = QueryStore::open_in_memory().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_create_query() {
        let store = QueryStore::open_in_memory().unwrap();
        let created = store
            .create(SavedQueryInput {
                name: "Test Query".into(),
                description: "A test query".into(),
                category: "Testing".into(),
                action: "query".into(),
                query: "{ test { uid } }".into(),
            })
            .unwrap();

        assert!(created.id > 0);
        assert_eq!(created.name, "Test Query");
        assert_eq!(created.description, "A test query");
        assert_eq!(created.category, "Testing");
        assert_eq!(created.action, QueryAction::Query);
        assert_eq!(created.query, "{ test { uid } }");
        assert_eq!(created.created_at, created.updated_at);
    }

    #[test]
    fn test_create_applies_defaults() {
        let store = QueryStore::open_in_memory().unwrap();
        let created = store.create(input("Minimal", "", "{ minimal { uid } }")).unwrap();
        assert_eq!(created.category, "General");
        assert_eq!(created.action, QueryAction::Query);
    }

    #[test]
    fn test_create_rejects_missing_fields() {
        let store = QueryStore::open_in_memory().unwrap();
        let err = store.create(input("", "", "{ q }")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_mutate_action() {
        let store = QueryStore::open_in_memory().unwrap();
        let created = store
            .create(SavedQueryInput {
                name: "Mutation Test".into(),
                action: "mutate".into(),
                query: r#"{ set { _:new <name> "test" . } }"#.into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(created.action, QueryAction::Mutate);
    }

    #[test]
    fn test_get_by_id() {
        let store = QueryStore::open_in_memory().unwrap();
        let created = store.create(input("Get By ID", "", "{ q }")).unwrap();
        let fetched = store.get(created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(store.get(99_999).unwrap().is_none());
    }

    #[test]
    fn test_list_ordering() {
        let store = QueryStore::open_in_memory().unwrap();
        store.create(input("1", "A", "{ q1 }")).unwrap();
        store.create(input("3", "A", "{ q3 }")).unwrap();
        store.create(input("2", "B", "{ q2 }")).unwrap();

        let order: Vec<(String, String)> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|q| (q.category, q.name))
            .collect();
        assert_eq!(
            order,
            vec![
                ("A".to_string(), "1".to_string()),
                ("A".to_string(), "3".to_string()),
                ("B".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_update_overwrites_fields() {
        let store = QueryStore::open_in_memory().unwrap();
        let created = store
            .create(SavedQueryInput {
                name: "Original".into(),
                description: "Original Description".into(),
                category: "Original".into(),
                action: "query".into(),
                query: "{ original }".into(),
            })
            .unwrap();

        let updated = store
            .update(
                created.id,
                SavedQueryInput {
                    name: "Updated".into(),
                    description: "Updated Description".into(),
                    category: "Updated".into(),
                    action: "mutate".into(),
                    query: "{ updated }".into(),
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Updated");
        assert_eq!(updated.description, "Updated Description");
        assert_eq!(updated.category, "Updated");
        assert_eq!(updated.action, QueryAction::Mutate);
        assert_eq!(updated.query, "{ updated }");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn test_update_unknown_id() {
        let store = QueryStore::open_in_memory().unwrap();
        assert!(store.update(42, input("n", "", "{ q }")).unwrap().is_none());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = QueryStore::open_in_memory().unwrap();
        let created = store.create(input("To Delete", "", "{ delete_me }")).unwrap();

        assert!(store.delete(created.id).unwrap());
        assert!(store.get(created.id).unwrap().is_none());
        assert!(!store.delete(created.id).unwrap());
        assert!(!store.delete(99_999).unwrap());
    }

    #[test]
    fn test_reads_legacy_timestamps() {
        let store = QueryStore::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO saved_queries (name, query) VALUES ('legacy', '{ q }')",
                [],
            )
            .unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].category, "General");
        assert_eq!(all[0].action, QueryAction::Query);
        assert_eq!(all[0].created_at, all[0].updated_at);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queries.db");
        {
            let store = QueryStore::open(&path).unwrap();
            store.create(input("persisted", "", "{ q }")).unwrap();
        }
        let reopened = QueryStore::open(&path).unwrap();
        assert_eq!(reopened.list().unwrap()[0].name, "persisted");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-02T03:04:05.123456Z").is_some());
        assert!(parse_timestamp("2024-01-02 03:04:05").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
