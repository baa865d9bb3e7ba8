//! Local `SQLite` record store.
//!
//! Implements the gateway contract over a single `nodes` table so the device
//! can run without a cloud project, and so tests run hermetically.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{KeyPath, PersistenceGateway};
use crate::error::{Error, Result};

/// Record store backed by a local `SQLite` database.
#[derive(Debug)]
pub struct SqliteGateway {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Open or create a database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("database connection lock poisoned"))
    }

    /// Replace whatever is stored at `path` (including any children) with `value`.
    ///
    /// A scalar stored at an ancestor of `path` is dropped, since that node
    /// now holds children.
    fn write(&self, path: &KeyPath, value: &str) -> Result<()> {
        let key = path.to_string();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM nodes WHERE substr(path, 1, length(?1)) = ?1",
            [descendant_prefix(path)],
        )?;
        for ancestor in ancestor_paths(path) {
            tx.execute("DELETE FROM nodes WHERE path = ?1", [ancestor])?;
        }
        tx.execute(
            r"
            INSERT INTO nodes (path, value) VALUES (?1, ?2)
            ON CONFLICT(path) DO UPDATE SET value = excluded.value, updated_at = datetime('now')
            ",
            params![key, value],
        )?;
        tx.commit()?;
        debug!("Wrote {}", key);
        Ok(())
    }

    fn read(&self, path: &KeyPath) -> Result<Value> {
        let key = path.to_string();
        let prefix = descendant_prefix(path);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r"
            SELECT path, value FROM nodes
            WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2
            ORDER BY path
            ",
        )?;
        let rows = stmt
            .query_map([&key, &prefix], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Err(Error::NotFound { path: key });
        }

        let mut tree = Map::new();
        for (row_path, value) in rows {
            if row_path == key {
                // Writes clear descendants, so a scalar at `path` is the whole subtree.
                return Ok(Value::String(value));
            }
            let relative: Vec<&str> = row_path[prefix.len()..].split('/').collect();
            insert_at(&mut tree, &relative, value);
        }
        Ok(Value::Object(tree))
    }
}

/// Prefix shared by every path strictly below `path`.
fn descendant_prefix(path: &KeyPath) -> String {
    if path.is_root() {
        "/".to_string()
    } else {
        format!("{path}/")
    }
}

/// Every proper ancestor of `path` below the root, outermost first.
fn ancestor_paths(path: &KeyPath) -> Vec<String> {
    let segments = path.segments();
    (1..segments.len())
        .map(|depth| format!("/{}", segments[..depth].join("/")))
        .collect()
}

fn insert_at(tree: &mut Map<String, Value>, segments: &[&str], value: String) {
    match segments {
        [] => {}
        [leaf] => {
            tree.insert((*leaf).to_string(), Value::String(value));
        }
        [head, rest @ ..] => {
            let child = tree
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                insert_at(map, rest, value);
            }
        }
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert_field(&self, path: &KeyPath, value: &str) -> Result<()> {
        self.write(path, value)
            .map_err(|e| Error::remote(format!("write {path}"), e.to_string()))
    }

    async fn read_subtree(&self, path: &KeyPath) -> Result<Value> {
        self.read(path).map_err(|e| match e {
            Error::NotFound { .. } => e,
            other => Error::remote(format!("read {path}"), other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_gateway() -> SqliteGateway {
        SqliteGateway::open_in_memory().expect("failed to create test gateway")
    }

    fn path(text: &str) -> KeyPath {
        KeyPath::new(text.split('/').filter(|s| !s.is_empty())).unwrap()
    }

    #[tokio::test]
    async fn test_write_and_read_scalar() {
        let gateway = create_test_gateway();
        gateway
            .upsert_field(&path("rfid/041AFF/uid"), "041AFF")
            .await
            .unwrap();

        let value = gateway.read_subtree(&path("rfid/041AFF/uid")).await.unwrap();
        assert_eq!(value, json!("041AFF"));
    }

    #[tokio::test]
    async fn test_read_subtree_builds_document() {
        let gateway = create_test_gateway();
        gateway.upsert_field(&path("rfid/041AFF/uid"), "041AFF").await.unwrap();
        gateway
            .upsert_field(&path("rfid/041AFF/last_scanned"), "2024-01-01 00:00:00")
            .await
            .unwrap();
        gateway.upsert_field(&path("rfid/B2/name"), "Bob").await.unwrap();
        gateway.upsert_field(&path("other/x"), "ignored").await.unwrap();

        let document = gateway.read_subtree(&path("rfid")).await.unwrap();
        assert_eq!(
            document,
            json!({
                "041AFF": {"uid": "041AFF", "last_scanned": "2024-01-01 00:00:00"},
                "B2": {"name": "Bob"}
            })
        );
    }

    #[tokio::test]
    async fn test_read_root() {
        let gateway = create_test_gateway();
        gateway.upsert_field(&path("rfid/0A/uid"), "0A").await.unwrap();

        let document = gateway.read_subtree(&KeyPath::root()).await.unwrap();
        assert_eq!(document, json!({"rfid": {"0A": {"uid": "0A"}}}));
    }

    #[tokio::test]
    async fn test_read_missing_path_is_not_found() {
        let gateway = create_test_gateway();
        let err = gateway.read_subtree(&path("rfid")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_prefix_does_not_match_sibling() {
        let gateway = create_test_gateway();
        gateway.upsert_field(&path("rfid2/0A/uid"), "0A").await.unwrap();

        assert!(gateway.read_subtree(&path("rfid")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let gateway = create_test_gateway();
        let p = path("rfid/0A/last_scanned");
        gateway.upsert_field(&p, "2024-01-01 00:00:00").await.unwrap();
        gateway.upsert_field(&p, "2024-01-02 00:00:00").await.unwrap();

        assert_eq!(
            gateway.read_subtree(&p).await.unwrap(),
            json!("2024-01-02 00:00:00")
        );
    }

    #[tokio::test]
    async fn test_last_scanned_write_leaves_name() {
        let gateway = create_test_gateway();
        gateway.upsert_field(&path("rfid/0A/name"), "Alice").await.unwrap();
        gateway
            .upsert_field(&path("rfid/0A/last_scanned"), "2024-01-01 00:00:00")
            .await
            .unwrap();

        assert_eq!(
            gateway.read_subtree(&path("rfid/0A/name")).await.unwrap(),
            json!("Alice")
        );
    }

    #[tokio::test]
    async fn test_scalar_write_replaces_children() {
        let gateway = create_test_gateway();
        gateway.upsert_field(&path("rfid/0A/uid"), "0A").await.unwrap();
        gateway.upsert_field(&path("rfid/0A"), "flat").await.unwrap();

        assert_eq!(
            gateway.read_subtree(&path("rfid")).await.unwrap(),
            json!({"0A": "flat"})
        );
    }

    #[tokio::test]
    async fn test_child_write_replaces_scalar_ancestor() {
        let gateway = create_test_gateway();
        gateway.upsert_field(&path("rfid/0A"), "flat").await.unwrap();
        gateway.upsert_field(&path("rfid/0A/name"), "Alice").await.unwrap();

        assert_eq!(
            gateway.read_subtree(&path("rfid/0A")).await.unwrap(),
            json!({"name": "Alice"})
        );
        assert_eq!(
            gateway.read_subtree(&path("rfid")).await.unwrap(),
            json!({"0A": {"name": "Alice"}})
        );
    }

    #[test]
    fn test_open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("cards.db");

        let gateway = SqliteGateway::open(&db_path).unwrap();
        assert_eq!(gateway.path(), db_path.as_path());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cards.db");

        {
            let gateway = SqliteGateway::open(&db_path).unwrap();
            gateway.upsert_field(&path("rfid/0A/name"), "Alice").await.unwrap();
        }

        let gateway = SqliteGateway::open(&db_path).unwrap();
        assert_eq!(
            gateway.read_subtree(&path("rfid/0A/name")).await.unwrap(),
            json!("Alice")
        );
    }

    #[test]
    fn test_descendant_prefix() {
        assert_eq!(descendant_prefix(&KeyPath::root()), "/");
        assert_eq!(descendant_prefix(&path("rfid")), "/rfid/");
    }

    #[test]
    fn test_ancestor_paths() {
        assert_eq!(ancestor_paths(&path("rfid/0A/name")), ["/rfid", "/rfid/0A"]);
        assert!(ancestor_paths(&path("rfid")).is_empty());
    }
}
