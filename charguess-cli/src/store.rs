//! SQLite-backed store so rounds, scores and cached lookups survive restarts
//! and can be shared by several processes.
//!
//! Every table/key pair is one row holding the JSON text of its value. The
//! read-modify-write primitives run in `BEGIN IMMEDIATE` transactions, which
//! take the database write lock before reading.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use charguess_game::{KvStore, StoreError};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    tbl   TEXT NOT NULL,
    key   TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (tbl, key)
);
";

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn read(conn: &Connection, table: &str, key: &str) -> Result<Option<Value>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM kv WHERE tbl = ?1 AND key = ?2",
            params![table, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(backend)?;
    Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
}

fn write(conn: &Connection, table: &str, key: &str, value: &Value) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO kv (tbl, key, value) VALUES (?1, ?2, ?3)
         ON CONFLICT (tbl, key) DO UPDATE SET value = excluded.value",
        params![table, key, serde_json::to_string(value)?],
    )
    .map_err(backend)?;
    Ok(())
}

pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open `path`, creating the database and its schema when missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(backend)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(backend)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(backend)?;
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` on the blocking pool; a busy database may stall for up to
    /// the busy timeout.
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Backend(err.to_string()))?
    }
}

#[async_trait::async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let (table, key) = (table.to_string(), key.to_string());
        self.run(move |conn| read(conn, &table, &key)).await
    }

    async fn set(&self, table: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let (table, key) = (table.to_string(), key.to_string());
        self.run(move |conn| write(conn, &table, &key, &value)).await
    }

    async fn set_if_absent(
        &self,
        table: &str,
        key: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        let (table, key) = (table.to_string(), key.to_string());
        self.run(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO kv (tbl, key, value) VALUES (?1, ?2, ?3)",
                    params![table, key, serde_json::to_string(&value)?],
                )
                .map_err(backend)?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        table: &str,
        key: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError> {
        let (table, key, expected) = (table.to_string(), key.to_string(), expected.clone());
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            if read(&tx, &table, &key)?.as_ref() != Some(&expected) {
                return Ok(false);
            }
            write(&tx, &table, &key, &new)?;
            tx.commit().map_err(backend)?;
            Ok(true)
        })
        .await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StoreError> {
        let (table, key) = (table.to_string(), key.to_string());
        self.run(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM kv WHERE tbl = ?1 AND key = ?2",
                    params![table, key],
                )
                .map_err(backend)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_all(&self, table: &str) -> Result<(), StoreError> {
        let table = table.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM kv WHERE tbl = ?1", params![table])
                .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn increment(&self, table: &str, key: &str, delta: i64) -> Result<i64, StoreError> {
        let (table, key) = (table.to_string(), key.to_string());
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            let current = match read(&tx, &table, &key)? {
                None => 0,
                Some(value) => value.as_i64().ok_or_else(|| StoreError::NotNumeric {
                    table: table.clone(),
                    key: key.clone(),
                })?,
            };
            let next = current.saturating_add(delta);
            write(&tx, &table, &key, &Value::from(next))?;
            tx.commit().map_err(backend)?;
            Ok(next)
        })
        .await
    }

    async fn entries(&self, table: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let table = table.to_string();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare("SELECT key, value FROM kv WHERE tbl = ?1 ORDER BY key")
                .map_err(backend)?;
            let rows = stmt
                .query_map(params![table], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(backend)?;
            let mut entries = Vec::new();
            for row in rows {
                let (key, raw) = row.map_err(backend)?;
                entries.push((key, serde_json::from_str(&raw)?));
            }
            Ok(entries)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "charguess-store-{label}-{}.db",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[tokio::test]
    async fn writes_survive_reopen() {
        let path = temp_path("reopen");
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.set_if_absent("rounds", "g", json!({"id": 1})).await.unwrap());
        store.increment("scores", "alice", 2).await.unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get("rounds", "g").await.unwrap(), Some(json!({"id": 1})));
        assert_eq!(reopened.increment("scores", "alice", 1).await.unwrap(), 3);
        assert_eq!(
            reopened.entries("scores").await.unwrap(),
            vec![("alice".to_string(), json!(3))]
        );
    }

    #[tokio::test]
    async fn separate_handles_share_atomic_updates() {
        let path = temp_path("shared");
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();

        assert!(first.set_if_absent("rounds", "g", json!({"round": "a"})).await.unwrap());
        assert!(!second.set_if_absent("rounds", "g", json!({"round": "b"})).await.unwrap());

        first.increment("scores", "bob", 1).await.unwrap();
        assert_eq!(second.increment("scores", "bob", 1).await.unwrap(), 2);
        assert_eq!(first.get("scores", "bob").await.unwrap(), Some(json!(2)));

        let seen = json!({"round": "a"});
        assert!(second
            .compare_and_swap("rounds", "g", &seen, json!({"round": "a", "solved": true}))
            .await
            .unwrap());
        assert!(!first
            .compare_and_swap("rounds", "g", &seen, json!({"round": "a", "solved": true}))
            .await
            .unwrap());
        assert!(first.delete("rounds", "g").await.unwrap());
        assert_eq!(second.get("rounds", "g").await.unwrap(), None);
    }

    #[tokio::test]
    async fn increment_rejects_non_numeric_values() {
        let store = SqliteStore::open(temp_path("numeric")).unwrap();
        store.set("scores", "k", json!("three")).await.unwrap();
        assert!(matches!(
            store.increment("scores", "k", 1).await,
            Err(StoreError::NotNumeric { .. })
        ));
    }
}
