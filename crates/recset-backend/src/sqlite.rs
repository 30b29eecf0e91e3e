//! SQLite implementation of the Backend trait.
//!
//! A persistent, single-node stand-in for a remote document/ordered-set
//! service. It uses rusqlite with bundled SQLite, wrapped in async via
//! tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{BackendError, Result};
use crate::migration;
use crate::pattern::glob_match;
use crate::traits::{parse_cursor, patch_field, rank_slice, Backend, KeyType, SCAN_START};

/// SQLite-based backend implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteBackend {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection, after dropping expired keys.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| BackendError::Unavailable(format!("mutex poisoned: {e}")))?;
            purge_expired(&conn, now_millis())?;
            f(&mut conn)
        })
        .await
        .map_err(|e| BackendError::Unavailable(format!("spawn_blocking failed: {e}")))?
    }
}

/// Drop every key whose expiry has passed.
fn purge_expired(conn: &Connection, now: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM documents WHERE key IN (SELECT key FROM expiries WHERE expires_at <= ?1)",
        params![now],
    )?;
    conn.execute(
        "DELETE FROM ordered_sets WHERE set_key IN (SELECT key FROM expiries WHERE expires_at <= ?1)",
        params![now],
    )?;
    conn.execute("DELETE FROM expiries WHERE expires_at <= ?1", params![now])?;
    Ok(())
}

fn read_document(conn: &Connection, key: &str) -> Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM documents WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|text| serde_json::from_str(&text).map_err(BackendError::from))
        .transpose()
}

fn is_ordered_set(conn: &Connection, key: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM ordered_sets WHERE set_key = ?1 LIMIT 1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn is_document(conn: &Connection, key: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM documents WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn document_get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.with_conn(move |conn| read_document(conn, &key)).await
    }

    async fn document_set(&self, key: &str, value: &Value) -> Result<()> {
        let key = key.to_string();
        let text = serde_json::to_string(value)?;

        self.with_conn(move |conn| {
            if is_ordered_set(conn, &key)? {
                return Err(BackendError::WrongType(key));
            }
            conn.execute(
                "INSERT OR REPLACE INTO documents (key, value) VALUES (?1, ?2)",
                params![key, text],
            )?;
            Ok(())
        })
        .await
    }

    async fn document_patch(&self, key: &str, path: &str, value: &Value) -> Result<()> {
        let field = patch_field(path)?.to_string();
        let key = key.to_string();
        let value = value.clone();

        self.with_conn(move |conn| {
            let mut doc = read_document(conn, &key)?.ok_or_else(|| BackendError::NotFound(key.clone()))?;
            let object = doc
                .as_object_mut()
                .ok_or_else(|| BackendError::InvalidData(format!("document {key} is not an object")))?;
            object.insert(field, value);

            conn.execute(
                "UPDATE documents SET value = ?2 WHERE key = ?1",
                params![key, serde_json::to_string(&doc)?],
            )?;
            Ok(())
        })
        .await
    }

    async fn document_delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();

        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM documents WHERE key = ?1", params![key])?;
            if removed > 0 {
                conn.execute("DELETE FROM expiries WHERE key = ?1", params![key])?;
            }
            Ok(removed > 0)
        })
        .await
    }

    async fn key_exists(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| Ok(is_document(conn, &key)? || is_ordered_set(conn, &key)?))
            .await
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<()> {
        let key = key.to_string();
        let ttl_ms = i64::try_from(seconds.saturating_mul(1000)).unwrap_or(i64::MAX);

        self.with_conn(move |conn| {
            if !is_document(conn, &key)? && !is_ordered_set(conn, &key)? {
                return Ok(());
            }
            conn.execute(
                "INSERT OR REPLACE INTO expiries (key, expires_at) VALUES (?1, ?2)",
                params![key, now_millis().saturating_add(ttl_ms)],
            )?;
            Ok(())
        })
        .await
    }

    async fn multi_document_get(&self, keys: &[String]) -> Result<Vec<Option<Value>>> {
        let keys = keys.to_vec();

        self.with_conn(move |conn| keys.iter().map(|key| read_document(conn, key)).collect())
            .await
    }

    async fn ordered_set_add(&self, set: &str, score: i64, member: &str) -> Result<()> {
        let set = set.to_string();
        let member = member.to_string();

        self.with_conn(move |conn| {
            if is_document(conn, &set)? {
                return Err(BackendError::WrongType(set));
            }
            conn.execute(
                "INSERT INTO ordered_sets (set_key, member, score) VALUES (?1, ?2, ?3)
                 ON CONFLICT(set_key, member) DO UPDATE SET score = excluded.score",
                params![set, member, score],
            )?;
            Ok(())
        })
        .await
    }

    async fn ordered_set_remove(&self, set: &str, member: &str) -> Result<bool> {
        let set = set.to_string();
        let member = member.to_string();

        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM ordered_sets WHERE set_key = ?1 AND member = ?2",
                params![set, member],
            )?;
            if removed > 0 && !is_ordered_set(conn, &set)? {
                conn.execute("DELETE FROM expiries WHERE key = ?1", params![set])?;
            }
            Ok(removed > 0)
        })
        .await
    }

    async fn ordered_set_range(
        &self,
        set: &str,
        min: i64,
        max: i64,
        reverse: bool,
    ) -> Result<Vec<String>> {
        let set = set.to_string();

        self.with_conn(move |conn| {
            let len: i64 = conn.query_row(
                "SELECT COUNT(*) FROM ordered_sets WHERE set_key = ?1",
                params![set],
                |row| row.get(0),
            )?;
            let Some((offset, count)) = rank_slice(len as usize, min, max) else {
                return Ok(Vec::new());
            };

            let sql = if reverse {
                "SELECT member FROM ordered_sets WHERE set_key = ?1
                 ORDER BY score DESC, member DESC LIMIT ?2 OFFSET ?3"
            } else {
                "SELECT member FROM ordered_sets WHERE set_key = ?1
                 ORDER BY score ASC, member ASC LIMIT ?2 OFFSET ?3"
            };
            let mut stmt = conn.prepare(sql)?;
            let members = stmt
                .query_map(params![set, count as i64, offset as i64], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(members)
        })
        .await
    }

    async fn scan_keys(
        &self,
        cursor: &str,
        pattern: &str,
        key_type: KeyType,
        page_size: usize,
    ) -> Result<(String, Vec<String>)> {
        let position = parse_cursor(cursor)?;
        let pattern = pattern.to_string();
        let page_size = page_size.max(1);

        self.with_conn(move |conn| {
            // Documents resume after a rowid; set keys have none, so resume by offset.
            let (rows, next): (Vec<String>, Option<u64>) = match key_type {
                KeyType::Json => {
                    let mut stmt = conn.prepare(
                        "SELECT rowid, key FROM documents WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
                    )?;
                    let rows = stmt
                        .query_map(params![position as i64, page_size as i64], |row| {
                            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                        })?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    let next = (rows.len() == page_size)
                        .then(|| rows.last().map(|(rowid, _)| *rowid as u64))
                        .flatten();
                    (rows.into_iter().map(|(_, key)| key).collect(), next)
                }
                KeyType::OrderedSet => {
                    let mut stmt = conn.prepare(
                        "SELECT DISTINCT set_key FROM ordered_sets ORDER BY set_key LIMIT ?1 OFFSET ?2",
                    )?;
                    let rows = stmt
                        .query_map(params![page_size as i64, position as i64], |row| row.get(0))?
                        .collect::<rusqlite::Result<Vec<String>>>()?;
                    let next = (rows.len() == page_size).then(|| position + page_size as u64);
                    (rows, next)
                }
            };

            let matched = rows
                .into_iter()
                .filter(|key| glob_match(&pattern, key))
                .collect();
            let next = next.map_or_else(|| SCAN_START.to_string(), |n| n.to_string());
            Ok((next, matched))
        })
        .await
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_document_roundtrip() {
        let backend = SqliteBackend::open_memory().unwrap();
        let doc = json!({"id": "a", "createdAt": 1, "name": "A"});

        backend.document_set("note:a", &doc).await.unwrap();
        assert_eq!(backend.document_get("note:a").await.unwrap(), Some(doc));
        assert!(backend.key_exists("note:a").await.unwrap());

        assert!(backend.document_delete("note:a").await.unwrap());
        assert!(!backend.document_delete("note:a").await.unwrap());
        assert_eq!(backend.document_get("note:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_document_patch() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend
            .document_set("note:a", &json!({"id": "a"}))
            .await
            .unwrap();

        backend
            .document_patch("note:a", "$.deletedAt", &json!(42))
            .await
            .unwrap();
        let doc = backend.document_get("note:a").await.unwrap().unwrap();
        assert_eq!(doc["deletedAt"], 42);

        let missing = backend
            .document_patch("note:b", "$.deletedAt", &json!(42))
            .await;
        assert!(matches!(missing, Err(BackendError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ordered_set_range() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend.ordered_set_add("notes", 3, "c").await.unwrap();
        backend.ordered_set_add("notes", 1, "a").await.unwrap();
        backend.ordered_set_add("notes", 2, "b").await.unwrap();

        let asc = backend.ordered_set_range("notes", 0, -1, false).await.unwrap();
        assert_eq!(asc, vec!["a", "b", "c"]);

        let rev = backend.ordered_set_range("notes", 0, 1, true).await.unwrap();
        assert_eq!(rev, vec!["c", "b"]);

        // Re-adding updates the score.
        backend.ordered_set_add("notes", 10, "a").await.unwrap();
        let rev = backend.ordered_set_range("notes", 0, 0, true).await.unwrap();
        assert_eq!(rev, vec!["a"]);

        assert!(backend.ordered_set_remove("notes", "a").await.unwrap());
        assert!(!backend.ordered_set_remove("notes", "a").await.unwrap());
        let asc = backend.ordered_set_range("notes", 0, -1, false).await.unwrap();
        assert_eq!(asc, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend.ordered_set_add("notes", 1, "a").await.unwrap();
        let result = backend.document_set("notes", &json!({})).await;
        assert!(matches!(result, Err(BackendError::WrongType(_))));
    }

    #[tokio::test]
    async fn test_scan_walks_all_pages() {
        let backend = SqliteBackend::open_memory().unwrap();
        for i in 0..25 {
            backend
                .document_set(&format!("note:{i}"), &json!({"id": i.to_string()}))
                .await
                .unwrap();
        }
        backend
            .document_set("other:x", &json!({}))
            .await
            .unwrap();

        let mut cursor = SCAN_START.to_string();
        let mut seen = Vec::new();
        loop {
            let (next, keys) = backend
                .scan_keys(&cursor, "note:*", KeyType::Json, 10)
                .await
                .unwrap();
            seen.extend(keys);
            if next == SCAN_START {
                break;
            }
            cursor = next;
        }

        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 25);
        assert!(seen.iter().all(|k| k.starts_with("note:")));
    }

    #[tokio::test]
    async fn test_expiry_zero_drops_key() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend
            .document_set("note:a", &json!({"id": "a"}))
            .await
            .unwrap();
        backend.set_expiry("note:a", 0).await.unwrap();
        assert!(!backend.key_exists("note:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_document_set_keeps_expiry() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend
            .document_set("note:a", &json!({"id": "a"}))
            .await
            .unwrap();
        backend.set_expiry("note:a", 1).await.unwrap();
        backend
            .document_set("note:a", &json!({"id": "a", "title": "x"}))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert!(!backend.key_exists("note:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recset.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend
                .document_set("note:a", &json!({"id": "a"}))
                .await
                .unwrap();
            backend.ordered_set_add("notes", 1, "a").await.unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        assert!(backend.key_exists("note:a").await.unwrap());
        assert_eq!(
            backend.ordered_set_range("notes", 0, -1, true).await.unwrap(),
            vec!["a"]
        );
    }
}
