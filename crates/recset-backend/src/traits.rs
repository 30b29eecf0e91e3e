//! Backend trait: the abstract interface for document and ordered-set storage.
//!
//! This trait keeps the record store backend-agnostic. Implementations
//! include SQLite (persistent) and in-memory (for tests). A networked
//! key-value service fits behind the same trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BackendError, Result};

/// Cursor value that starts a scan and signals a completed one.
pub const SCAN_START: &str = "0";

/// Kind of value stored under a key, used to filter scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// A JSON document.
    Json,
    /// An ordered set of scored members.
    OrderedSet,
}

/// The Backend trait: async interface to the document/ordered-set store.
///
/// # Design Notes
///
/// - **No multi-key transactions**: every call touches one key (or reads
///   several). Callers that need several writes issue them independently.
/// - **Rank ranges**: `ordered_set_range` takes inclusive ranks; negative
///   ranks count from the end (`-1` is the last member).
/// - **Scans**: `scan_keys` examines roughly `page_size` keys per call and
///   returns the cursor to resume from; [`SCAN_START`] means "done".
#[async_trait]
pub trait Backend: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Document Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a JSON document.
    async fn document_get(&self, key: &str) -> Result<Option<Value>>;

    /// Store a JSON document, replacing any previous value. An existing
    /// expiry on the key is kept.
    async fn document_set(&self, key: &str, value: &Value) -> Result<()>;

    /// Set one top-level field of an existing document.
    ///
    /// `path` is `$.field` or `field`. Fails with `NotFound` if the document
    /// does not exist.
    async fn document_patch(&self, key: &str, path: &str, value: &Value) -> Result<()>;

    /// Remove a document. Returns whether it existed.
    async fn document_delete(&self, key: &str) -> Result<bool>;

    /// Check whether any value is stored under `key`.
    async fn key_exists(&self, key: &str) -> Result<bool>;

    /// Expire `key` after `seconds`.
    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<()>;

    /// Get several documents, aligned with `keys`.
    async fn multi_document_get(&self, keys: &[String]) -> Result<Vec<Option<Value>>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Ordered Set Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Add `member` with `score`, updating the score if already present.
    async fn ordered_set_add(&self, set: &str, score: i64, member: &str) -> Result<()>;

    /// Remove `member`. Returns whether it was present.
    async fn ordered_set_remove(&self, set: &str, member: &str) -> Result<bool>;

    /// Members ranked `min..=max` by ascending score, or by descending score
    /// when `reverse` is set.
    async fn ordered_set_range(
        &self,
        set: &str,
        min: i64,
        max: i64,
        reverse: bool,
    ) -> Result<Vec<String>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Key Scan
    // ─────────────────────────────────────────────────────────────────────────

    /// One step of a key scan.
    ///
    /// Returns the next cursor and the keys of `key_type` matching the glob
    /// `pattern` found in this step.
    async fn scan_keys(
        &self,
        cursor: &str,
        pattern: &str,
        key_type: KeyType,
        page_size: usize,
    ) -> Result<(String, Vec<String>)>;
}

/// Resolve an inclusive rank window against a set of `len` members.
///
/// Returns `(offset, count)` or `None` when the window is empty.
pub fn rank_slice(len: usize, min: i64, max: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if min < 0 { (len + min).max(0) } else { min };
    let stop = if max < 0 { len + max } else { max.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, (stop - start + 1) as usize))
}

/// The field name addressed by a patch path.
pub fn patch_field(path: &str) -> Result<&str> {
    let field = path.strip_prefix("$.").unwrap_or(path);
    if field.is_empty() || field.contains('.') || field.contains('[') || field == "$" {
        return Err(BackendError::InvalidData(format!(
            "unsupported patch path: {path}"
        )));
    }
    Ok(field)
}

/// Parse a scan cursor into a position.
pub fn parse_cursor(cursor: &str) -> Result<u64> {
    if cursor.is_empty() {
        return Ok(0);
    }
    cursor
        .parse()
        .map_err(|_| BackendError::InvalidData(format!("invalid scan cursor: {cursor}")))
}
