//! Backend key naming.
//!
//! A store namespaced by `key` owns:
//!
//! - documents at `<key>:<id>`
//! - the primary index at `<indexName>` (default `<key>s`)
//! - lookup indexes at `<indexName>:<lookupName>:<fieldValue>`

use rand::RngCore;

/// Separator between key segments.
pub const SEPARATOR: char = ':';

/// Number of random bytes in a generated id (hex-encoded to twice as many chars).
pub const GENERATED_ID_BYTES: usize = 8;

/// Key layout for one store namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    key: String,
    index_name: String,
}

impl KeySpace {
    /// Key space with the default index name (`key + "s"`).
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let index_name = format!("{key}s");
        Self { key, index_name }
    }

    /// Key space with an explicit index name.
    pub fn with_index_name(key: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            index_name: index_name.into(),
        }
    }

    /// The entity namespace.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name of the primary index.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// `<key>:<id>`
    pub fn document_key(&self, id: &str) -> String {
        format!("{}{SEPARATOR}{id}", self.key)
    }

    /// `<indexName>:<lookupName>:<value>`
    pub fn lookup_key(&self, lookup: &str, value: &str) -> String {
        lookup_key(&self.index_name, lookup, value)
    }

    /// Scan pattern for documents of this namespace: `<key>:<pattern>`.
    pub fn scan_pattern(&self, pattern: &str) -> String {
        format!("{}{SEPARATOR}{pattern}", self.key)
    }
}

/// `<indexName>:<lookupName>:<value>` for an arbitrary index name.
pub fn lookup_key(index_name: &str, lookup: &str, value: &str) -> String {
    format!("{index_name}{SEPARATOR}{lookup}{SEPARATOR}{value}")
}

/// Extract the id from a document key: everything after the first separator.
///
/// Returns `None` for keys without a separator.
pub fn id_from_document_key(key: &str) -> Option<&str> {
    key.split_once(SEPARATOR).map(|(_, id)| id)
}

/// Generate a short random record id.
pub fn generate_id() -> String {
    let mut bytes = [0u8; GENERATED_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
