//! In-memory implementation of the Backend trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BackendError, Result};
use crate::pattern::glob_match;
use crate::traits::{parse_cursor, patch_field, rank_slice, Backend, KeyType, SCAN_START};

/// In-memory backend implementation.
///
/// All data is lost when the backend is dropped. Thread-safe via RwLock.
pub struct MemoryBackend {
    inner: RwLock<MemoryBackendInner>,
}

#[derive(Default)]
struct MemoryBackendInner {
    /// JSON documents by key.
    documents: BTreeMap<String, Value>,

    /// Ordered sets by key.
    sets: BTreeMap<String, OrderedSet>,

    /// Expiry deadlines (Unix ms), shared by documents and sets.
    expiries: HashMap<String, i64>,
}

/// Members ordered by `(score, member)`, with a reverse map for updates.
#[derive(Default)]
struct OrderedSet {
    scores: HashMap<String, i64>,
    ranked: BTreeSet<(i64, String)>,
}

impl OrderedSet {
    fn insert(&mut self, score: i64, member: &str) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ranked.remove(&(old, member.to_string()));
        }
        self.ranked.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => self.ranked.remove(&(score, member.to_string())),
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl MemoryBackendInner {
    fn is_expired(&self, key: &str, now: i64) -> bool {
        self.expiries.get(key).is_some_and(|&at| at <= now)
    }

    /// Drop `key` if its expiry has passed.
    fn evict(&mut self, key: &str, now: i64) {
        if self.is_expired(key, now) {
            self.documents.remove(key);
            self.sets.remove(key);
            self.expiries.remove(key);
        }
    }

    fn document(&self, key: &str, now: i64) -> Option<&Value> {
        if self.is_expired(key, now) {
            return None;
        }
        self.documents.get(key)
    }

    fn set(&self, key: &str, now: i64) -> Option<&OrderedSet> {
        if self.is_expired(key, now) {
            return None;
        }
        self.sets.get(key)
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryBackendInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryBackendInner>> {
        self.inner
            .read()
            .map_err(|e| BackendError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryBackendInner>> {
        self.inner
            .write()
            .map_err(|e| BackendError::Unavailable(format!("lock poisoned: {e}")))
    }

    /// Number of live documents. Test helper.
    pub fn document_count(&self) -> Result<usize> {
        let inner = self.read()?;
        let now = now_millis();
        Ok(inner
            .documents
            .keys()
            .filter(|k| !inner.is_expired(k, now))
            .count())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn document_get(&self, key: &str) -> Result<Option<Value>> {
        let inner = self.read()?;
        Ok(inner.document(key, now_millis()).cloned())
    }

    async fn document_set(&self, key: &str, value: &Value) -> Result<()> {
        let mut inner = self.write()?;
        inner.evict(key, now_millis());

        if inner.sets.contains_key(key) {
            return Err(BackendError::WrongType(key.to_string()));
        }
        inner.documents.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn document_patch(&self, key: &str, path: &str, value: &Value) -> Result<()> {
        let field = patch_field(path)?;
        let mut inner = self.write()?;
        inner.evict(key, now_millis());

        let doc = inner
            .documents
            .get_mut(key)
            .ok_or_else(|| BackendError::NotFound(key.to_string()))?;
        let object = doc
            .as_object_mut()
            .ok_or_else(|| BackendError::InvalidData(format!("document {key} is not an object")))?;
        object.insert(field.to_string(), value.clone());
        Ok(())
    }

    async fn document_delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.write()?;
        inner.evict(key, now_millis());

        let removed = inner.documents.remove(key).is_some();
        if removed {
            inner.expiries.remove(key);
        }
        Ok(removed)
    }

    async fn key_exists(&self, key: &str) -> Result<bool> {
        let inner = self.read()?;
        let now = now_millis();
        Ok(inner.document(key, now).is_some() || inner.set(key, now).is_some())
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<()> {
        let mut inner = self.write()?;
        let now = now_millis();
        inner.evict(key, now);

        if inner.documents.contains_key(key) || inner.sets.contains_key(key) {
            let ttl_ms = i64::try_from(seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
            inner
                .expiries
                .insert(key.to_string(), now.saturating_add(ttl_ms));
        }
        Ok(())
    }

    async fn multi_document_get(&self, keys: &[String]) -> Result<Vec<Option<Value>>> {
        let inner = self.read()?;
        let now = now_millis();
        Ok(keys
            .iter()
            .map(|key| inner.document(key, now).cloned())
            .collect())
    }

    async fn ordered_set_add(&self, set: &str, score: i64, member: &str) -> Result<()> {
        let mut inner = self.write()?;
        inner.evict(set, now_millis());

        if inner.documents.contains_key(set) {
            return Err(BackendError::WrongType(set.to_string()));
        }
        inner
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(score, member);
        Ok(())
    }

    async fn ordered_set_remove(&self, set: &str, member: &str) -> Result<bool> {
        let mut inner = self.write()?;
        inner.evict(set, now_millis());

        let Some(members) = inner.sets.get_mut(set) else {
            return Ok(false);
        };
        let removed = members.remove(member);
        if members.is_empty() {
            inner.sets.remove(set);
            inner.expiries.remove(set);
        }
        Ok(removed)
    }

    async fn ordered_set_range(
        &self,
        set: &str,
        min: i64,
        max: i64,
        reverse: bool,
    ) -> Result<Vec<String>> {
        let inner = self.read()?;
        let Some(members) = inner.set(set, now_millis()) else {
            return Ok(Vec::new());
        };
        let Some((offset, count)) = rank_slice(members.len(), min, max) else {
            return Ok(Vec::new());
        };

        let ranked: Box<dyn Iterator<Item = &(i64, String)>> = if reverse {
            Box::new(members.ranked.iter().rev())
        } else {
            Box::new(members.ranked.iter())
        };
        Ok(ranked
            .skip(offset)
            .take(count)
            .map(|(_, member)| member.clone())
            .collect())
    }

    async fn scan_keys(
        &self,
        cursor: &str,
        pattern: &str,
        key_type: KeyType,
        page_size: usize,
    ) -> Result<(String, Vec<String>)> {
        let position = parse_cursor(cursor)? as usize;
        let page_size = page_size.max(1);
        let inner = self.read()?;
        let now = now_millis();

        let keys: Box<dyn Iterator<Item = &String>> = match key_type {
            KeyType::Json => Box::new(inner.documents.keys()),
            KeyType::OrderedSet => Box::new(inner.sets.keys()),
        };
        let page: Vec<&String> = keys.skip(position).take(page_size).collect();

        let next = if page.len() == page_size {
            (position + page_size).to_string()
        } else {
            SCAN_START.to_string()
        };
        let matched = page
            .into_iter()
            .filter(|key| !inner.is_expired(key, now) && glob_match(pattern, key))
            .cloned()
            .collect();
        Ok((next, matched))
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
