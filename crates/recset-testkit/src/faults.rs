//! Fault injection.
//!
//! [`FailingBackend`] wraps a real backend and fails writes to keys that
//! match configured glob patterns. Reads always pass through, so a test can
//! observe exactly which writes of a fan-out landed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use recset_backend::{glob_match, Backend, BackendError, KeyType, Result};
use serde_json::Value;

/// A backend whose writes fail on matching keys.
pub struct FailingBackend<B> {
    inner: B,
    patterns: RwLock<Vec<String>>,
    failures: AtomicUsize,
}

impl<B: Backend> FailingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            patterns: RwLock::new(Vec::new()),
            failures: AtomicUsize::new(0),
        }
    }

    /// Fail writes to keys matching the glob `pattern`.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        if let Ok(mut patterns) = self.patterns.write() {
            patterns.push(pattern.into());
        }
    }

    /// Stop failing writes.
    pub fn heal(&self) {
        if let Ok(mut patterns) = self.patterns.write() {
            patterns.clear();
        }
    }

    /// Number of writes rejected so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn check(&self, key: &str) -> Result<()> {
        let hit = self
            .patterns
            .read()
            .map(|patterns| patterns.iter().any(|p| glob_match(p, key)))
            .unwrap_or(false);
        if hit {
            self.failures.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(key, "injected write failure");
            return Err(BackendError::Unavailable(format!(
                "injected failure writing {key}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<B: Backend> Backend for FailingBackend<B> {
    async fn document_get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.document_get(key).await
    }

    async fn document_set(&self, key: &str, value: &Value) -> Result<()> {
        self.check(key)?;
        self.inner.document_set(key, value).await
    }

    async fn document_patch(&self, key: &str, path: &str, value: &Value) -> Result<()> {
        self.check(key)?;
        self.inner.document_patch(key, path, value).await
    }

    async fn document_delete(&self, key: &str) -> Result<bool> {
        self.check(key)?;
        self.inner.document_delete(key).await
    }

    async fn key_exists(&self, key: &str) -> Result<bool> {
        self.inner.key_exists(key).await
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<()> {
        self.check(key)?;
        self.inner.set_expiry(key, seconds).await
    }

    async fn multi_document_get(&self, keys: &[String]) -> Result<Vec<Option<Value>>> {
        self.inner.multi_document_get(keys).await
    }

    async fn ordered_set_add(&self, set: &str, score: i64, member: &str) -> Result<()> {
        self.check(set)?;
        self.inner.ordered_set_add(set, score, member).await
    }

    async fn ordered_set_remove(&self, set: &str, member: &str) -> Result<bool> {
        self.check(set)?;
        self.inner.ordered_set_remove(set, member).await
    }

    async fn ordered_set_range(
        &self,
        set: &str,
        min: i64,
        max: i64,
        reverse: bool,
    ) -> Result<Vec<String>> {
        self.inner.ordered_set_range(set, min, max, reverse).await
    }

    async fn scan_keys(
        &self,
        cursor: &str,
        pattern: &str,
        key_type: KeyType,
        page_size: usize,
    ) -> Result<(String, Vec<String>)> {
        self.inner.scan_keys(cursor, pattern, key_type, page_size).await
    }
}
