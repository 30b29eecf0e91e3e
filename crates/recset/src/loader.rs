//! Batch loading: hydrate resolved ids into records.

use std::collections::HashSet;

use futures::future::try_join_all;
use recset_backend::Backend;
use recset_core::{KeySpace, Record};

use crate::error::Result;

/// Fetches documents for an id list in fixed-size multi-get chunks.
pub struct BatchLoader<'a, B: Backend + ?Sized> {
    backend: &'a B,
    keys: &'a KeySpace,
    batch_size: usize,
    warn_threshold: usize,
}

impl<'a, B: Backend + ?Sized> BatchLoader<'a, B> {
    pub fn new(backend: &'a B, keys: &'a KeySpace, batch_size: usize, warn_threshold: usize) -> Self {
        Self {
            backend,
            keys,
            batch_size: batch_size.max(1),
            warn_threshold,
        }
    }

    /// Load live records for `ids`.
    ///
    /// Duplicate ids are fetched once (first occurrence wins). Missing and
    /// soft-deleted records are dropped. Results follow the id order.
    pub async fn load<R: Record>(&self, ids: &[String]) -> Result<Vec<R>> {
        let mut seen = HashSet::new();
        let keys: Vec<String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| self.keys.document_key(id))
            .collect();

        if keys.is_empty() {
            return Ok(Vec::new());
        }
        if keys.len() > self.warn_threshold {
            tracing::warn!(
                ids = keys.len(),
                threshold = self.warn_threshold,
                "large batch load"
            );
        }

        let chunks = try_join_all(
            keys.chunks(self.batch_size)
                .map(|chunk| self.backend.multi_document_get(chunk)),
        )
        .await?;
        tracing::debug!(ids = keys.len(), chunks = chunks.len(), "batch load complete");

        let mut records = Vec::with_capacity(keys.len());
        for value in chunks.into_iter().flatten().flatten() {
            let record: R = serde_json::from_value(value)?;
            if !record.is_deleted() {
                records.push(record);
            }
        }
        Ok(records)
    }
}
