//! Query resolution: turn a [`Query`] into record ids.
//!
//! Resolution order:
//!
//! 1. explicit ids pass through untouched
//! 2. a scan pattern walks the backend key scan
//! 3. no criteria reads the primary index, newest first
//! 4. criteria read each lookup index and intersect the results
//!
//! With several criteria each lookup range is paginated on its own before
//! the intersection, so a page can come back short when the per-criterion
//! windows diverge. `Query::global_pagination` intersects the full ranges
//! first and paginates afterwards.

use std::collections::HashSet;

use futures::future::try_join_all;
use recset_backend::{Backend, KeyType, SCAN_START};
use recset_core::keys::lookup_key;
use recset_core::{id_from_document_key, rank_window, KeySpace, Query, QueryPlan};

use crate::error::{Result, StoreError};

/// Largest page requested from the backend per scan step.
const MAX_SCAN_PAGE: usize = 1000;

/// Resolves queries against one store namespace.
pub struct QueryResolver<'a, B: Backend + ?Sized> {
    backend: &'a B,
    keys: &'a KeySpace,
    index_name: &'a str,
    scan_default_count: u64,
}

impl<'a, B: Backend + ?Sized> QueryResolver<'a, B> {
    pub fn new(
        backend: &'a B,
        keys: &'a KeySpace,
        index_name: &'a str,
        scan_default_count: u64,
    ) -> Self {
        Self {
            backend,
            keys,
            index_name,
            scan_default_count,
        }
    }

    /// Resolve `query` into an ordered list of ids.
    pub async fn resolve(&self, query: &Query) -> Result<Vec<String>> {
        match query.plan() {
            QueryPlan::Ids(ids) => Ok(ids.to_vec()),
            QueryPlan::Scan(pattern) => self.scan(pattern, query.count).await,
            QueryPlan::All => {
                tracing::debug!(index = self.index_name, "resolving primary index range");
                self.range(self.index_name, query.offset, query.count).await
            }
            QueryPlan::Criteria(criteria) => self.criteria(criteria, query).await,
        }
    }

    /// Newest-first rank window over one ordered set.
    async fn range(&self, set: &str, offset: Option<u64>, count: Option<u64>) -> Result<Vec<String>> {
        let Some((min, max)) = rank_window(offset, count) else {
            return Ok(Vec::new());
        };
        Ok(self.backend.ordered_set_range(set, min, max, true).await?)
    }

    async fn criteria(&self, criteria: &[(String, String)], query: &Query) -> Result<Vec<String>> {
        for (name, value) in criteria {
            if name.is_empty() {
                return Err(StoreError::InvalidArgument(
                    "lookup criterion has an empty name".to_string(),
                ));
            }
            if value.is_empty() {
                return Err(StoreError::InvalidArgument(format!(
                    "lookup criterion {name} has an empty value"
                )));
            }
        }

        let sets: Vec<String> = criteria
            .iter()
            .map(|(name, value)| lookup_key(self.index_name, name, value))
            .collect();
        tracing::debug!(
            criteria = sets.len(),
            global = query.global_pagination,
            "resolving lookup criteria"
        );

        if query.global_pagination {
            let ranges = try_join_all(sets.iter().map(|set| self.range(set, None, None))).await?;
            return Ok(paginate(intersect(ranges), query.offset, query.count));
        }

        let ranges =
            try_join_all(sets.iter().map(|set| self.range(set, query.offset, query.count))).await?;
        Ok(intersect(ranges))
    }

    /// Walk the key scan until `count` distinct ids are found or the cursor
    /// wraps.
    async fn scan(&self, pattern: &str, count: Option<u64>) -> Result<Vec<String>> {
        let cap = match count {
            Some(count) => count,
            None => {
                tracing::warn!(
                    pattern,
                    cap = self.scan_default_count,
                    "scan query without count; applying default cap"
                );
                self.scan_default_count
            }
        };
        let cap = usize::try_from(cap).unwrap_or(usize::MAX);
        if cap == 0 {
            return Ok(Vec::new());
        }

        let pattern = self.keys.scan_pattern(pattern);
        let page_size = cap.min(MAX_SCAN_PAGE);
        let mut cursor = SCAN_START.to_string();
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        loop {
            let (next, keys) = self
                .backend
                .scan_keys(&cursor, &pattern, KeyType::Json, page_size)
                .await?;

            for key in keys {
                let Some(id) = id_from_document_key(&key) else {
                    continue;
                };
                if seen.insert(id.to_string()) {
                    ids.push(id.to_string());
                    if ids.len() >= cap {
                        return Ok(ids);
                    }
                }
            }

            if next.is_empty() || next == SCAN_START {
                return Ok(ids);
            }
            cursor = next;
        }
    }
}

/// Ids present in every list, in the order of the first list.
pub fn intersect(lists: Vec<Vec<String>>) -> Vec<String> {
    let mut lists = lists.into_iter();
    let Some(first) = lists.next() else {
        return Vec::new();
    };
    let others: Vec<HashSet<String>> = lists.map(|l| l.into_iter().collect()).collect();

    let mut seen = HashSet::new();
    first
        .into_iter()
        .filter(|id| others.iter().all(|set| set.contains(id)))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn paginate(ids: Vec<String>, offset: Option<u64>, count: Option<u64>) -> Vec<String> {
    let offset = usize::try_from(offset.unwrap_or(0)).unwrap_or(usize::MAX);
    let count = count.map_or(usize::MAX, |c| usize::try_from(c).unwrap_or(usize::MAX));
    ids.into_iter().skip(offset).take(count).collect()
}

/// Build a query from loose `name=value` pairs, as found in a URL query
/// string.
///
/// `id` (comma-separated), `scan`, `offset`, and `count` are reserved; every
/// other pair becomes a lookup criterion. Non-numeric `offset`/`count` values
/// are dropped with a warning.
pub fn parse_query<I, K, V>(pairs: I) -> Query
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut query = Query::default();

    for (name, value) in pairs {
        let (name, value) = (name.as_ref(), value.as_ref());
        match name {
            "id" => {
                query.ids = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(String::from)
                        .collect(),
                );
            }
            "scan" => query.scan = Some(value.to_string()),
            "offset" => query.offset = parse_number(name, value),
            "count" => query.count = parse_number(name, value),
            _ => query.criteria.push((name.to_string(), value.to_string())),
        }
    }

    query
}

fn parse_number(name: &str, value: &str) -> Option<u64> {
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(parameter = name, value, "dropping non-numeric pagination parameter");
            None
        }
    }
}
