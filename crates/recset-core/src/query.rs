//! Query descriptions.
//!
//! A [`Query`] says which records to select; it does not say how. The
//! resolver turns it into ids by following [`Query::plan`].

/// A record selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Explicit ids. Takes priority over everything else.
    pub ids: Option<Vec<String>>,
    /// Key scan pattern (glob, matched against `<key>:<pattern>`).
    pub scan: Option<String>,
    /// Lookup criteria as `(lookupName, value)` pairs.
    pub criteria: Vec<(String, String)>,
    /// First rank to return.
    pub offset: Option<u64>,
    /// Maximum number of ids to return.
    pub count: Option<u64>,
    /// Intersect full criterion ranges before paginating, instead of
    /// paginating each criterion independently.
    pub global_pagination: bool,
}

/// The resolution path a query takes, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPlan<'a> {
    /// Pass the ids through.
    Ids(&'a [String]),
    /// Cursor scan over document keys.
    Scan(&'a str),
    /// Reverse-chronological range over the primary index.
    All,
    /// Ranges over lookup indexes, intersected.
    Criteria(&'a [(String, String)]),
}

impl Query {
    /// Every live record, most recent first.
    pub fn all() -> Self {
        Self::default()
    }

    /// Re-hydrate known ids.
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Scan document keys matching `pattern`.
    pub fn scan(pattern: impl Into<String>) -> Self {
        Self {
            scan: Some(pattern.into()),
            ..Self::default()
        }
    }

    /// Add a lookup criterion.
    pub fn filter(mut self, lookup: impl Into<String>, value: impl Into<String>) -> Self {
        self.criteria.push((lookup.into(), value.into()));
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Switch multi-criterion queries to intersect-then-paginate.
    pub fn global_pagination(mut self) -> Self {
        self.global_pagination = true;
        self
    }

    /// The resolution path for this query.
    pub fn plan(&self) -> QueryPlan<'_> {
        if let Some(ids) = &self.ids {
            QueryPlan::Ids(ids)
        } else if let Some(pattern) = &self.scan {
            QueryPlan::Scan(pattern)
        } else if self.criteria.is_empty() {
            QueryPlan::All
        } else {
            QueryPlan::Criteria(&self.criteria)
        }
    }

    /// Inclusive rank window `(min, max)` for a range read.
    ///
    /// Without a count the window runs to the end of the set (`max = -1`).
    /// A zero count yields `None`: nothing to read.
    pub fn rank_window(&self) -> Option<(i64, i64)> {
        rank_window(self.offset, self.count)
    }
}

/// Inclusive rank window for `offset` / `count`.
pub fn rank_window(offset: Option<u64>, count: Option<u64>) -> Option<(i64, i64)> {
    let min = offset.unwrap_or(0).min(i64::MAX as u64) as i64;
    match count {
        None => Some((min, -1)),
        Some(0) => None,
        Some(count) => {
            let count = count.min(i64::MAX as u64) as i64;
            Some((min, min.saturating_add(count - 1)))
        }
    }
}
