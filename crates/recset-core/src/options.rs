//! Per-call options.
//!
//! A store holds a set of default [`Options`]; every operation accepts an
//! override set which is merged over the defaults (a value set on the call
//! wins).

/// Options recognized by store operations. Unset fields fall through to the
/// store defaults, then to `false` / none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Index name override for lookup key derivation.
    pub index_name: Option<String>,
    /// Skip lookup index maintenance.
    pub no_lookup: Option<bool>,
    /// Skip the primary index on create.
    pub no_index: Option<bool>,
    /// Document expiry in seconds.
    pub expire: Option<u64>,
    /// Remove the document instead of marking it deleted.
    pub hard_delete: Option<bool>,
    /// Return soft-deleted records from `get`.
    pub deleted: Option<bool>,
}

impl Options {
    /// Empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    pub fn no_lookup(mut self, value: bool) -> Self {
        self.no_lookup = Some(value);
        self
    }

    pub fn no_index(mut self, value: bool) -> Self {
        self.no_index = Some(value);
        self
    }

    pub fn expire(mut self, seconds: u64) -> Self {
        self.expire = Some(seconds);
        self
    }

    pub fn hard_delete(mut self, value: bool) -> Self {
        self.hard_delete = Some(value);
        self
    }

    pub fn deleted(mut self, value: bool) -> Self {
        self.deleted = Some(value);
        self
    }

    /// Merge `overrides` over `self`.
    pub fn merge(&self, overrides: &Options) -> Options {
        Options {
            index_name: overrides
                .index_name
                .clone()
                .or_else(|| self.index_name.clone()),
            no_lookup: overrides.no_lookup.or(self.no_lookup),
            no_index: overrides.no_index.or(self.no_index),
            expire: overrides.expire.or(self.expire),
            hard_delete: overrides.hard_delete.or(self.hard_delete),
            deleted: overrides.deleted.or(self.deleted),
        }
    }

    pub fn is_no_lookup(&self) -> bool {
        self.no_lookup.unwrap_or(false)
    }

    pub fn is_no_index(&self) -> bool {
        self.no_index.unwrap_or(false)
    }

    pub fn is_hard_delete(&self) -> bool {
        self.hard_delete.unwrap_or(false)
    }

    pub fn include_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }
}
