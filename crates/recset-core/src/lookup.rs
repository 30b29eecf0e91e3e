//! Lookup indexes: derivation and diffing.
//!
//! A [`Lookups`] table maps lookup names to field accessors. For a record
//! snapshot it yields the `(indexKey, id)` pairs the record must be a member
//! of. Nothing here performs I/O: callers compute every write intent up front
//! and then dispatch the writes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::keys::lookup_key;
use crate::options::Options;
use crate::record::Record;

/// Reads the indexed value of a record. `None` means "not indexed".
pub type Accessor<R> = Arc<dyn Fn(&R) -> Option<String> + Send + Sync>;

/// One `(indexKey, id)` membership.
pub type LookupPair = (String, String);

/// Where a lookup reads its value from.
enum Source<R> {
    Accessor(Accessor<R>),
    /// Top-level field of the record's JSON form.
    Field(String),
}

struct Lookup<R> {
    name: String,
    source: Source<R>,
}

/// The static `lookupName -> field accessor` table of a store.
pub struct Lookups<R> {
    entries: Vec<Lookup<R>>,
}

impl<R: Record> Lookups<R> {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a lookup backed by an accessor closure.
    pub fn by<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&R) -> Option<String> + Send + Sync + 'static,
    {
        self.entries.push(Lookup {
            name: name.into(),
            source: Source::Accessor(Arc::new(accessor)),
        });
        self
    }

    /// Add a lookup that reads a top-level field of the record's JSON form.
    pub fn field(mut self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.entries.push(Lookup {
            name: name.into(),
            source: Source::Field(field.into()),
        });
        self
    }

    /// Whether a lookup with this name is configured.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|l| l.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup memberships for `record` under `index_name`.
    ///
    /// Returns nothing when `no_lookup` is set in `options`, and skips lookups
    /// whose accessor yields no value. The record is serialized at most once,
    /// however many field lookups are configured.
    pub fn lookup_keys(&self, record: &R, index_name: &str, options: &Options) -> Vec<LookupPair> {
        if options.is_no_lookup() {
            return Vec::new();
        }

        let json = self
            .entries
            .iter()
            .any(|l| matches!(l.source, Source::Field(_)))
            .then(|| serde_json::to_value(record).ok())
            .flatten();

        self.entries
            .iter()
            .filter_map(|lookup| {
                let value = match &lookup.source {
                    Source::Accessor(accessor) => accessor(record)?,
                    Source::Field(field) => json.as_ref()?.get(field).and_then(value_text)?,
                };
                Some((
                    lookup_key(index_name, &lookup.name, &value),
                    record.id().to_string(),
                ))
            })
            .collect()
    }
}

impl<R: Record> Default for Lookups<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for Lookups<R> {
    fn clone(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|l| Lookup {
                    name: l.name.clone(),
                    source: match &l.source {
                        Source::Accessor(accessor) => Source::Accessor(Arc::clone(accessor)),
                        Source::Field(field) => Source::Field(field.clone()),
                    },
                })
                .collect(),
        }
    }
}

impl<R> fmt::Debug for Lookups<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|l| &l.name))
            .finish()
    }
}

/// Text form of an indexed JSON value. `null` is not indexed.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Membership changes between two snapshots of the same record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupDiff {
    /// Memberships to drop.
    pub remove: Vec<LookupPair>,
    /// Memberships to add.
    pub add: Vec<LookupPair>,
}

impl LookupDiff {
    /// Compute the diff from `before` to `after`.
    ///
    /// A key is removed if it existed before and its value changed or
    /// vanished; a key is added if it exists after and is new or changed.
    /// Keys with identical values on both sides are left alone.
    pub fn between(before: &[LookupPair], after: &[LookupPair]) -> Self {
        let before_map: HashMap<&str, &str> = before
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let after_map: HashMap<&str, &str> = after
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let remove = before
            .iter()
            .filter(|(k, v)| after_map.get(k.as_str()) != Some(&v.as_str()))
            .cloned()
            .collect();
        let add = after
            .iter()
            .filter(|(k, v)| before_map.get(k.as_str()) != Some(&v.as_str()))
            .cloned()
            .collect();

        Self { remove, add }
    }

    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Document;
    use proptest::prelude::*;

    fn doc(id: &str, user: &str, category: &str) -> Document {
        let mut d = Document::new().with("user", user).with("category", category);
        d.meta.id = id.into();
        d
    }

    fn lookups() -> Lookups<Document> {
        Lookups::new()
            .field("user", "user")
            .field("category", "category")
    }

    #[test]
    fn test_lookup_keys_follow_declaration_order() {
        let pairs = lookups().lookup_keys(&doc("n1", "u1", "c1"), "notes", &Options::new());
        assert_eq!(
            pairs,
            vec![
                ("notes:user:u1".to_string(), "n1".to_string()),
                ("notes:category:c1".to_string(), "n1".to_string()),
            ]
        );
    }

    #[test]
    fn test_no_lookup_yields_nothing() {
        let pairs = lookups().lookup_keys(
            &doc("n1", "u1", "c1"),
            "notes",
            &Options::new().no_lookup(true),
        );
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_missing_and_null_fields_are_skipped() {
        let mut d = Document::new().with("user", Value::Null);
        d.meta.id = "n1".into();
        assert!(lookups().lookup_keys(&d, "notes", &Options::new()).is_empty());
    }

    #[test]
    fn test_non_string_values_use_json_text() {
        let mut d = Document::new().with("rank", 7).with("pinned", true);
        d.meta.id = "n1".into();
        let table = Lookups::new().field("rank", "rank").field("pinned", "pinned");
        let keys: Vec<String> = table
            .lookup_keys(&d, "notes", &Options::new())
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["notes:rank:7", "notes:pinned:true"]);
    }

    #[test]
    fn test_accessor_lookup() {
        let table = Lookups::new().by("initial", |d: &Document| {
            d.str_field("user").and_then(|u| u.chars().next()).map(String::from)
        });
        let pairs = table.lookup_keys(&doc("n1", "zed", "c"), "notes", &Options::new());
        assert_eq!(pairs[0].0, "notes:initial:z");
    }

    #[test]
    fn test_mixed_sources_keep_declaration_order() {
        let table = Lookups::new()
            .field("user", "user")
            .by("initial", |d: &Document| {
                d.str_field("category").and_then(|c| c.chars().next()).map(String::from)
            })
            .field("missing", "nope");
        let copy = table.clone();
        assert!(copy.contains("initial"));
        assert!(!copy.contains("nope"));
        assert_eq!(copy.len(), 3);

        let keys: Vec<String> = copy
            .lookup_keys(&doc("n1", "u1", "cat"), "notes", &Options::new())
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["notes:user:u1", "notes:initial:c"]);
    }

    #[test]
    fn test_diff_moves_only_changed_bucket() {
        let table = lookups();
        let before = table.lookup_keys(&doc("n1", "u1", "c1"), "notes", &Options::new());
        let after = table.lookup_keys(&doc("n1", "u1", "c2"), "notes", &Options::new());

        let diff = LookupDiff::between(&before, &after);
        assert_eq!(
            diff.remove,
            vec![("notes:category:c1".to_string(), "n1".to_string())]
        );
        assert_eq!(
            diff.add,
            vec![("notes:category:c2".to_string(), "n1".to_string())]
        );
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let pairs = lookups().lookup_keys(&doc("n1", "u1", "c1"), "notes", &Options::new());
        assert!(LookupDiff::between(&pairs, &pairs).is_empty());
    }

    #[test]
    fn test_diff_from_nothing_adds_all() {
        let after = lookups().lookup_keys(&doc("n1", "u1", "c1"), "notes", &Options::new());
        let diff = LookupDiff::between(&[], &after);
        assert!(diff.remove.is_empty());
        assert_eq!(diff.add, after);
    }

    proptest! {
        #[test]
        fn diff_applied_to_before_yields_after(
            before_user in "[a-c]", before_cat in "[a-c]",
            after_user in "[a-c]", after_cat in "[a-c]",
        ) {
            let table = lookups();
            let before = table.lookup_keys(&doc("n", &before_user, &before_cat), "s", &Options::new());
            let after = table.lookup_keys(&doc("n", &after_user, &after_cat), "s", &Options::new());
            let diff = LookupDiff::between(&before, &after);

            let mut applied: Vec<LookupPair> = before
                .iter()
                .filter(|p| !diff.remove.contains(p))
                .cloned()
                .collect();
            applied.extend(diff.add.iter().cloned());
            applied.sort();
            let mut expected = after.clone();
            expected.sort();
            prop_assert_eq!(applied, expected);

            for pair in &diff.add {
                prop_assert!(!diff.remove.contains(pair));
            }
        }
    }
}
