//! The record capability set.
//!
//! Every entity held by a store carries the same four bookkeeping fields:
//! `id`, `createdAt`, and the optional `updatedAt` / `deletedAt` markers.
//! Records embed a [`RecordMeta`] with `#[serde(flatten)]` so the fields sit
//! at the top level of the stored JSON document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bookkeeping fields shared by all records.
///
/// An empty `id` and a zero `created_at` mean "not assigned yet"; the store
/// fills them in on create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    /// Primary key.
    #[serde(default)]
    pub id: String,
    /// Creation time (Unix ms). Doubles as the index score.
    #[serde(default)]
    pub created_at: i64,
    /// Last update time (Unix ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Soft-delete marker (Unix ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl RecordMeta {
    /// Meta with a caller-chosen id and nothing else assigned.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Whether the record carries a soft-delete marker.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A record a store can hold.
///
/// Implementors only provide access to their [`RecordMeta`]; everything else
/// has a default.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn created_at(&self) -> i64 {
        self.meta().created_at
    }

    fn updated_at(&self) -> Option<i64> {
        self.meta().updated_at
    }

    fn deleted_at(&self) -> Option<i64> {
        self.meta().deleted_at
    }

    fn is_deleted(&self) -> bool {
        self.meta().is_deleted()
    }
}

/// A schemaless record: bookkeeping fields plus arbitrary JSON fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Read a field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Read a string field.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

impl Record for Document {
    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}
