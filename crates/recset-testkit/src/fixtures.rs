//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::{Arc, Once};

use recset::{Lookups, Options, RecordStore, StoreConfig};
use recset_backend::{Backend, MemoryBackend};
use recset_core::{Record, RecordMeta};
use serde::{Deserialize, Serialize};

/// A small record with two lookup fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub title: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Note {
    pub fn new(title: &str, user: &str) -> Self {
        Self {
            title: title.to_string(),
            user: user.to_string(),
            ..Self::default()
        }
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.meta.created_at = created_at;
        self
    }
}

impl Record for Note {
    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// Store configuration for [`Note`]: namespace `note`, lookups on `user`
/// and `category`.
pub fn note_config() -> StoreConfig<Note> {
    StoreConfig::new("note").lookups(
        Lookups::new()
            .by("user", |n: &Note| Some(n.user.clone()))
            .by("category", |n: &Note| n.category.clone()),
    )
}

/// A note store over a fresh memory backend.
pub struct TestFixture<B: Backend + ?Sized = MemoryBackend> {
    pub backend: Arc<B>,
    pub store: RecordStore<Note, B>,
}

impl TestFixture<MemoryBackend> {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }
}

impl Default for TestFixture<MemoryBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend + ?Sized> TestFixture<B> {
    /// A note store over an existing backend.
    pub fn with_backend(backend: Arc<B>) -> Self {
        Self {
            store: RecordStore::new(backend.clone(), note_config()),
            backend,
        }
    }

    /// Create a note with default options.
    pub async fn create(&self, note: Note) -> Note {
        self.store
            .create(note, &Options::new())
            .await
            .expect("create note")
    }

    /// Create `count` notes for `user` with ascending `createdAt` (1, 2, ...).
    pub async fn seed(&self, user: &str, count: usize) -> Vec<Note> {
        let mut notes = Vec::with_capacity(count);
        for i in 0..count {
            let note = Note::new(&format!("note {i}"), user).with_created_at(i as i64 + 1);
            notes.push(self.create(note).await);
        }
        notes
    }

    /// Members of an ordered set, highest score first.
    pub async fn members(&self, set: &str) -> Vec<String> {
        self.backend
            .ordered_set_range(set, 0, -1, true)
            .await
            .expect("read ordered set")
    }
}

/// Install a test-writer tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
