//! # recset
//!
//! An indexed record store over a JSON document and ordered-set backend.
//!
//! ## Overview
//!
//! Records are JSON documents keyed `<key>:<id>`. Every live record is a
//! member of a primary ordered set (scored by `createdAt`) and of one lookup
//! set per configured lookup, named `<index>:<lookup>:<value>`. Queries
//! resolve to ids through those sets (or a key scan) and are hydrated in
//! batched multi-gets.
//!
//! - **Lifecycle**: create, update, soft/hard delete, restore
//! - **Lookups**: secondary indexes kept in step with field values
//! - **Queries**: id lists, scans, full range, and lookup intersections
//! - **Backends**: in-memory and SQLite, behind one async trait
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use recset::{Document, Lookups, Options, Query, Record, RecordStore, StoreConfig};
//! use recset::backend::MemoryBackend;
//!
//! async fn example() -> recset::Result<()> {
//!     let config = StoreConfig::new("note").lookups(Lookups::new().field("user", "user"));
//!     let store = RecordStore::new(Arc::new(MemoryBackend::new()), config);
//!
//!     let note = store
//!         .create(Document::new().with("user", "u1"), &Options::new())
//!         .await?;
//!
//!     let mine = store.find(&Query::all().filter("user", "u1")).await?;
//!     assert_eq!(mine[0].id(), note.id());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `recset::core` - record model, keys, options, lookups, queries
//! - `recset::backend` - the backend trait and its implementations

pub mod config;
pub mod error;
pub mod loader;
pub mod query;
pub mod store;
mod write;

pub use recset_backend as backend;
pub use recset_core as core;

pub use config::{BackendConfig, StoreConfig};
pub use error::{Result, StoreError};
pub use loader::BatchLoader;
pub use query::{intersect, parse_query, QueryResolver};
pub use store::RecordStore;

pub use recset_core::{Document, LookupDiff, Lookups, Options, Query, Record, RecordMeta};
