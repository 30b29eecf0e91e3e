//! # recset Backend
//!
//! Backend abstraction for recset. Provides a trait-based interface to a
//! key-value store holding JSON documents and scored ordered sets, with
//! SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The record store never talks to a concrete storage engine: it issues the
//! primitive operations of the [`Backend`] trait (document get/set/patch/
//! delete, expiry, ordered-set add/remove/range, key scan, multi-get). A
//! remote key-value service, [`SqliteBackend`], and [`MemoryBackend`] all fit
//! behind it.
//!
//! ## Key Types
//!
//! - [`Backend`] - The async trait for all storage operations
//! - [`SqliteBackend`] - SQLite-based persistent storage
//! - [`MemoryBackend`] - In-memory storage for tests
//! - [`KeyType`] - Scan filter
//!
//! ## Usage
//!
//! ```rust,no_run
//! use recset_backend::{Backend, SqliteBackend};
//! use serde_json::json;
//!
//! async fn example() {
//!     let backend = SqliteBackend::open("recset.db").unwrap();
//!
//!     backend.document_set("note:a", &json!({"id": "a"})).await.unwrap();
//!     backend.ordered_set_add("notes", 1, "a").await.unwrap();
//!
//!     let newest = backend.ordered_set_range("notes", 0, 9, true).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Single-key writes**: no operation spans keys atomically
//! - **Rank ranges**: inclusive, negative ranks count from the end
//! - **Lazy expiry**: expired keys vanish on the next access

pub mod error;
pub mod memory;
pub mod migration;
pub mod pattern;
pub mod sqlite;
pub mod traits;

pub use error::{BackendError, Result};
pub use memory::MemoryBackend;
pub use pattern::glob_match;
pub use sqlite::SqliteBackend;
pub use traits::{rank_slice, Backend, KeyType, SCAN_START};
