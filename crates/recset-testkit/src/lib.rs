//! # recset testkit
//!
//! Testing utilities for recset.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a ready-made `Note` record and a store over a memory backend
//! - **Generators**: Proptest strategies for records and store workloads
//! - **Faults**: a backend wrapper that fails selected writes
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use recset_testkit::{Note, TestFixture};
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let note = fixture.create(Note::new("hello", "u1")).await;
//!     assert_eq!(fixture.members("notes:user:u1").await.len(), 1);
//! }
//! ```
//!
//! ## Fault Injection
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use recset_backend::MemoryBackend;
//! use recset_testkit::{FailingBackend, TestFixture};
//!
//! let backend = Arc::new(FailingBackend::new(MemoryBackend::new()));
//! backend.fail_on("notes:user:*");
//! let fixture = TestFixture::with_backend(backend);
//! ```

pub mod faults;
pub mod fixtures;
pub mod generators;

pub use faults::FailingBackend;
pub use fixtures::{init_tracing, note_config, Note, TestFixture};
pub use generators::{store_ops, NoteParams, StoreOp};
