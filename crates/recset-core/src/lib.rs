//! # recset Core
//!
//! Pure primitives for recset: the record capability set, backend key
//! naming, lookup index derivation, per-call options, and query
//! descriptions.
//!
//! This crate contains no I/O. Everything a write needs (document key, index
//! memberships to add or remove) is computed here before any request is
//! issued.
//!
//! ## Key Types
//!
//! - [`Record`] / [`RecordMeta`] - what a store can hold
//! - [`KeySpace`] - document, primary index, and lookup index naming
//! - [`Lookups`] / [`LookupDiff`] - secondary index derivation and diffing
//! - [`Options`] - per-call overrides merged over store defaults
//! - [`Query`] / [`QueryPlan`] - record selection

pub mod keys;
pub mod lookup;
pub mod options;
pub mod query;
pub mod record;

pub use keys::{generate_id, id_from_document_key, now_millis, KeySpace};
pub use lookup::{value_text, Accessor, LookupDiff, LookupPair, Lookups};
pub use options::Options;
pub use query::{rank_window, Query, QueryPlan};
pub use record::{Document, Record, RecordMeta};
