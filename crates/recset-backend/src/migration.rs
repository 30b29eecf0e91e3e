//! SQLite schema versioning.
//!
//! The schema version lives in `PRAGMA user_version`. Each entry of
//! [`STEPS`] upgrades the schema by one version; all pending steps run in a
//! single transaction.

use rusqlite::Connection;

use crate::error::{BackendError, Result};

/// Step `n` moves the schema from version `n` to `n + 1`.
const STEPS: &[&str] = &[
    // v1: documents, ordered sets, expiries
    r#"
    CREATE TABLE documents (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE ordered_sets (
        set_key TEXT NOT NULL,
        member  TEXT NOT NULL,
        score   INTEGER NOT NULL,
        PRIMARY KEY (set_key, member)
    );
    CREATE INDEX idx_ordered_sets_rank ON ordered_sets(set_key, score, member);

    -- deadlines in Unix ms, for documents and sets alike
    CREATE TABLE expiries (
        key        TEXT PRIMARY KEY,
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX idx_expiries_at ON expiries(expires_at);
    "#,
];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = STEPS.len() as u32;

/// The schema version recorded in the database (0 for a fresh file).
pub fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the schema up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let found = schema_version(conn)?;
    if found > CURRENT_VERSION {
        return Err(BackendError::Migration(format!(
            "schema version {found} is newer than this build ({CURRENT_VERSION})"
        )));
    }
    if found == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for sql in &STEPS[found as usize..] {
        tx.execute_batch(sql)?;
    }
    tx.pragma_update(None, "user_version", CURRENT_VERSION)?;
    tx.commit()?;

    tracing::debug!(from = found, to = CURRENT_VERSION, "sqlite schema upgraded");
    Ok(())
}
