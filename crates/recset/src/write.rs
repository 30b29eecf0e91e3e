//! Write fan-out.
//!
//! Store operations first build the complete list of [`WriteOp`]s, then hand
//! it to [`dispatch`], which issues every op concurrently and waits for all
//! of them to settle. There is no rollback: an op that succeeded stays
//! applied even when a sibling fails.

use futures::future::join_all;
use recset_backend::{Backend, BackendError};
use serde_json::Value;

use crate::error::Result;

/// One backend write.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WriteOp {
    /// Store a document, then expire it when `expire` is set.
    PutDocument {
        key: String,
        value: Value,
        expire: Option<u64>,
    },
    /// Set one top-level field of a document.
    PatchDocument {
        key: String,
        path: &'static str,
        value: Value,
    },
    DeleteDocument {
        key: String,
    },
    IndexAdd {
        set: String,
        score: i64,
        member: String,
    },
    IndexRemove {
        set: String,
        member: String,
    },
}

/// Issue all `ops` concurrently.
///
/// Resolves once every op has settled. Fails with the first error (in op
/// order) if any op failed.
pub(crate) async fn dispatch<B>(backend: &B, ops: &[WriteOp]) -> Result<()>
where
    B: Backend + ?Sized,
{
    let results = join_all(ops.iter().map(|op| apply(backend, op))).await;

    let mut failures = results.into_iter().filter_map(|r| r.err());
    let Some(first) = failures.next() else {
        tracing::debug!(writes = ops.len(), "writes settled");
        return Ok(());
    };

    let failed = 1 + failures.count();
    tracing::warn!(
        failed,
        total = ops.len(),
        error = %first,
        "partial write failure; completed writes were not rolled back"
    );
    Err(first.into())
}

async fn apply<B>(backend: &B, op: &WriteOp) -> std::result::Result<(), BackendError>
where
    B: Backend + ?Sized,
{
    match op {
        WriteOp::PutDocument { key, value, expire } => {
            backend.document_set(key, value).await?;
            if let Some(seconds) = expire {
                backend.set_expiry(key, *seconds).await?;
            }
            Ok(())
        }
        WriteOp::PatchDocument { key, path, value } => {
            backend.document_patch(key, path, value).await
        }
        WriteOp::DeleteDocument { key } => backend.document_delete(key).await.map(|_| ()),
        WriteOp::IndexAdd { set, score, member } => {
            backend.ordered_set_add(set, *score, member).await
        }
        WriteOp::IndexRemove { set, member } => {
            backend.ordered_set_remove(set, member).await.map(|_| ())
        }
    }
}
