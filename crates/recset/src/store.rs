//! The record store: entity lifecycle plus index maintenance.
//!
//! Each write operation computes its full set of backend writes up front
//! (document, primary index, lookup indexes) and issues them concurrently.
//! The backend has no multi-key transactions, so a failed write leaves the
//! others in effect; the operation reports the failure and [`RecordStore::reindex`]
//! can repair a record's index memberships afterwards.

use std::sync::Arc;

use recset_backend::Backend;
use recset_core::{generate_id, now_millis, LookupDiff, LookupPair, Options, Query, Record};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::loader::BatchLoader;
use crate::query::QueryResolver;
use crate::write::{dispatch, WriteOp};

/// JSON path of the soft-delete marker.
const DELETED_AT_PATH: &str = "$.deletedAt";

/// An indexed record store for records of type `R`.
///
/// Documents live at `<key>:<id>`; live ids are members of the primary index
/// and of one lookup index per configured lookup, all scored by `createdAt`.
pub struct RecordStore<R: Record, B: Backend + ?Sized = dyn Backend> {
    backend: Arc<B>,
    config: StoreConfig<R>,
}

impl<R: Record, B: Backend + ?Sized> RecordStore<R, B> {
    /// Create a store over `backend`.
    pub fn new(backend: Arc<B>, config: StoreConfig<R>) -> Self {
        Self { backend, config }
    }

    /// The backend reference.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig<R> {
        &self.config
    }

    fn options(&self, overrides: &Options) -> Options {
        self.config.defaults.merge(overrides)
    }

    fn index_name<'a>(&'a self, options: &'a Options) -> &'a str {
        options
            .index_name
            .as_deref()
            .unwrap_or_else(|| self.config.keys.index_name())
    }

    fn lookup_keys(&self, record: &R, options: &Options) -> Vec<LookupPair> {
        self.config
            .lookups
            .lookup_keys(record, self.index_name(options), options)
    }

    /// Lookup memberships a record should have: none while soft-deleted.
    fn live_lookup_keys(&self, record: &R, options: &Options) -> Vec<LookupPair> {
        if record.is_deleted() {
            return Vec::new();
        }
        self.lookup_keys(record, options)
    }

    /// Read and decode a document, soft-deleted or not.
    async fn read(&self, id: &str) -> Result<Option<R>> {
        let key = self.config.keys.document_key(id);
        match self.backend.document_get(&key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether a document exists for `id`, soft-deleted or not.
    ///
    /// An empty id is rejected with `InvalidArgument` rather than reported
    /// as absent.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        require_id(id)?;
        let key = self.config.keys.document_key(id);
        Ok(self.backend.key_exists(&key).await?)
    }

    /// Get a record by id.
    ///
    /// Soft-deleted records are returned only when `deleted` is set.
    pub async fn get(&self, id: &str, options: &Options) -> Result<Option<R>> {
        require_id(id)?;
        let options = self.options(options);
        let record = self.read(id).await?;
        Ok(record.filter(|r| options.include_deleted() || !r.is_deleted()))
    }

    /// Resolve `query` to ids without loading documents.
    pub async fn ids(&self, query: &Query) -> Result<Vec<String>> {
        self.resolve(query, &self.options(&Options::default())).await
    }

    /// Find live records matching `query`.
    pub async fn find(&self, query: &Query) -> Result<Vec<R>> {
        self.find_with(query, &Options::default()).await
    }

    /// [`RecordStore::find`] with per-call options; `index_name` selects
    /// the index family the query reads.
    pub async fn find_with(&self, query: &Query, options: &Options) -> Result<Vec<R>> {
        let options = self.options(options);
        let ids = self.resolve(query, &options).await?;
        BatchLoader::new(
            self.backend.as_ref(),
            &self.config.keys,
            self.config.batch_size,
            self.config.warn_threshold,
        )
        .load(&ids)
        .await
    }

    async fn resolve(&self, query: &Query, options: &Options) -> Result<Vec<String>> {
        for (name, _) in &query.criteria {
            if !self.config.lookups.contains(name) {
                tracing::warn!(lookup = %name, "query filters on an unconfigured lookup");
            }
        }
        QueryResolver::new(
            self.backend.as_ref(),
            &self.config.keys,
            self.index_name(options),
            self.config.scan_default_count,
        )
        .resolve(query)
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a record.
    ///
    /// Assigns an id and `createdAt` if the record has none, writes the
    /// document, and indexes it. Returns the stored record.
    ///
    /// A caller-supplied id that already has a document replaces it: the
    /// memberships of the stored version that the new one does not share are
    /// removed, and every index is re-scored with the new `createdAt`.
    pub async fn create(&self, record: R, options: &Options) -> Result<R> {
        let options = self.options(options);
        let mut record = record;
        let previous = if record.id().is_empty() {
            record.meta_mut().id = generate_id();
            None
        } else {
            self.read(record.id()).await?
        };
        if record.created_at() == 0 {
            record.meta_mut().created_at = now_millis();
        }

        let id = record.id().to_string();
        let score = record.created_at();
        let after = self.live_lookup_keys(&record, &options);
        let mut ops = vec![WriteOp::PutDocument {
            key: self.config.keys.document_key(&id),
            value: serde_json::to_value(&record)?,
            expire: options.expire,
        }];

        if let Some(previous) = &previous {
            tracing::debug!(id = %id, "create replaces an existing record");
            let before = self.live_lookup_keys(previous, &options);
            ops.extend(
                LookupDiff::between(&before, &after)
                    .remove
                    .into_iter()
                    .map(|(set, member)| WriteOp::IndexRemove { set, member }),
            );
            if record.is_deleted() || options.is_no_index() {
                ops.push(WriteOp::IndexRemove {
                    set: self.index_name(&options).to_string(),
                    member: id.clone(),
                });
            }
        }
        if !record.is_deleted() {
            if !options.is_no_index() {
                ops.push(WriteOp::IndexAdd {
                    set: self.index_name(&options).to_string(),
                    score,
                    member: id.clone(),
                });
            }
            ops.extend(
                after
                    .into_iter()
                    .map(|(set, member)| WriteOp::IndexAdd { set, score, member }),
            );
        }

        tracing::debug!(id = %id, writes = ops.len(), "creating record");
        dispatch(self.backend.as_ref(), &ops).await?;
        Ok(record)
    }

    /// Update an existing record.
    ///
    /// Lookup memberships move only for lookups whose value changed. The
    /// stored `createdAt` and `deletedAt` are kept as is, so index scores
    /// never drift (see [`RecordStore::restore`] to un-delete).
    pub async fn update(&self, record: R, options: &Options) -> Result<R> {
        if record.id().is_empty() {
            return Err(StoreError::NotFound("record has no id".to_string()));
        }
        let options = self.options(options);
        let id = record.id().to_string();
        let previous = self
            .read(&id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let mut record = record;
        {
            let meta = record.meta_mut();
            meta.updated_at = Some(now_millis());
            meta.deleted_at = previous.deleted_at();
            meta.created_at = previous.created_at();
        }

        let before = self.live_lookup_keys(&previous, &options);
        let after = self.live_lookup_keys(&record, &options);
        let diff = LookupDiff::between(&before, &after);
        let score = record.created_at();

        let mut ops = vec![WriteOp::PutDocument {
            key: self.config.keys.document_key(&id),
            value: serde_json::to_value(&record)?,
            expire: options.expire,
        }];
        ops.extend(
            diff.remove
                .into_iter()
                .map(|(set, member)| WriteOp::IndexRemove { set, member }),
        );
        ops.extend(
            diff.add
                .into_iter()
                .map(|(set, member)| WriteOp::IndexAdd { set, score, member }),
        );

        tracing::debug!(id = %id, writes = ops.len(), "updating record");
        dispatch(self.backend.as_ref(), &ops).await?;
        Ok(record)
    }

    /// Delete a record.
    ///
    /// Soft delete (the default) stamps `deletedAt` on the document and
    /// keeps it; `hard_delete` removes it. Both remove the id from every
    /// index. Returns the record as it was found with `deletedAt` set, or
    /// `None` if there was no document.
    pub async fn delete(&self, id: &str, options: &Options) -> Result<Option<R>> {
        require_id(id)?;
        let options = self.options(options);
        let existing = self.read(id).await?;
        if existing.is_none() {
            tracing::warn!(id, "deleting a record that does not exist; cleaning indexes only");
        }

        let now = now_millis();
        let key = self.config.keys.document_key(id);
        let mut ops = Vec::new();
        if options.is_hard_delete() {
            ops.push(WriteOp::DeleteDocument { key });
        } else if existing.is_some() {
            ops.push(WriteOp::PatchDocument {
                key,
                path: DELETED_AT_PATH,
                value: now.into(),
            });
        }
        ops.push(WriteOp::IndexRemove {
            set: self.index_name(&options).to_string(),
            member: id.to_string(),
        });
        if let Some(record) = &existing {
            ops.extend(
                self.lookup_keys(record, &options)
                    .into_iter()
                    .map(|(set, member)| WriteOp::IndexRemove { set, member }),
            );
        }

        tracing::debug!(id, hard = options.is_hard_delete(), writes = ops.len(), "deleting record");
        dispatch(self.backend.as_ref(), &ops).await?;

        Ok(existing.map(|mut record| {
            record.meta_mut().deleted_at = Some(now);
            record
        }))
    }

    /// Bring a soft-deleted record back.
    ///
    /// Clears `deletedAt`, refreshes `updatedAt`, and re-adds the record to
    /// its indexes. A live record is returned unchanged.
    pub async fn restore(&self, id: &str, options: &Options) -> Result<R> {
        require_id(id)?;
        let options = self.options(options);
        let mut record = self
            .read(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if !record.is_deleted() {
            return Ok(record);
        }

        {
            let meta = record.meta_mut();
            meta.deleted_at = None;
            meta.updated_at = Some(now_millis());
        }

        let score = record.created_at();
        let mut ops = vec![WriteOp::PutDocument {
            key: self.config.keys.document_key(id),
            value: serde_json::to_value(&record)?,
            expire: options.expire,
        }];
        ops.extend(self.index_adds(&record, &options));

        tracing::debug!(id, writes = ops.len(), score, "restoring record");
        dispatch(self.backend.as_ref(), &ops).await?;
        Ok(record)
    }

    /// Rewrite a record's index memberships from its stored document.
    ///
    /// Live records are (re-)added to the primary and lookup indexes;
    /// soft-deleted ones are removed from them. Memberships left behind
    /// under a value the record no longer holds are not detected.
    pub async fn reindex(&self, id: &str, options: &Options) -> Result<R> {
        require_id(id)?;
        let options = self.options(options);
        let record = self
            .read(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let ops: Vec<WriteOp> = if record.is_deleted() {
            std::iter::once((self.index_name(&options).to_string(), id.to_string()))
                .chain(self.lookup_keys(&record, &options))
                .map(|(set, member)| WriteOp::IndexRemove { set, member })
                .collect()
        } else {
            self.index_adds(&record, &options)
        };

        tracing::debug!(id, writes = ops.len(), "reindexing record");
        dispatch(self.backend.as_ref(), &ops).await?;
        Ok(record)
    }

    /// Primary (unless `no_index`) and lookup index adds for a live record.
    fn index_adds(&self, record: &R, options: &Options) -> Vec<WriteOp> {
        let score = record.created_at();
        let mut ops = Vec::new();
        if !options.is_no_index() {
            ops.push(WriteOp::IndexAdd {
                set: self.index_name(options).to_string(),
                score,
                member: record.id().to_string(),
            });
        }
        ops.extend(
            self.lookup_keys(record, options)
                .into_iter()
                .map(|(set, member)| WriteOp::IndexAdd { set, score, member }),
        );
        ops
    }
}

fn require_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(StoreError::InvalidArgument("id is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recset_backend::MemoryBackend;
    use recset_core::{Lookups, RecordMeta};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Task {
        #[serde(flatten)]
        meta: RecordMeta,
        title: String,
        owner: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    }

    impl Record for Task {
        fn meta(&self) -> &RecordMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut RecordMeta {
            &mut self.meta
        }
    }

    fn task(title: &str, owner: &str) -> Task {
        Task {
            title: title.into(),
            owner: owner.into(),
            ..Task::default()
        }
    }

    fn store() -> RecordStore<Task, MemoryBackend> {
        let config = StoreConfig::new("task").lookups(
            Lookups::new()
                .by("owner", |t: &Task| Some(t.owner.clone()))
                .by("status", |t: &Task| t.status.clone()),
        );
        RecordStore::new(Arc::new(MemoryBackend::new()), config)
    }

    async fn members(store: &RecordStore<Task, MemoryBackend>, set: &str) -> Vec<String> {
        store
            .backend()
            .ordered_set_range(set, 0, -1, true)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_created_at() {
        let store = store();
        let before = now_millis();
        let created = store.create(task("a", "u1"), &Options::new()).await.unwrap();

        assert!(!created.id().is_empty());
        assert!(created.created_at() >= before);
        assert_eq!(members(&store, "tasks").await, vec![created.id().to_string()]);
        assert_eq!(members(&store, "tasks:owner:u1").await, vec![created.id().to_string()]);
    }

    #[tokio::test]
    async fn test_create_keeps_caller_id_and_created_at() {
        let store = store();
        let mut t = task("a", "u1");
        t.meta = RecordMeta {
            id: "fixed".into(),
            created_at: 42,
            ..RecordMeta::default()
        };
        let created = store.create(t, &Options::new()).await.unwrap();
        assert_eq!(created.id(), "fixed");
        assert_eq!(created.created_at(), 42);
    }

    #[tokio::test]
    async fn test_create_no_index_skips_primary_only() {
        let store = store();
        let created = store
            .create(task("a", "u1"), &Options::new().no_index(true))
            .await
            .unwrap();
        assert!(members(&store, "tasks").await.is_empty());
        assert_eq!(members(&store, "tasks:owner:u1").await, vec![created.id().to_string()]);
    }

    #[tokio::test]
    async fn test_create_no_lookup_skips_lookups() {
        let store = store();
        store
            .create(task("a", "u1"), &Options::new().no_lookup(true))
            .await
            .unwrap();
        assert_eq!(members(&store, "tasks").await.len(), 1);
        assert!(members(&store, "tasks:owner:u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_update_without_id_is_not_found() {
        let store = store();
        let result = store.update(task("a", "u1"), &Options::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let store = store();
        let mut t = task("a", "u1");
        t.meta.id = "ghost".into();
        let result = store.update(t, &Options::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound(id)) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_update_moves_changed_lookup_only() {
        let store = store();
        let mut t = task("a", "u1");
        t.status = Some("open".into());
        let created = store.create(t, &Options::new()).await.unwrap();
        let id = created.id().to_string();

        let mut changed = created.clone();
        changed.status = Some("done".into());
        changed.meta.created_at = 0;
        let updated = store.update(changed, &Options::new()).await.unwrap();

        assert_eq!(updated.created_at(), created.created_at());
        assert!(updated.updated_at().is_some());
        assert!(members(&store, "tasks:status:open").await.is_empty());
        assert_eq!(members(&store, "tasks:status:done").await, vec![id.clone()]);
        assert_eq!(members(&store, "tasks:owner:u1").await, vec![id]);
    }

    #[tokio::test]
    async fn test_update_keeps_stored_created_at() {
        let store = store();
        let mut t = task("a", "u1");
        t.meta.created_at = 10;
        let created = store.create(t, &Options::new()).await.unwrap();

        let mut moved = created.clone();
        moved.meta.created_at = 99;
        moved.owner = "u2".into();
        let updated = store.update(moved, &Options::new()).await.unwrap();

        assert_eq!(updated.created_at(), 10);
        let stored = store.get(created.id(), &Options::new()).await.unwrap().unwrap();
        assert_eq!(stored.created_at(), 10);
    }

    #[tokio::test]
    async fn test_create_over_existing_id_replaces_memberships() {
        let store = store();
        let mut first = task("a", "u1");
        first.meta.id = "t1".into();
        first.status = Some("open".into());
        store.create(first, &Options::new()).await.unwrap();

        let mut second = task("b", "u1");
        second.meta.id = "t1".into();
        second.meta.created_at = 5;
        store.create(second, &Options::new()).await.unwrap();

        assert!(members(&store, "tasks:status:open").await.is_empty());
        assert_eq!(members(&store, "tasks:owner:u1").await, vec!["t1"]);
        let scored = store
            .backend()
            .ordered_set_range("tasks", 0, -1, false)
            .await
            .unwrap();
        assert_eq!(scored, vec!["t1"]);
    }

    #[tokio::test]
    async fn test_create_over_existing_id_with_no_index_unindexes() {
        let store = store();
        let mut first = task("a", "u1");
        first.meta.id = "t1".into();
        store.create(first.clone(), &Options::new()).await.unwrap();

        store
            .create(first, &Options::new().no_index(true))
            .await
            .unwrap();
        assert!(members(&store, "tasks").await.is_empty());
        assert_eq!(members(&store, "tasks:owner:u1").await, vec!["t1"]);
    }

    #[tokio::test]
    async fn test_update_dropping_value_removes_membership() {
        let store = store();
        let mut t = task("a", "u1");
        t.status = Some("open".into());
        let created = store.create(t, &Options::new()).await.unwrap();

        let mut cleared = created.clone();
        cleared.status = None;
        store.update(cleared, &Options::new()).await.unwrap();
        assert!(members(&store, "tasks:status:open").await.is_empty());
    }

    #[tokio::test]
    async fn test_get_and_exists() {
        let store = store();
        let created = store.create(task("a", "u1"), &Options::new()).await.unwrap();

        assert!(store.exists(created.id()).await.unwrap());
        assert!(!store.exists("nope").await.unwrap());
        assert_eq!(
            store.get(created.id(), &Options::new()).await.unwrap(),
            Some(created)
        );
        assert!(matches!(
            store.get("", &Options::new()).await,
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_soft_delete_then_restore() {
        let store = store();
        let created = store.create(task("a", "u1"), &Options::new()).await.unwrap();
        let id = created.id().to_string();

        let deleted = store.delete(&id, &Options::new()).await.unwrap().unwrap();
        assert!(deleted.deleted_at().is_some());
        assert!(store.get(&id, &Options::new()).await.unwrap().is_none());
        assert!(store.exists(&id).await.unwrap());
        assert!(members(&store, "tasks").await.is_empty());
        assert!(members(&store, "tasks:owner:u1").await.is_empty());

        let restored = store.restore(&id, &Options::new()).await.unwrap();
        assert!(restored.deleted_at().is_none());
        assert_eq!(restored.created_at(), created.created_at());
        assert_eq!(members(&store, "tasks").await, vec![id.clone()]);
        assert_eq!(members(&store, "tasks:owner:u1").await, vec![id.clone()]);
        assert!(store.get(&id, &Options::new()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_keeps_soft_deleted_out_of_indexes() {
        let store = store();
        let created = store.create(task("a", "u1"), &Options::new()).await.unwrap();
        let id = created.id().to_string();
        store.delete(&id, &Options::new()).await.unwrap();

        let mut changed = created.clone();
        changed.owner = "u2".into();
        let updated = store.update(changed, &Options::new()).await.unwrap();

        assert!(updated.is_deleted());
        assert!(members(&store, "tasks:owner:u2").await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_record_returns_none() {
        let store = store();
        assert!(store.delete("ghost", &Options::new()).await.unwrap().is_none());
        assert!(!store.exists("ghost").await.unwrap());
        assert!(matches!(
            store.delete("", &Options::new()).await,
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_hard_delete_removes_document() {
        let store = store();
        let created = store.create(task("a", "u1"), &Options::new()).await.unwrap();
        let id = created.id().to_string();

        let removed = store
            .delete(&id, &Options::new().hard_delete(true))
            .await
            .unwrap()
            .unwrap();
        assert!(removed.deleted_at().is_some());
        assert!(!store.exists(&id).await.unwrap());
        assert!(store
            .get(&id, &Options::new().deleted(true))
            .await
            .unwrap()
            .is_none());
        assert!(members(&store, "tasks:owner:u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_reindex_repairs_missing_membership() {
        let store = store();
        let created = store.create(task("a", "u1"), &Options::new()).await.unwrap();
        let id = created.id().to_string();
        store
            .backend()
            .ordered_set_remove("tasks:owner:u1", &id)
            .await
            .unwrap();

        store.reindex(&id, &Options::new()).await.unwrap();
        assert_eq!(members(&store, "tasks:owner:u1").await, vec![id]);
    }

    #[tokio::test]
    async fn test_store_default_options_apply() {
        let config = StoreConfig::<Task>::new("task").defaults(Options::new().hard_delete(true));
        let store = RecordStore::new(Arc::new(MemoryBackend::new()), config);
        let created = store.create(task("a", "u1"), &Options::new()).await.unwrap();

        store.delete(created.id(), &Options::new()).await.unwrap();
        assert!(!store.exists(created.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_index_name_per_call() {
        let store = store();
        let options = Options::new().index_name("archive");
        let created = store.create(task("a", "u1"), &options).await.unwrap();

        assert!(members(&store, "tasks").await.is_empty());
        assert_eq!(members(&store, "archive:owner:u1").await, vec![created.id().to_string()]);
        assert!(store.find(&Query::all()).await.unwrap().is_empty());
        assert_eq!(
            store.find_with(&Query::all().filter("owner", "u1"), &options).await.unwrap(),
            vec![created]
        );
    }

    #[tokio::test]
    async fn test_dyn_backend_store() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let store: RecordStore<Task> = RecordStore::new(backend, StoreConfig::new("task"));
        let created = store.create(task("a", "u1"), &Options::new()).await.unwrap();
        assert_eq!(store.find(&Query::all()).await.unwrap(), vec![created]);
    }
}
