//! Generic tenant-scoped data access.
//!
//! [`ScopedStore`] is the entry point higher-level services use for plain
//! CRUD on scoped entities: every operation is rewritten by the
//! [`DataAccessInterceptor`] against the ambient [`TenantScope`] before it
//! reaches the underlying [`DataStore`]. [`InMemoryDataStore`] backs tests
//! and development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use storekeep_tenancy::{DataAccessInterceptor, EntityKind, Filter, Record};

use crate::error::{StoreError, StoreResult};

/// Record-oriented store keyed by entity kind.
///
/// Implementations receive operations that are *already* tenant-rewritten;
/// they only execute them.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn insert(&self, kind: EntityKind, record: Record) -> StoreResult<Record>;

    async fn find_one(&self, kind: EntityKind, filter: &Filter) -> StoreResult<Option<Record>>;

    async fn find_many(&self, kind: EntityKind, filter: &Filter) -> StoreResult<Vec<Record>>;

    async fn count(&self, kind: EntityKind, filter: &Filter) -> StoreResult<u64>;

    /// Apply `patch` to every matching record; returns how many changed.
    async fn update_many(
        &self,
        kind: EntityKind,
        filter: &Filter,
        patch: &Record,
    ) -> StoreResult<u64>;

    /// Delete every matching record; returns how many went away.
    async fn delete_many(&self, kind: EntityKind, filter: &Filter) -> StoreResult<u64>;

    /// Update the first match, or insert `create` when nothing matches.
    async fn upsert(
        &self,
        kind: EntityKind,
        filter: &Filter,
        create: Record,
        update: &Record,
    ) -> StoreResult<Record>;
}

/// In-memory [`DataStore`] for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    inner: RwLock<HashMap<EntityKind, Vec<Record>>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_kind(&self, kind: EntityKind) -> StoreResult<Vec<Record>> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::storage("read_records", "lock poisoned"))?;
        Ok(map.get(&kind).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn insert(&self, kind: EntityKind, record: Record) -> StoreResult<Record> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::storage("insert_record", "lock poisoned"))?;
        map.entry(kind).or_default().push(record.clone());
        Ok(record)
    }

    async fn find_one(&self, kind: EntityKind, filter: &Filter) -> StoreResult<Option<Record>> {
        Ok(self
            .read_kind(kind)?
            .into_iter()
            .find(|record| filter.matches(record)))
    }

    async fn find_many(&self, kind: EntityKind, filter: &Filter) -> StoreResult<Vec<Record>> {
        Ok(self
            .read_kind(kind)?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    async fn count(&self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        Ok(self.find_many(kind, filter).await?.len() as u64)
    }

    async fn update_many(
        &self,
        kind: EntityKind,
        filter: &Filter,
        patch: &Record,
    ) -> StoreResult<u64> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::storage("update_records", "lock poisoned"))?;
        let mut updated = 0;
        for record in map.entry(kind).or_default().iter_mut() {
            if filter.matches(record) {
                record.apply(patch);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_many(&self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::storage("delete_records", "lock poisoned"))?;
        let records = map.entry(kind).or_default();
        let before = records.len();
        records.retain(|record| !filter.matches(record));
        Ok((before - records.len()) as u64)
    }

    async fn upsert(
        &self,
        kind: EntityKind,
        filter: &Filter,
        create: Record,
        update: &Record,
    ) -> StoreResult<Record> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::storage("upsert_record", "lock poisoned"))?;
        let records = map.entry(kind).or_default();
        if let Some(record) = records.iter_mut().find(|record| filter.matches(record)) {
            record.apply(update);
            Ok(record.clone())
        } else {
            records.push(create.clone());
            Ok(create)
        }
    }
}

/// Tenant-scoping wrapper over any [`DataStore`].
pub struct ScopedStore<S> {
    store: S,
}

impl<S: DataStore> ScopedStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn create(&self, kind: EntityKind, record: Record) -> StoreResult<Record> {
        let record = DataAccessInterceptor::scope_record(kind, record)?;
        self.store.insert(kind, record).await
    }

    pub async fn create_many(
        &self,
        kind: EntityKind,
        records: Vec<Record>,
    ) -> StoreResult<Vec<Record>> {
        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            inserted.push(self.create(kind, record).await?);
        }
        Ok(inserted)
    }

    pub async fn find_one(&self, kind: EntityKind, filter: Filter) -> StoreResult<Option<Record>> {
        let filter = DataAccessInterceptor::scope_filter(kind, filter)?;
        self.store.find_one(kind, &filter).await
    }

    pub async fn find_many(&self, kind: EntityKind, filter: Filter) -> StoreResult<Vec<Record>> {
        let filter = DataAccessInterceptor::scope_filter(kind, filter)?;
        self.store.find_many(kind, &filter).await
    }

    pub async fn count(&self, kind: EntityKind, filter: Filter) -> StoreResult<u64> {
        let filter = DataAccessInterceptor::scope_filter(kind, filter)?;
        self.store.count(kind, &filter).await
    }

    pub async fn update_many(
        &self,
        kind: EntityKind,
        filter: Filter,
        patch: &Record,
    ) -> StoreResult<u64> {
        let filter = DataAccessInterceptor::scope_filter(kind, filter)?;
        self.store.update_many(kind, &filter, patch).await
    }

    pub async fn delete_many(&self, kind: EntityKind, filter: Filter) -> StoreResult<u64> {
        let filter = DataAccessInterceptor::scope_filter(kind, filter)?;
        self.store.delete_many(kind, &filter).await
    }

    pub async fn upsert(
        &self,
        kind: EntityKind,
        filter: Filter,
        create: Record,
        update: &Record,
    ) -> StoreResult<Record> {
        let filter = DataAccessInterceptor::scope_filter(kind, filter)?;
        let create = DataAccessInterceptor::scope_record(kind, create)?;
        self.store.upsert(kind, &filter, create, update).await
    }
}
