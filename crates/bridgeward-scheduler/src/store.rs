//! The persistence collaborator the scheduler reads and writes.
//!
//! The scheduler never defines how records are stored. It talks to a
//! [`PunishmentStore`], and the application plugs in its database. An
//! [`InMemoryPunishmentStore`] ships for tests and the demo daemon.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{PunishmentFilter, PunishmentRecord, RecordId, StoreError};

#[async_trait]
pub trait PunishmentStore: Send + Sync + 'static {
    /// Creates the record (assigning an id) or replaces the one with the
    /// same id. Returns the stored record.
    async fn upsert(&self, record: PunishmentRecord) -> Result<PunishmentRecord, StoreError>;

    /// Returns `true` if a record was deleted.
    async fn delete(&self, id: RecordId) -> Result<bool, StoreError>;

    async fn get(&self, id: RecordId) -> Result<Option<PunishmentRecord>, StoreError>;

    async fn list_all(&self) -> Result<Vec<PunishmentRecord>, StoreError>;

    async fn list_filtered(
        &self,
        filter: &PunishmentFilter,
    ) -> Result<Vec<PunishmentRecord>, StoreError>;
}

/// A [`PunishmentStore`] that lives and dies with the process.
#[derive(Debug, Default)]
pub struct InMemoryPunishmentStore {
    inner: Mutex<InMemoryInner>,
}

#[derive(Debug, Default)]
struct InMemoryInner {
    records: BTreeMap<RecordId, PunishmentRecord>,
    next_id: u64,
}

impl InMemoryPunishmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }
}

#[async_trait]
impl PunishmentStore for InMemoryPunishmentStore {
    async fn upsert(&self, mut record: PunishmentRecord) -> Result<PunishmentRecord, StoreError> {
        let mut inner = self.inner.lock();
        let id = match record.id {
            Some(id) => id,
            None => {
                inner.next_id += 1;
                RecordId::new(inner.next_id)
            }
        };
        record.id = Some(id);
        inner.records.insert(id, record.clone());
        Ok(record)
    }

    async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        Ok(self.inner.lock().records.remove(&id).is_some())
    }

    async fn get(&self, id: RecordId) -> Result<Option<PunishmentRecord>, StoreError> {
        Ok(self.inner.lock().records.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<PunishmentRecord>, StoreError> {
        Ok(self.inner.lock().records.values().cloned().collect())
    }

    async fn list_filtered(
        &self,
        filter: &PunishmentFilter,
    ) -> Result<Vec<PunishmentRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}
