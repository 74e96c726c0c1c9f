use super::record::{NewOutboxRecord, OutboxRecord, OutboxStatus};
use super::store::{DeliveryUpdate, OutboxStore, OutboxTransaction};
use crate::error::{EvbusError, EvbusResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 内存版 Outbox 存储
///
/// 事务内的插入先暂存，提交时一次性写入（`event_key` 唯一）；克隆后共享同一份数据。
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: Mutex<BTreeMap<i64, OutboxRecord>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl Inner {
    fn rows(&self) -> MutexGuard<'_, BTreeMap<i64, OutboxRecord>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> EvbusResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EvbusError::outbox_store("outbox store unavailable"));
        }
        Ok(())
    }
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟数据库不可用
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<OutboxRecord> {
        self.inner.rows().values().cloned().collect()
    }

    pub fn find_by_event_key(&self, event_key: &str) -> Option<OutboxRecord> {
        self.inner
            .rows()
            .values()
            .find(|r| r.event_key() == event_key)
            .cloned()
    }
}

pub struct InMemoryTransaction {
    store: Arc<Inner>,
    staged: Vec<NewOutboxRecord>,
}

#[async_trait]
impl OutboxTransaction for InMemoryTransaction {
    async fn insert(&mut self, record: NewOutboxRecord) -> EvbusResult<()> {
        self.store.check_available()?;
        self.staged.push(record);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> EvbusResult<()> {
        let InMemoryTransaction { store, staged } = *self;
        store.check_available()?;
        let mut rows = store.rows();

        for (i, record) in staged.iter().enumerate() {
            let key = record.envelope().key();
            let duplicated = rows.values().any(|r| r.event_key() == key)
                || staged[..i].iter().any(|s| s.envelope().key() == key);
            if duplicated {
                return Err(EvbusError::outbox_store(format!(
                    "duplicate event key: {key}"
                )));
            }
        }

        let now = Utc::now();
        for record in staged {
            let id = store.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            rows.insert(id, record.into_record(id, now));
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> EvbusResult<()> {
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn begin(&self) -> EvbusResult<Box<dyn OutboxTransaction>> {
        self.inner.check_available()?;
        Ok(Box::new(InMemoryTransaction {
            store: self.inner.clone(),
            staged: Vec::new(),
        }))
    }

    async fn find_all_by_status(&self, status: OutboxStatus) -> EvbusResult<Vec<OutboxRecord>> {
        self.inner.check_available()?;
        let mut found: Vec<OutboxRecord> = self
            .inner
            .rows()
            .values()
            .filter(|r| r.status() == status)
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.create_time(), r.id()));
        Ok(found)
    }

    async fn find_by_id(&self, id: i64) -> EvbusResult<Option<OutboxRecord>> {
        self.inner.check_available()?;
        Ok(self.inner.rows().get(&id).cloned())
    }

    async fn exists_by_event_key(&self, event_key: &str) -> EvbusResult<bool> {
        self.inner.check_available()?;
        Ok(self
            .inner
            .rows()
            .values()
            .any(|r| r.event_key() == event_key))
    }

    async fn update_delivery(&self, update: DeliveryUpdate) -> EvbusResult<bool> {
        self.inner.check_available()?;
        let mut rows = self.inner.rows();
        let Some(row) = rows.get_mut(&update.id) else {
            return Ok(false);
        };
        if !row.status().can_transition_to(update.status) {
            return Ok(false);
        }
        row.apply_delivery(
            update.status,
            update.count,
            update.publish_time,
            update.update_time,
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EventEnvelope;

    fn new_record(key: &str) -> NewOutboxRecord {
        NewOutboxRecord::builder()
            .envelope(
                EventEnvelope::builder()
                    .key(key)
                    .event_type("OrderPaid")
                    .payload(serde_json::json!({}))
                    .build(),
            )
            .build()
    }

    #[tokio::test]
    async fn rows_become_visible_only_on_commit() {
        let store = InMemoryOutboxStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(new_record("evt-1")).await.unwrap();
        assert!(!store.exists_by_event_key("evt-1").await.unwrap());

        tx.commit().await.unwrap();
        assert!(store.exists_by_event_key("evt-1").await.unwrap());
    }

    #[tokio::test]
    async fn rollback_and_drop_leave_no_trace() {
        let store = InMemoryOutboxStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert(new_record("evt-1")).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert(new_record("evt-2")).await.unwrap();
        drop(tx);

        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn duplicate_event_key_fails_commit() {
        let store = InMemoryOutboxStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(new_record("evt-1")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert(new_record("evt-1")).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn conditional_update_refuses_terminal_rows() {
        let store = InMemoryOutboxStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(new_record("evt-1")).await.unwrap();
        tx.commit().await.unwrap();
        let id = store.find_by_event_key("evt-1").unwrap().id();

        let done = DeliveryUpdate {
            id,
            status: OutboxStatus::SendSuccess,
            count: 1,
            publish_time: Some(Utc::now()),
            update_time: Utc::now(),
        };
        assert!(store.update_delivery(done.clone()).await.unwrap());
        assert!(!store.update_delivery(done).await.unwrap());

        let row = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(row.status(), OutboxStatus::SendSuccess);
        assert_eq!(row.count(), 1);
        assert!(row.envelope().publish_time().is_some());
    }

    #[tokio::test]
    async fn wait_send_rows_are_oldest_first() {
        let store = InMemoryOutboxStore::new();
        for key in ["a", "b", "c"] {
            let mut tx = store.begin().await.unwrap();
            tx.insert(new_record(key)).await.unwrap();
            tx.commit().await.unwrap();
        }
        let keys: Vec<String> = store
            .find_all_by_status(OutboxStatus::WaitSend)
            .await
            .unwrap()
            .iter()
            .map(|r| r.event_key().to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
