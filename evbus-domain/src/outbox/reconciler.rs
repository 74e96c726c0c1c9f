use super::store::OutboxStore;
use crate::broker::{TransactionChecker, TransactionResolution};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// 事务回查器
///
/// 以 Outbox 中是否存在该事件 key 的记录回答 Broker 的半消息回查：
/// 存在说明本地事务已提交，否则回滚。查询失败同样按回滚处理。
pub struct TransactionReconciler {
    store: Arc<dyn OutboxStore>,
}

impl TransactionReconciler {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, event_key: &str) -> TransactionResolution {
        if event_key.trim().is_empty() {
            warn!("transaction check without event key, rolling back");
            return TransactionResolution::Rollback;
        }

        match self.store.exists_by_event_key(event_key).await {
            Ok(true) => {
                debug!(event_key, "local transaction committed");
                TransactionResolution::Commit
            }
            Ok(false) => {
                debug!(event_key, "local transaction not found, rolling back");
                TransactionResolution::Rollback
            }
            Err(err) => {
                warn!(event_key, error = %err, "transaction check failed, rolling back");
                TransactionResolution::Rollback
            }
        }
    }
}

#[async_trait]
impl TransactionChecker for TransactionReconciler {
    async fn check(&self, key: &str) -> TransactionResolution {
        self.resolve(key).await
    }
}
