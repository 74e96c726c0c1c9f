use super::record::{NewOutboxRecord, OutboxRecord, OutboxStatus};
use crate::error::EvbusResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 调用方的业务事务在 Outbox 侧的投影
///
/// 记录随事务提交而可见，回滚或未提交即丢弃时不留痕迹。
#[async_trait]
pub trait OutboxTransaction: Send {
    async fn insert(&mut self, record: NewOutboxRecord) -> EvbusResult<()>;

    async fn commit(self: Box<Self>) -> EvbusResult<()>;

    async fn rollback(self: Box<Self>) -> EvbusResult<()>;
}

/// 单行条件更新：仅当记录仍为 `WaitSend` 时生效
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUpdate {
    pub id: i64,
    pub status: OutboxStatus,
    pub count: u32,
    pub publish_time: Option<DateTime<Utc>>,
    pub update_time: DateTime<Utc>,
}

/// Outbox 存储：每个服务一张表，仅要求单行原子性
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// 开启一个事务
    async fn begin(&self) -> EvbusResult<Box<dyn OutboxTransaction>>;

    /// 按状态查询，按创建时间升序（最早的优先）
    async fn find_all_by_status(&self, status: OutboxStatus) -> EvbusResult<Vec<OutboxRecord>>;

    async fn find_by_id(&self, id: i64) -> EvbusResult<Option<OutboxRecord>>;

    async fn exists_by_event_key(&self, event_key: &str) -> EvbusResult<bool>;

    /// 返回更新是否命中（记录已离开 `WaitSend` 时不命中）
    async fn update_delivery(&self, update: DeliveryUpdate) -> EvbusResult<bool>;
}
