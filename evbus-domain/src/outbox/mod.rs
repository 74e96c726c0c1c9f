//! 事务性 Outbox
//!
//! - `OutboxWriter`：在调用方事务内写入待发送记录，与业务变更同生共死；
//! - `OutboxDispatcher`：周期扫描待发送记录，按记录加锁后发送并推进状态机；
//! - `TransactionReconciler`：以记录是否存在回答 Broker 的半消息回查。
//!
//! 存储只定义协议（`OutboxStore`/`OutboxTransaction`），状态机规则由本模块掌握。

mod dispatcher;
mod reconciler;
mod record;
mod store;
#[cfg(feature = "inmemory")]
mod store_inmemory;
mod writer;

pub use dispatcher::{DispatchReport, DispatcherHandle, OutboxDispatcher};
pub use reconciler::TransactionReconciler;
pub use record::{NewOutboxRecord, OutboxRecord, OutboxStatus};
pub use store::{DeliveryUpdate, OutboxStore, OutboxTransaction};
#[cfg(feature = "inmemory")]
pub use store_inmemory::InMemoryOutboxStore;
pub use writer::OutboxWriter;
