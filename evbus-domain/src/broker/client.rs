use super::message::{Delivery, OutboundMessage, SendReceipt, Subscription, TransactionResolution};
use crate::error::EvbusResult;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::sync::Arc;

/// Broker 客户端
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// 普通发送（可带延迟投递时间）
    async fn send(&self, message: OutboundMessage) -> EvbusResult<SendReceipt>;

    /// 事务发送：消息以"状态未知"的半消息形式写入，之后由 Broker 回查决定提交或回滚
    async fn send_transactional(&self, message: OutboundMessage) -> EvbusResult<SendReceipt>;

    /// 注册事务回查回调；未注册时半消息一律按回滚处理
    fn register_transaction_checker(&self, checker: Arc<dyn TransactionChecker>);

    /// 订阅，返回 'static 生命周期的投递流；丢弃流即取消订阅
    async fn subscribe(&self, subscription: Subscription)
    -> EvbusResult<BoxStream<'static, Delivery>>;
}

/// 事务回查回调：Broker 询问某条半消息应提交还是回滚
#[async_trait]
pub trait TransactionChecker: Send + Sync {
    async fn check(&self, key: &str) -> TransactionResolution;
}
