//! Broker 客户端协议
//!
//! 定义生产（普通发送 / 事务半消息）、事务回查回调与按 tag 过滤的订阅，
//! 订阅区分集群消费（同组只投递给一个实例）与广播消费（每个实例各投递一次）。
//!
//! 该模块只定义协议；`InMemoryBroker` 为测试与本地开发提供的参考实现。

mod client;
mod message;
#[cfg(feature = "inmemory")]
mod broker_inmemory;

pub use client::{BrokerClient, TransactionChecker};
pub use message::{
    ConsumeAck, ConsumeMode, Delivery, InboundMessage, OutboundMessage, SendReceipt,
    Subscription, TagFilter, TransactionResolution,
};
#[cfg(feature = "inmemory")]
pub use broker_inmemory::{InMemoryBroker, InMemoryBrokerConfig};
