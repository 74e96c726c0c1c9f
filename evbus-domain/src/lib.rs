//! 事件总线核心库（evbus-domain）
//!
//! 让服务在变更自身状态的同时，经由不可靠的消息中间件可靠地对外宣告该变更：
//! - 信封（`envelope`）：线路上传输的事件单元与显式链路上下文
//! - 事务性 Outbox（`outbox`）：事务内写入、周期投递、半消息回查
//! - 发布路径（`publisher`）：即时发布与 Broker 事务发布
//! - 订阅与消费（`subscriber`）：按事件类型扇出，支持集群与广播两种消费模型
//! - 外部协作方协议：锁服务（`lock`）、Broker 客户端（`broker`）
//!
//! 存储、传输与锁的具体实现只以窄接口依赖；`inmemory` 特性为每个协议提供内存参考实现，
//! 用于测试与本地开发。
//!
//! 典型用法：
//! 1. 在业务事务内通过 `OutboxWriter` 写入事件并随事务提交；
//! 2. 启动 `OutboxDispatcher` 周期投递待发送记录；
//! 3. 向 Broker 注册 `TransactionReconciler` 作为半消息回查回调；
//! 4. 以 `SubscriberRegistry` 注册订阅者，启动 `EventConsumer` 消费。
//!
pub mod broker;
pub mod config;
pub mod envelope;
pub mod error;
pub mod id_generator;
pub mod instrument;
pub mod lock;
pub mod outbox;
pub mod publisher;
pub mod routing;
pub mod subscriber;

// 允许在本 crate 内部通过 ::evbus_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::evbus_domain 路径。
extern crate self as evbus_domain;
