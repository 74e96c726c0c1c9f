//! 订阅与消费
//!
//! - `EventSubscriber`：订阅者协议（名称、事件类型、载荷类型、处理逻辑）；
//! - `SubscriberRegistry`：按事件类型分组的注册表，一个注册表对应一种消费模型；
//! - `EventConsumer`：订阅 Broker，按注册表扇出并回执；
//! - `RefreshableCache`：广播订阅者的一个特例，用于同步各实例的本地缓存。

mod consumer;
mod handler;
mod refreshable;
mod registry;

pub use consumer::{ConsumerHandle, EventConsumer};
pub use handler::{ConsumeContext, EventSubscriber};
pub use refreshable::{CacheLoader, CacheRefresh, RefreshableCache};
pub use registry::SubscriberRegistry;
