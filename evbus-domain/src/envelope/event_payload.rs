use serde::Serialize;
use serde::de::DeserializeOwned;

/// 事件载荷需要满足的能力边界
///
/// `EVENT_TYPE` 是载荷在注册期声明的逻辑事件名，发布时据此计算路由 tag，
/// 消费时据此选择反序列化目标类型。可手写实现，也可使用 `#[event_payload]` 宏生成。
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 逻辑事件名（形如 `OrderPaid`）
    const EVENT_TYPE: &'static str;
}
