use evbus_domain::envelope::EventPayload;

/// 应用层命令（Command）
///
/// 表达"意图"的写操作请求，以事件的形式经由总线异步执行。
/// - 不返回业务数据，仅表达执行结果（成功/失败）；
/// - 处理器可能因重投而重复执行，实现需保持幂等；
/// - 建议保持语义化的"动宾结构"命名，如 `CloseOrder`、`RefundPayment`。
///
/// 关联常量：
/// - `NAME`：命令的稳定名称，用于日志与路由，缺省与载荷的事件类型一致。避免依赖 `type_name::<T>()`。
pub trait Command: EventPayload + Clone {
    /// 命令的稳定名称（建议常量字符串，不随重构变化）
    const NAME: &'static str = <Self as EventPayload>::EVENT_TYPE;
}
