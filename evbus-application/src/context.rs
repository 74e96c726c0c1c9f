use evbus_domain::envelope::TraceContext;
use evbus_domain::id_generator::IdGenerator;

/// 应用层上下文（Application Context）
///
/// 承载一次命令调用所需的横切信息：
/// - 链路上下文（`TraceContext`）：显式传递的链路 ID 与关联 ID；
/// - 幂等键（`idempotency_key`）：作为命令事件的 key，重复提交同一幂等键不会产生第二条记录。
///
/// 典型用法：
/// ```rust
/// use evbus_application::context::AppContext;
/// use evbus_domain::envelope::TraceContext;
///
/// let ctx = AppContext {
///     trace: TraceContext::with_trace_id("trace-123"),
///     idempotency_key: Some("idem-xyz".into()),
/// };
/// assert_eq!(ctx.trace.trace_id(), Some("trace-123"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    /// 链路上下文
    pub trace: TraceContext,
    /// 幂等键（可选）：为空则生成新的事件 key
    pub idempotency_key: Option<String>,
}

impl AppContext {
    pub fn new(trace: TraceContext) -> Self {
        Self {
            trace,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// 命令事件的 key：优先使用幂等键
    pub fn event_key(&self, ids: &dyn IdGenerator) -> String {
        match self.idempotency_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key.to_string(),
            _ => ids.next_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evbus_domain::id_generator::UlidGenerator;

    #[test]
    fn idempotency_key_wins_over_generated_id() {
        let ids = UlidGenerator::new();
        let ctx = AppContext::default().with_idempotency_key("idem-1");
        assert_eq!(ctx.event_key(&ids), "idem-1");

        let blank = AppContext::default().with_idempotency_key(" ");
        assert_eq!(blank.event_key(&ids).len(), 26);
    }
}
