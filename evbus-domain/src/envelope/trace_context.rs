use bon::Builder;
use serde::{Deserialize, Serialize};

use super::EventEnvelope;

/// 调用链上下文
///
/// 显式贯穿发布、Outbox 投递与订阅处理的每一层调用，替代线程局部的链路信息。
#[derive(Builder, Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// 分布式链路 ID（尽力传播）
    trace_id: Option<String>,
    /// 关联 ID，用于将多个事件关联到同一个业务操作
    correlation_id: Option<String>,
}

impl TraceContext {
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            correlation_id: None,
        }
    }

    /// 从入站事件延续链路
    pub fn from_envelope<P>(envelope: &EventEnvelope<P>) -> Self {
        Self {
            trace_id: envelope.trace_id().map(|s| s.to_string()),
            correlation_id: Some(envelope.key().to_string()),
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}
