//! 入口装饰器
//!
//! 以显式包装函数为投递周期、单条消息消费与即时发布打开 `tracing` span，
//! span 中携带显式传入的 `TraceContext`，而不是依赖线程局部状态或切面拦截。
//!
use crate::broker::InboundMessage;
use crate::envelope::TraceContext;
use std::future::Future;
use tracing::{Instrument, Span, info_span};

pub fn dispatch_span(ctx: &TraceContext) -> Span {
    info_span!("outbox.dispatch", trace_id = ctx.trace_id().unwrap_or("-"))
}

pub fn consume_span(ctx: &TraceContext, group: &str, message: &InboundMessage) -> Span {
    info_span!(
        "evbus.consume",
        trace_id = ctx.trace_id().unwrap_or("-"),
        group,
        tag = %message.tag,
        event_key = %message.key,
        reconsume_times = message.reconsume_times,
    )
}

pub fn publish_span(ctx: &TraceContext, event_type: &str, event_key: &str) -> Span {
    info_span!(
        "evbus.publish",
        trace_id = ctx.trace_id().unwrap_or("-"),
        event_type,
        event_key,
    )
}

/// 在给定 span 内执行入口逻辑
pub async fn instrumented<F>(span: Span, fut: F) -> F::Output
where
    F: Future,
{
    fut.instrument(span).await
}
