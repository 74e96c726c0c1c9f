//! 事件订阅者（EventSubscriber）
//!
//! 定义订阅某类/多类事件的处理逻辑与元信息（名称、订阅类型、载荷类型）。
//!
use crate::broker::InboundMessage;
use crate::envelope::{EventEnvelope, EventPayload, TraceContext};
use crate::error::{EvbusError, EvbusResult};
use async_trait::async_trait;
use serde_json::Value;
use std::any::{Any, type_name};
use std::marker::PhantomData;
use std::sync::Arc;

/// 单条入站消息的处理上下文
#[derive(Debug, Clone)]
pub struct ConsumeContext {
    trace: TraceContext,
    group_id: String,
    msg_id: String,
    reconsume_times: u32,
}

impl ConsumeContext {
    pub fn new(trace: TraceContext, group_id: impl Into<String>, message: &InboundMessage) -> Self {
        Self {
            trace,
            group_id: group_id.into(),
            msg_id: message.msg_id.clone(),
            reconsume_times: message.reconsume_times,
        }
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn msg_id(&self) -> &str {
        &self.msg_id
    }

    /// 已重投次数，首次投递为 0
    pub fn reconsume_times(&self) -> u32 {
        self.reconsume_times
    }
}

/// 事件订阅者：处理一类载荷的事件
///
/// 同一进程内可能并发处理不同消息，实现需可并发调用且保持幂等。
#[async_trait]
pub trait EventSubscriber: Send + Sync + 'static {
    type Payload: EventPayload;

    /// 订阅者名称（用于日志与失败定位）
    fn subscriber_name(&self) -> &str;

    /// 订阅的事件类型，缺省为载荷声明的类型
    fn event_types(&self) -> Vec<String> {
        vec![<Self::Payload as EventPayload>::EVENT_TYPE.to_string()]
    }

    async fn on_event(
        &self,
        ctx: &ConsumeContext,
        event: &EventEnvelope<Self::Payload>,
    ) -> anyhow::Result<()>;
}

/// 已解码的入站事件，实际类型为 `EventEnvelope<P>`
pub(crate) struct DecodedEvent {
    value: Box<dyn Any + Send + Sync>,
    payload_type: &'static str,
}

/// 擦除载荷类型后的订阅者，便于按事件类型统一存放
#[async_trait]
pub(crate) trait ErasedSubscriber: Send + Sync {
    fn name(&self) -> &str;
    fn event_types(&self) -> Vec<String>;
    fn payload_type(&self) -> &'static str;
    fn decode(&self, envelope: &EventEnvelope<Value>) -> EvbusResult<DecodedEvent>;
    async fn deliver(&self, ctx: &ConsumeContext, event: &DecodedEvent) -> EvbusResult<()>;
}

pub(crate) struct Erased<S> {
    inner: Arc<S>,
    _payload: PhantomData<fn() -> S>,
}

impl<S> Erased<S> {
    pub(crate) fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<S> ErasedSubscriber for Erased<S>
where
    S: EventSubscriber,
{
    fn name(&self) -> &str {
        self.inner.subscriber_name()
    }

    fn event_types(&self) -> Vec<String> {
        self.inner.event_types()
    }

    fn payload_type(&self) -> &'static str {
        type_name::<S::Payload>()
    }

    fn decode(&self, envelope: &EventEnvelope<Value>) -> EvbusResult<DecodedEvent> {
        let typed = envelope.decode::<S::Payload>()?;
        Ok(DecodedEvent {
            value: Box::new(typed),
            payload_type: type_name::<S::Payload>(),
        })
    }

    async fn deliver(&self, ctx: &ConsumeContext, event: &DecodedEvent) -> EvbusResult<()> {
        let Some(typed) = event
            .value
            .downcast_ref::<EventEnvelope<S::Payload>>()
        else {
            return Err(EvbusError::TypeMismatch {
                expected: type_name::<S::Payload>().to_string(),
                found: event.payload_type.to_string(),
            });
        };

        self.inner
            .on_event(ctx, typed)
            .await
            .map_err(|err| EvbusError::Subscriber {
                subscriber: self.inner.subscriber_name().to_string(),
                reason: format!("{err:#}"),
            })
    }
}
