use crate::error::{EvbusError, EvbusResult};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event_payload::EventPayload;

/// 事件信封：在线路上传输的事件单元
///
/// `P` 为载荷类型；线路与 Outbox 中使用 `serde_json::Value` 形态，
/// 业务侧与订阅者使用具体载荷类型。
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<P = Value> {
    /// 调用方分配的事件实例唯一标识（非 Broker 投递 ID），用于去重与事务回查
    #[builder(into)]
    key: String,
    /// 逻辑事件名，经部署前缀映射为 Broker 路由 tag
    #[builder(into)]
    event_type: String,
    /// 目标 topic，为空表示使用部署默认 topic
    #[builder(into, default)]
    #[serde(default)]
    topic: String,
    /// 生产方服务实例/分组标识
    #[serde(default, skip_serializing_if = "Option::is_none")]
    publisher: Option<String>,
    /// 尝试发送的时间（而非持久化时间）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    publish_time: Option<DateTime<Utc>>,
    /// 分布式链路 ID（尽力传播）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    /// 事件类型相关的业务字段
    payload: P,
}

impl<P> EventEnvelope<P>
where
    P: EventPayload,
{
    /// 以载荷声明的事件类型构造信封
    pub fn new(key: impl Into<String>, payload: P) -> Self {
        Self {
            key: key.into(),
            event_type: P::EVENT_TYPE.to_string(),
            topic: String::new(),
            publisher: None,
            publish_time: None,
            trace_id: None,
            payload,
        }
    }

    /// 序列化载荷，得到线路形态的信封
    pub fn into_wire(self) -> EvbusResult<EventEnvelope<Value>> {
        let payload = serde_json::to_value(&self.payload)?;
        Ok(self.map_payload(|_| payload))
    }
}

impl<P> EventEnvelope<P> {
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn publisher(&self) -> Option<&str> {
        self.publisher.as_deref()
    }

    pub fn publish_time(&self) -> Option<DateTime<Utc>> {
        self.publish_time
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    /// `key` 与 `eventType` 不得为空，违反即为编程错误
    pub fn validate(&self) -> EvbusResult<()> {
        if self.key.trim().is_empty() {
            return Err(EvbusError::validation("event key must not be blank"));
        }
        if self.event_type.trim().is_empty() {
            return Err(EvbusError::validation("event type must not be blank"));
        }
        Ok(())
    }

    /// 发布前盖章：生产方、发送时间与链路 ID
    pub fn stamp(
        &mut self,
        publisher: impl Into<String>,
        publish_time: DateTime<Utc>,
        trace_id: Option<&str>,
    ) {
        self.stamp_origin(publisher, trace_id);
        self.publish_time = Some(publish_time);
    }

    /// 仅记录来源；发送时间由真正发送的一方填写
    pub(crate) fn stamp_origin(&mut self, publisher: impl Into<String>, trace_id: Option<&str>) {
        self.publisher = Some(publisher.into());
        if let Some(trace_id) = trace_id {
            self.trace_id = Some(trace_id.to_string());
        }
    }

    pub(crate) fn set_publish_time(&mut self, publish_time: DateTime<Utc>) {
        self.publish_time = Some(publish_time);
    }

    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> EventEnvelope<Q> {
        EventEnvelope {
            key: self.key,
            event_type: self.event_type,
            topic: self.topic,
            publisher: self.publisher,
            publish_time: self.publish_time,
            trace_id: self.trace_id,
            payload: f(self.payload),
        }
    }
}

impl EventEnvelope<Value> {
    /// 将线路载荷反序列化为具体类型
    pub fn decode<P>(&self) -> EvbusResult<EventEnvelope<P>>
    where
        P: EventPayload,
    {
        let payload: P = serde_json::from_value(self.payload.clone())?;
        Ok(self.clone().map_payload(|_| payload))
    }

    pub fn to_bytes(&self) -> EvbusResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(body: &[u8]) -> EvbusResult<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}
