use super::record::{NewOutboxRecord, OutboxStatus};
use super::store::OutboxTransaction;
use crate::config::EvbusConfig;
use crate::envelope::{EventEnvelope, EventPayload, TraceContext};
use crate::error::EvbusResult;
use crate::publisher::normalize_deliver_at;
use bon::Builder;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Outbox 写入器
///
/// 在调用方已开启的事务内追加一条 `WaitSend` 记录后立即返回，不做任何网络 I/O；
/// 事务提交则事件"发生"，回滚则不留痕迹。实际发送由 `OutboxDispatcher` 完成。
#[derive(Builder, Clone, Debug)]
pub struct OutboxWriter {
    #[builder(into)]
    publisher_id: String,
    #[builder(default = Duration::from_secs(7 * 24 * 60 * 60))]
    max_delivery_horizon: Duration,
}

impl OutboxWriter {
    pub fn from_config(cfg: &EvbusConfig) -> Self {
        Self {
            publisher_id: cfg.publisher_id.clone(),
            max_delivery_horizon: cfg.max_delivery_horizon,
        }
    }

    pub async fn publish<P>(
        &self,
        tx: &mut dyn OutboxTransaction,
        ctx: &TraceContext,
        envelope: EventEnvelope<P>,
    ) -> EvbusResult<()>
    where
        P: EventPayload,
    {
        self.write(tx, ctx, envelope, None).await
    }

    /// 延迟投递：在 `deliver_at` 之前不会被发送
    pub async fn publish_at<P>(
        &self,
        tx: &mut dyn OutboxTransaction,
        ctx: &TraceContext,
        envelope: EventEnvelope<P>,
        deliver_at: DateTime<Utc>,
    ) -> EvbusResult<()>
    where
        P: EventPayload,
    {
        self.write(tx, ctx, envelope, Some(deliver_at)).await
    }

    async fn write<P>(
        &self,
        tx: &mut dyn OutboxTransaction,
        ctx: &TraceContext,
        envelope: EventEnvelope<P>,
        deliver_at: Option<DateTime<Utc>>,
    ) -> EvbusResult<()>
    where
        P: EventPayload,
    {
        envelope.validate()?;
        let start_deliver_time =
            normalize_deliver_at(deliver_at, self.max_delivery_horizon, Utc::now())?;

        let mut envelope = envelope.into_wire()?;
        envelope.stamp_origin(self.publisher_id.as_str(), ctx.trace_id());

        debug!(
            event_key = envelope.key(),
            event_type = envelope.event_type(),
            "event appended to outbox"
        );

        let record = NewOutboxRecord::builder()
            .envelope(envelope)
            .status(OutboxStatus::WaitSend)
            .count(0)
            .maybe_start_deliver_time(start_deliver_time)
            .build();
        tx.insert(record).await
    }
}
