use super::normalize_deliver_at;
use crate::broker::{BrokerClient, OutboundMessage, SendReceipt};
use crate::config::EvbusConfig;
use crate::envelope::{EventEnvelope, EventPayload, TraceContext};
use crate::error::EvbusResult;
use crate::instrument::{instrumented, publish_span};
use crate::routing::TagRouter;
use bon::Builder;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// 即时发布器
///
/// 不经过 Outbox 直接发送；失败时按退避序列在调用方任务内同步重试，
/// 全部失败后返回最后一次的错误。没有持久化记录，进程崩溃即丢失。
#[derive(Builder, Clone)]
pub struct ImmediatePublisher {
    broker: Arc<dyn BrokerClient>,
    router: TagRouter,
    #[builder(into)]
    publisher_id: String,
    #[builder(default = vec![Duration::from_secs(1), Duration::from_secs(3), Duration::from_secs(10)])]
    backoff: Vec<Duration>,
    #[builder(default = Duration::from_secs(7 * 24 * 60 * 60))]
    max_delivery_horizon: Duration,
}

impl ImmediatePublisher {
    pub fn from_config(broker: Arc<dyn BrokerClient>, cfg: &EvbusConfig) -> Self {
        Self {
            broker,
            router: TagRouter::from_config(cfg),
            publisher_id: cfg.publisher_id.clone(),
            backoff: cfg.immediate.backoff.clone(),
            max_delivery_horizon: cfg.max_delivery_horizon,
        }
    }

    pub async fn publish<P>(
        &self,
        ctx: &TraceContext,
        envelope: EventEnvelope<P>,
    ) -> EvbusResult<SendReceipt>
    where
        P: EventPayload,
    {
        self.send(ctx, envelope, None).await
    }

    /// 延迟投递；已过去的时间按立即投递处理
    pub async fn publish_at<P>(
        &self,
        ctx: &TraceContext,
        envelope: EventEnvelope<P>,
        deliver_at: DateTime<Utc>,
    ) -> EvbusResult<SendReceipt>
    where
        P: EventPayload,
    {
        self.send(ctx, envelope, Some(deliver_at)).await
    }

    async fn send<P>(
        &self,
        ctx: &TraceContext,
        envelope: EventEnvelope<P>,
        deliver_at: Option<DateTime<Utc>>,
    ) -> EvbusResult<SendReceipt>
    where
        P: EventPayload,
    {
        envelope.validate()?;
        let span = publish_span(ctx, envelope.event_type(), envelope.key());

        let now = Utc::now();
        let deliver_at = normalize_deliver_at(deliver_at, self.max_delivery_horizon, now)?;

        let mut envelope = envelope.into_wire()?;
        envelope.stamp(self.publisher_id.as_str(), now, ctx.trace_id());

        let message = OutboundMessage::builder()
            .topic(self.router.topic_for(&envelope))
            .tag(self.router.tag_for(envelope.event_type()))
            .key(envelope.key())
            .body(envelope.to_bytes()?)
            .maybe_deliver_at(deliver_at)
            .build();

        instrumented(span, self.send_with_retry(message)).await
    }

    async fn send_with_retry(&self, message: OutboundMessage) -> EvbusResult<SendReceipt> {
        let mut delays = self.backoff.iter();
        let mut attempt = 1usize;

        loop {
            match self.broker.send(message.clone()).await {
                Ok(receipt) => {
                    debug!(attempt, msg_id = %receipt.msg_id, "event published");
                    return Ok(receipt);
                }
                Err(err) => match delays.next() {
                    Some(delay) => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "publish failed, retrying"
                        );
                        tokio::time::sleep(*delay).await;
                        attempt += 1;
                    }
                    None => {
                        error!(attempt, error = %err, "publish failed, retries exhausted");
                        return Err(err);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::error::EvbusError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderPaid {
        order_id: String,
    }

    impl EventPayload for OrderPaid {
        const EVENT_TYPE: &'static str = "OrderPaid";
    }

    fn publisher(broker: &InMemoryBroker) -> ImmediatePublisher {
        ImmediatePublisher::builder()
            .broker(Arc::new(broker.clone()))
            .router(TagRouter::new("dev_", "orders"))
            .publisher_id("billing")
            .backoff(vec![Duration::from_millis(1); 3])
            .build()
    }

    fn event(key: &str) -> EventEnvelope<OrderPaid> {
        EventEnvelope::new(
            key,
            OrderPaid {
                order_id: "o-1".into(),
            },
        )
    }

    #[test]
    fn builder_defaults_follow_config_defaults() {
        let publisher = ImmediatePublisher::builder()
            .broker(Arc::new(InMemoryBroker::new()))
            .router(TagRouter::new("dev_", "orders"))
            .publisher_id("billing")
            .build();
        assert_eq!(
            publisher.backoff,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(10)
            ]
        );
        assert_eq!(publisher.max_delivery_horizon, Duration::from_secs(604_800));

        let cfg = EvbusConfig::default();
        let configured = ImmediatePublisher::from_config(Arc::new(InMemoryBroker::new()), &cfg);
        assert_eq!(configured.backoff, publisher.backoff);
        assert_eq!(configured.max_delivery_horizon, publisher.max_delivery_horizon);
    }

    #[tokio::test]
    async fn publish_sends_stamped_envelope() {
        let broker = InMemoryBroker::new();
        publisher(&broker)
            .publish(&TraceContext::with_trace_id("t-1"), event("evt-1"))
            .await
            .unwrap();

        let sent = broker.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tag(), "dev_OrderPaid");
        assert_eq!(sent[0].topic(), "orders");

        let wire = EventEnvelope::from_bytes(sent[0].body()).unwrap();
        assert_eq!(wire.publisher(), Some("billing"));
        assert_eq!(wire.trace_id(), Some("t-1"));
        assert!(wire.publish_time().is_some());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let broker = InMemoryBroker::new();
        broker.fail_next_sends(2);

        publisher(&broker)
            .publish(&TraceContext::default(), event("evt-1"))
            .await
            .unwrap();
        assert_eq!(broker.send_attempts(), 3);
        assert_eq!(broker.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_backoff_is_exhausted() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable(true);

        let err = publisher(&broker)
            .publish(&TraceContext::default(), event("evt-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, EvbusError::Broker { .. }));
        // 首次 + 三次重试
        assert_eq!(broker.send_attempts(), 4);
    }

    #[tokio::test]
    async fn deliver_at_beyond_horizon_is_rejected_before_sending() {
        let broker = InMemoryBroker::new();
        let err = publisher(&broker)
            .publish_at(
                &TraceContext::default(),
                event("evt-1"),
                Utc::now() + chrono::Duration::days(8),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EvbusError::Validation { .. }));
        assert_eq!(broker.send_attempts(), 0);
    }

    #[tokio::test]
    async fn past_deliver_at_is_sent_immediately() {
        let broker = InMemoryBroker::new();
        publisher(&broker)
            .publish_at(
                &TraceContext::default(),
                event("evt-1"),
                Utc::now() - chrono::Duration::minutes(1),
            )
            .await
            .unwrap();
        assert_eq!(broker.sent_messages()[0].deliver_at(), None);
    }
}
