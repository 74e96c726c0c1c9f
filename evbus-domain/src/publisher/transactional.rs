use crate::broker::{BrokerClient, OutboundMessage, SendReceipt};
use crate::config::EvbusConfig;
use crate::envelope::{EventEnvelope, EventPayload, TraceContext};
use crate::error::EvbusResult;
use crate::instrument::{instrumented, publish_span};
use crate::outbox::{NewOutboxRecord, OutboxStatus, OutboxTransaction};
use crate::routing::TagRouter;
use bon::Builder;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Broker 事务发布器
///
/// 先发送半消息，再在调用方事务内写入 Outbox 记录作为提交凭证：
/// - 事务提交：回查器找到记录，Broker 提交半消息；
/// - 事务回滚：记录不存在，Broker 丢弃半消息。
///
/// 半消息本身即是投递，因此记录直接以 `SendSuccess`、`count = 1` 写入，投递器不会重发。
/// 半消息发送失败时错误返回给调用方，由其回滚业务事务。
#[derive(Builder, Clone)]
pub struct TransactionalPublisher {
    broker: Arc<dyn BrokerClient>,
    router: TagRouter,
    #[builder(into)]
    publisher_id: String,
}

impl TransactionalPublisher {
    pub fn from_config(broker: Arc<dyn BrokerClient>, cfg: &EvbusConfig) -> Self {
        Self {
            broker,
            router: TagRouter::from_config(cfg),
            publisher_id: cfg.publisher_id.clone(),
        }
    }

    pub async fn publish<P>(
        &self,
        tx: &mut dyn OutboxTransaction,
        ctx: &TraceContext,
        envelope: EventEnvelope<P>,
    ) -> EvbusResult<SendReceipt>
    where
        P: EventPayload,
    {
        envelope.validate()?;
        let span = publish_span(ctx, envelope.event_type(), envelope.key());

        let mut envelope = envelope.into_wire()?;
        envelope.stamp(self.publisher_id.as_str(), Utc::now(), ctx.trace_id());

        let message = OutboundMessage::builder()
            .topic(self.router.topic_for(&envelope))
            .tag(self.router.tag_for(envelope.event_type()))
            .key(envelope.key())
            .body(envelope.to_bytes()?)
            .build();

        instrumented(span, async move {
            let receipt = self.broker.send_transactional(message).await?;
            debug!(msg_id = %receipt.msg_id, "half message sent");

            let record = NewOutboxRecord::builder()
                .envelope(envelope)
                .status(OutboxStatus::SendSuccess)
                .count(1)
                .build();
            tx.insert(record).await?;
            Ok(receipt)
        })
        .await
    }
}
