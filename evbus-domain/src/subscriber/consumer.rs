//! 事件消费者（EventConsumer）
//!
//! 订阅 Broker 并把每条入站消息按事件类型扇出给注册表中的订阅者：
//! - 剥离部署前缀得到事件类型，无订阅者时记录错误并确认消息；
//! - 载荷只用首个订阅者的类型反序列化一次，其余订阅者共享同一解码结果；
//! - 按注册顺序依次调用，任一失败（含 panic）即中止剩余订阅者并请求重投；
//! - 全部成功才确认消息。
//!
//! 不同消息之间并发处理，上限为 `concurrency`。
//!
use super::handler::ConsumeContext;
use super::registry::SubscriberRegistry;
use crate::broker::{
    BrokerClient, ConsumeAck, ConsumeMode, Delivery, InboundMessage, Subscription,
};
use crate::config::EvbusConfig;
use crate::envelope::{EventEnvelope, TraceContext};
use crate::error::EvbusResult;
use crate::instrument::{consume_span, instrumented};
use crate::routing::TagRouter;
use bon::Builder;
use futures_core::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Builder)]
pub struct EventConsumer {
    broker: Arc<dyn BrokerClient>,
    router: TagRouter,
    registry: SubscriberRegistry,
    #[builder(into)]
    group_id: String,
    /// 订阅的 topic，缺省为部署默认 topic
    #[builder(into)]
    topic: Option<String>,
    #[builder(default = 8)]
    concurrency: usize,
}

impl EventConsumer {
    /// 按配置组装：集群模式使用消费组，广播模式使用独立的广播组
    pub fn from_config(
        broker: Arc<dyn BrokerClient>,
        registry: SubscriberRegistry,
        cfg: &EvbusConfig,
    ) -> Self {
        let group_id = match registry.mode() {
            ConsumeMode::Clustering => cfg.clustering_group().to_string(),
            ConsumeMode::Broadcasting => cfg.broadcasting_group(),
        };
        Self {
            broker,
            router: TagRouter::from_config(cfg),
            registry,
            group_id,
            topic: None,
            concurrency: cfg.consumer.handler_concurrency,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    fn topic(&self) -> &str {
        self.router.resolve_topic(self.topic.as_deref().unwrap_or_default())
    }

    /// 处理一条入站消息并给出回执
    pub async fn handle_message(&self, message: &InboundMessage) -> ConsumeAck {
        let event_type = self.router.event_type_of(&message.tag);
        let subscribers = self.registry.matching(event_type);
        if subscribers.is_empty() {
            error!(
                tag = %message.tag,
                event_type,
                group = %self.group_id,
                event_key = %message.key,
                "no subscriber for event type, message dropped"
            );
            return ConsumeAck::Commit;
        }

        let envelope = match EventEnvelope::from_bytes(&message.body) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(tag = %message.tag, event_key = %message.key, error = %err, "malformed event envelope");
                return ConsumeAck::RetryLater;
            }
        };

        let trace = TraceContext::from_envelope(&envelope);
        let span = consume_span(&trace, &self.group_id, message);
        let ctx = ConsumeContext::new(trace, self.group_id.as_str(), message);

        instrumented(span, async move {
            let decoded = match subscribers[0].decode(&envelope) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(
                        subscriber = subscribers[0].name(),
                        error = %err,
                        "failed to decode event payload"
                    );
                    return ConsumeAck::RetryLater;
                }
            };

            for subscriber in subscribers {
                let outcome = AssertUnwindSafe(subscriber.deliver(&ctx, &decoded))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        error!(
                            subscriber = subscriber.name(),
                            error = %err,
                            "subscriber failed, remaining subscribers skipped"
                        );
                        return ConsumeAck::RetryLater;
                    }
                    Err(panic) => {
                        error!(
                            subscriber = subscriber.name(),
                            panic = panic_message(panic.as_ref()),
                            "subscriber panicked, remaining subscribers skipped"
                        );
                        return ConsumeAck::RetryLater;
                    }
                }
            }

            debug!(subscribers = subscribers.len(), "event consumed");
            ConsumeAck::Commit
        })
        .await
    }

    /// 订阅并启动消费循环
    ///
    /// 返回前订阅已建立，之后发布到该 topic 的消息不会错过。
    pub async fn start(self: Arc<Self>) -> EvbusResult<ConsumerHandle> {
        let subscription = Subscription::builder()
            .topic(self.topic())
            .filter(self.registry.tag_filter(&self.router))
            .group_id(self.group_id.as_str())
            .mode(self.registry.mode())
            .build();
        let expression = subscription.filter.expression();
        let stream = self.broker.subscribe(subscription).await?;

        info!(
            group = %self.group_id,
            topic = self.topic(),
            mode = ?self.registry.mode(),
            filter = %expression,
            "event consumer started"
        );

        let token = CancellationToken::new();
        let task = tokio::spawn(Self::consume_loop(self.clone(), stream, token.clone()));
        Ok(ConsumerHandle {
            token,
            task: Some(task),
        })
    }

    async fn consume_loop(
        self: Arc<Self>,
        stream: BoxStream<'static, Delivery>,
        token: CancellationToken,
    ) {
        let this = &self;
        stream
            .take_until(token.cancelled_owned())
            .for_each_concurrent(Some(self.concurrency.max(1)), move |delivery| async move {
                let ack = this.handle_message(delivery.message()).await;
                delivery.ack(ack);
            })
            .await;

        info!(group = %self.group_id, "event consumer stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

/// 消费者运行句柄：停止拉取（取消订阅）并等待在途消息处理完成
pub struct ConsumerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConsumerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryBroker, OutboundMessage};
    use crate::envelope::EventPayload;
    use crate::subscriber::EventSubscriber;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderPaid {
        order_id: String,
    }

    impl EventPayload for OrderPaid {
        const EVENT_TYPE: &'static str = "OrderPaid";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderPaidSummary {
        order_id: String,
    }

    impl EventPayload for OrderPaidSummary {
        const EVENT_TYPE: &'static str = "OrderPaid";
    }

    /// 记录调用顺序的订阅者
    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventSubscriber for Recorder {
        type Payload = OrderPaid;

        fn subscriber_name(&self) -> &str {
            self.name
        }

        async fn on_event(
            &self,
            ctx: &ConsumeContext,
            event: &EventEnvelope<OrderPaid>,
        ) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.payload().order_id));
            assert_eq!(ctx.trace().correlation_id(), Some(event.key()));
            if self.fail {
                anyhow::bail!("{} failed", self.name);
            }
            Ok(())
        }
    }

    struct SummaryCounter(Arc<AtomicUsize>);

    #[async_trait]
    impl EventSubscriber for SummaryCounter {
        type Payload = OrderPaidSummary;

        fn subscriber_name(&self) -> &str {
            "summary"
        }

        async fn on_event(
            &self,
            _ctx: &ConsumeContext,
            _event: &EventEnvelope<OrderPaidSummary>,
        ) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 首次调用 panic，之后正常计数
    struct PanicOnce {
        calls: AtomicUsize,
        handled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSubscriber for PanicOnce {
        type Payload = OrderPaid;

        fn subscriber_name(&self) -> &str {
            "panic-once"
        }

        async fn on_event(
            &self,
            _ctx: &ConsumeContext,
            _event: &EventEnvelope<OrderPaid>,
        ) -> anyhow::Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("ledger unavailable");
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn recorder(name: &'static str, calls: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<Recorder> {
        Arc::new(Recorder {
            name,
            calls: calls.clone(),
            fail,
        })
    }

    fn consumer(registry: SubscriberRegistry) -> EventConsumer {
        EventConsumer::builder()
            .broker(Arc::new(InMemoryBroker::new()))
            .router(TagRouter::new("test_", "orders"))
            .registry(registry)
            .group_id("billing")
            .build()
    }

    fn inbound(tag: &str, key: &str, body: Vec<u8>) -> InboundMessage {
        InboundMessage {
            msg_id: format!("msg-{key}"),
            topic: "orders".into(),
            tag: tag.into(),
            key: key.into(),
            body,
            reconsume_times: 0,
        }
    }

    fn order_paid(key: &str) -> InboundMessage {
        let body = EventEnvelope::new(key, OrderPaid { order_id: "o-1".into() })
            .into_wire()
            .unwrap()
            .to_bytes()
            .unwrap();
        inbound("test_OrderPaid", key, body)
    }

    #[tokio::test]
    async fn fans_out_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry = SubscriberRegistry::new(ConsumeMode::Clustering)
            .with(recorder("a", &calls, false))
            .with(recorder("b", &calls, false))
            .with(recorder("c", &calls, false));

        let ack = consumer(registry).handle_message(&order_paid("evt-1")).await;
        assert_eq!(ack, ConsumeAck::Commit);
        assert_eq!(*calls.lock().unwrap(), vec!["a:o-1", "b:o-1", "c:o-1"]);
    }

    #[tokio::test]
    async fn failure_aborts_remaining_subscribers() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry = SubscriberRegistry::new(ConsumeMode::Clustering)
            .with(recorder("a", &calls, false))
            .with(recorder("b", &calls, true))
            .with(recorder("c", &calls, false));

        let ack = consumer(registry).handle_message(&order_paid("evt-1")).await;
        assert_eq!(ack, ConsumeAck::RetryLater);
        assert_eq!(*calls.lock().unwrap(), vec!["a:o-1", "b:o-1"]);
    }

    #[tokio::test]
    async fn no_subscriber_commits() {
        let registry = SubscriberRegistry::new(ConsumeMode::Clustering);
        let ack = consumer(registry)
            .handle_message(&inbound("test_OrderShipped", "evt-1", b"{}".to_vec()))
            .await;
        assert_eq!(ack, ConsumeAck::Commit);
    }

    #[tokio::test]
    async fn malformed_body_is_retried() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry =
            SubscriberRegistry::new(ConsumeMode::Clustering).with(recorder("a", &calls, false));
        let ack = consumer(registry)
            .handle_message(&inbound("test_OrderPaid", "evt-1", b"not json".to_vec()))
            .await;
        assert_eq!(ack, ConsumeAck::RetryLater);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disagreeing_payload_type_is_a_failure() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let summaries = Arc::new(AtomicUsize::new(0));
        let registry = SubscriberRegistry::new(ConsumeMode::Clustering)
            .with(recorder("a", &calls, false))
            .with(Arc::new(SummaryCounter(summaries.clone())));

        let ack = consumer(registry).handle_message(&order_paid("evt-1")).await;
        assert_eq!(ack, ConsumeAck::RetryLater);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(summaries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tag_without_prefix_still_routes() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry =
            SubscriberRegistry::new(ConsumeMode::Clustering).with(recorder("a", &calls, false));
        let mut message = order_paid("evt-1");
        message.tag = "OrderPaid".into();

        assert_eq!(consumer(registry).handle_message(&message).await, ConsumeAck::Commit);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn started_consumer_acks_deliveries() {
        let broker = InMemoryBroker::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let consumer = Arc::new(
            EventConsumer::builder()
                .broker(Arc::new(broker.clone()))
                .router(TagRouter::new("test_", "orders"))
                .registry(
                    SubscriberRegistry::new(ConsumeMode::Clustering)
                        .with(recorder("a", &calls, false)),
                )
                .group_id("billing")
                .build(),
        );
        let handle = consumer.start().await.unwrap();

        let message = order_paid("evt-1");
        broker
            .send(
                OutboundMessage::builder()
                    .topic("orders")
                    .tag(message.tag.clone())
                    .key(message.key.clone())
                    .body(message.body.clone())
                    .build(),
            )
            .await
            .unwrap();

        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            while calls.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        handle.shutdown();
        handle.join().await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn panicking_subscriber_is_retried() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let handled = Arc::new(AtomicUsize::new(0));
        let registry = SubscriberRegistry::new(ConsumeMode::Clustering)
            .with(Arc::new(PanicOnce {
                calls: AtomicUsize::new(0),
                handled: handled.clone(),
            }))
            .with(recorder("after", &calls, false));
        let consumer = consumer(registry);

        assert_eq!(consumer.handle_message(&order_paid("evt-1")).await, ConsumeAck::RetryLater);
        assert!(calls.lock().unwrap().is_empty());

        assert_eq!(consumer.handle_message(&order_paid("evt-1")).await, ConsumeAck::Commit);
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn consumer_survives_a_panicking_subscriber() {
        let broker = InMemoryBroker::new();
        let handled = Arc::new(AtomicUsize::new(0));
        let consumer = Arc::new(
            EventConsumer::builder()
                .broker(Arc::new(broker.clone()))
                .router(TagRouter::new("test_", "orders"))
                .registry(SubscriberRegistry::new(ConsumeMode::Clustering).with(Arc::new(
                    PanicOnce {
                        calls: AtomicUsize::new(0),
                        handled: handled.clone(),
                    },
                )))
                .group_id("billing")
                .build(),
        );
        let handle = consumer.start().await.unwrap();

        for i in 0..5 {
            let message = order_paid(&format!("evt-{i}"));
            broker
                .send(
                    OutboundMessage::builder()
                        .topic("orders")
                        .tag(message.tag.clone())
                        .key(message.key.clone())
                        .body(message.body.clone())
                        .build(),
                )
                .await
                .unwrap();
        }

        let _ = tokio::time::timeout(Duration::from_secs(3), async {
            while handled.load(Ordering::SeqCst) < 5 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        handle.shutdown();
        handle.join().await;
        assert_eq!(handled.load(Ordering::SeqCst), 5);
    }
}
