use anyhow::{Context, Result};
use async_trait::async_trait;
use evbus_application::command_handler::CommandHandler;
use evbus_application::context::AppContext;
use evbus_application::error::AppError;
use evbus_application::{CommandSubscriber, OutboxCommandBus};
use evbus_domain::broker::{BrokerClient, ConsumeMode, InMemoryBroker};
use evbus_domain::config::EvbusConfig;
use evbus_domain::envelope::{EventEnvelope, TraceContext};
use evbus_domain::id_generator::{IdGenerator, UlidGenerator};
use evbus_domain::lock::InMemoryLockService;
use evbus_domain::outbox::{
    InMemoryOutboxStore, OutboxDispatcher, OutboxStore, OutboxWriter, TransactionReconciler,
};
use evbus_domain::publisher::TransactionalPublisher;
use evbus_domain::routing::TagRouter;
use evbus_domain::subscriber::{
    CacheLoader, CacheRefresh, ConsumeContext, EventConsumer, EventSubscriber, RefreshableCache,
    SubscriberRegistry,
};
use evbus_macros::{command, event_payload};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[event_payload(event_type = "OrderPaid")]
struct OrderPaid {
    order_id: String,
    amount_cents: i64,
}

#[command(name = "ShipOrder")]
struct ShipOrder {
    order_id: String,
}

/// 收到支付事件后记账
struct Ledger {
    total_cents: AtomicI64,
}

#[async_trait]
impl EventSubscriber for Ledger {
    type Payload = OrderPaid;

    fn subscriber_name(&self) -> &str {
        "ledger"
    }

    async fn on_event(
        &self,
        ctx: &ConsumeContext,
        event: &EventEnvelope<OrderPaid>,
    ) -> anyhow::Result<()> {
        let total = self
            .total_cents
            .fetch_add(event.payload().amount_cents, Ordering::SeqCst)
            + event.payload().amount_cents;
        tracing::info!(
            order_id = %event.payload().order_id,
            total_cents = total,
            reconsume_times = ctx.reconsume_times(),
            "payment booked"
        );
        Ok(())
    }
}

struct ShipOrderHandler;

#[async_trait]
impl CommandHandler<ShipOrder> for ShipOrderHandler {
    async fn handle(&self, ctx: &AppContext, cmd: ShipOrder) -> Result<(), AppError> {
        tracing::info!(
            order_id = %cmd.order_id,
            idempotency_key = ctx.idempotency_key.as_deref().unwrap_or("-"),
            "shipping order"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,evbus_domain=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EvbusConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        topic = %config.default_topic,
        prefix = %config.tag_prefix,
        "Configuration loaded"
    );

    // 外部协作方：内存参考实现
    let store = InMemoryOutboxStore::new();
    let broker = InMemoryBroker::new();
    let locks = Arc::new(InMemoryLockService::new());
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new());

    broker.register_transaction_checker(Arc::new(TransactionReconciler::new(Arc::new(
        store.clone(),
    ))));

    // 集群消费：记账与命令执行
    let mut clustering = SubscriberRegistry::new(ConsumeMode::Clustering).with(Arc::new(Ledger {
        total_cents: AtomicI64::new(0),
    }));
    CommandSubscriber::<ShipOrder, _>::register(&mut clustering, Arc::new(ShipOrderHandler));

    // 广播消费：各实例的本地缓存
    let loader: CacheLoader<Vec<String>> =
        Arc::new(|| -> BoxFuture<'static, anyhow::Result<Vec<String>>> {
            Box::pin(async { Ok(vec!["standard".to_string(), "express".to_string()]) })
        });
    let shipping_methods = Arc::new(RefreshableCache::new("shipping-methods", loader));
    shipping_methods.get().await?;
    let broadcasting =
        SubscriberRegistry::new(ConsumeMode::Broadcasting).with(shipping_methods.clone());

    let consumers = vec![
        Arc::new(EventConsumer::from_config(
            Arc::new(broker.clone()),
            clustering,
            &config,
        ))
        .start()
        .await?,
        Arc::new(EventConsumer::from_config(
            Arc::new(broker.clone()),
            broadcasting,
            &config,
        ))
        .start()
        .await?,
    ];

    let dispatcher = Arc::new(
        OutboxDispatcher::builder()
            .store(Arc::new(store.clone()))
            .lock_service(locks)
            .broker(Arc::new(broker.clone()))
            .router(TagRouter::from_config(&config))
            .config(config.dispatcher.clone())
            .id_generator(ids.clone())
            .build(),
    )
    .start();

    // 模拟 Broker 周期回查半消息
    let checker_token = CancellationToken::new();
    let checker = {
        let broker = broker.clone();
        let token = checker_token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        broker.check_transactions().await;
                    }
                }
            }
        })
    };

    // 业务流量：Outbox 事件、命令与 Broker 事务消息
    let writer = OutboxWriter::from_config(&config);
    let commands = OutboxCommandBus::new(writer.clone()).with_id_generator(ids.clone());
    let transactional = TransactionalPublisher::from_config(Arc::new(broker.clone()), &config);

    for i in 1..=3 {
        let order_id = format!("order-{i}");
        let ctx = AppContext::new(TraceContext::with_trace_id(ids.next_id()));

        let mut tx = store.begin().await?;
        writer
            .publish(
                tx.as_mut(),
                &ctx.trace,
                EventEnvelope::new(
                    ids.next_id(),
                    OrderPaid {
                        order_id: order_id.clone(),
                        amount_cents: 1_000 * i,
                    },
                ),
            )
            .await?;
        commands
            .send(tx.as_mut(), &ctx, ShipOrder { order_id })
            .await?;
        tx.commit().await?;
    }

    let mut tx = store.begin().await?;
    transactional
        .publish(
            tx.as_mut(),
            &TraceContext::with_trace_id(ids.next_id()),
            EventEnvelope::new(ids.next_id(), CacheRefresh::new("shipping-methods")),
        )
        .await?;
    tx.commit().await?;

    tracing::info!("Demo traffic published, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    dispatcher.shutdown();
    dispatcher.join().await;
    checker_token.cancel();
    let _ = checker.await;
    for consumer in consumers {
        consumer.shutdown();
        consumer.join().await;
    }

    tracing::info!(
        cached = shipping_methods.peek().is_some(),
        "Shutdown complete"
    );
    Ok(())
}
