use crate::{command::Command, command_handler::CommandHandler, context::AppContext, error::AppError};
use async_trait::async_trait;
use evbus_domain::broker::ConsumeMode;
use evbus_domain::envelope::EventEnvelope;
use evbus_domain::subscriber::{ConsumeContext, EventSubscriber, SubscriberRegistry};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// 命令订阅者：把 `CommandHandler<C>` 适配为事件订阅者
///
/// 应注册到集群消费的注册表中，使每条命令在同一消费组内只执行一次。
/// 命令事件的 key 作为处理器看到的幂等键。
pub struct CommandSubscriber<C, H> {
    handler: Arc<H>,
    _command: PhantomData<fn() -> C>,
}

impl<C, H> CommandSubscriber<C, H>
where
    C: Command,
    H: CommandHandler<C>,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            _command: PhantomData,
        }
    }

    /// 注册到集群注册表；广播注册表会让每个实例都执行一次命令
    pub fn register(registry: &mut SubscriberRegistry, handler: Arc<H>) {
        if registry.mode() != ConsumeMode::Clustering {
            warn!(
                command = C::NAME,
                "command handler registered for broadcasting, it will run on every instance"
            );
        }
        registry.register(Arc::new(Self::new(handler)));
    }
}

#[async_trait]
impl<C, H> EventSubscriber for CommandSubscriber<C, H>
where
    C: Command,
    H: CommandHandler<C>,
{
    type Payload = C;

    fn subscriber_name(&self) -> &str {
        C::NAME
    }

    async fn on_event(&self, ctx: &ConsumeContext, event: &EventEnvelope<C>) -> anyhow::Result<()> {
        let app_ctx = AppContext {
            trace: ctx.trace().clone(),
            idempotency_key: Some(event.key().to_string()),
        };
        self.handler
            .handle(&app_ctx, event.payload().clone())
            .await
            .map_err(|err| AppError::CommandFailed {
                command: C::NAME,
                reason: err.to_string(),
            })?;
        debug!(command = C::NAME, event_key = event.key(), "command executed");
        Ok(())
    }
}
