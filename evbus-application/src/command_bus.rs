use crate::{command::Command, context::AppContext, error::AppError};
use async_trait::async_trait;
use evbus_domain::envelope::EventEnvelope;
use evbus_domain::id_generator::{IdGenerator, UlidGenerator};
use evbus_domain::outbox::{OutboxTransaction, OutboxWriter};
use evbus_domain::publisher::ImmediatePublisher;
use std::sync::Arc;
use tracing::debug;

/// 命令总线（Command Bus）
///
/// - 将命令发布为事件，由集群消费的 `CommandSubscriber` 在某一实例上执行；
/// - 返回的是命令事件的 key，而不是执行结果；
/// - 该 trait 带有泛型方法，通常以具体实现类型注入使用。
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// 发布命令
    ///
    /// - `ctx`：应用上下文（链路追踪、幂等键等）
    /// - `cmd`：具体命令实例
    async fn dispatch<C>(&self, ctx: &AppContext, cmd: C) -> Result<String, AppError>
    where
        C: Command;
}

/// 事务性命令总线：命令随调用方事务写入 Outbox，与业务变更同时提交
pub struct OutboxCommandBus {
    writer: OutboxWriter,
    ids: Arc<dyn IdGenerator>,
}

impl OutboxCommandBus {
    pub fn new(writer: OutboxWriter) -> Self {
        Self {
            writer,
            ids: Arc::new(UlidGenerator::new()),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// 在调用方事务内写入命令事件，返回事件 key
    pub async fn send<C>(
        &self,
        tx: &mut dyn OutboxTransaction,
        ctx: &AppContext,
        cmd: C,
    ) -> Result<String, AppError>
    where
        C: Command,
    {
        let key = ctx.event_key(self.ids.as_ref());
        self.writer
            .publish(tx, &ctx.trace, EventEnvelope::new(key.as_str(), cmd))
            .await?;
        debug!(command = C::NAME, event_key = %key, "command appended to outbox");
        Ok(key)
    }
}

/// 即时命令总线：直接发送到 Broker，不随业务事务提交（尽力而为）
pub struct ImmediateCommandBus {
    publisher: ImmediatePublisher,
    ids: Arc<dyn IdGenerator>,
}

impl ImmediateCommandBus {
    pub fn new(publisher: ImmediatePublisher) -> Self {
        Self {
            publisher,
            ids: Arc::new(UlidGenerator::new()),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}

#[async_trait]
impl CommandBus for ImmediateCommandBus {
    async fn dispatch<C>(&self, ctx: &AppContext, cmd: C) -> Result<String, AppError>
    where
        C: Command,
    {
        let key = ctx.event_key(self.ids.as_ref());
        self.publisher
            .publish(&ctx.trace, EventEnvelope::new(key.as_str(), cmd))
            .await?;
        debug!(command = C::NAME, event_key = %key, "command published");
        Ok(key)
    }
}
