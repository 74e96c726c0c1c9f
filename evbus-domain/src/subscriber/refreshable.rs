use super::handler::{ConsumeContext, EventSubscriber};
use crate::envelope::{EventEnvelope, EventPayload};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// 缓存刷新通知：按缓存名称失效各实例的本地缓存
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRefresh {
    pub cache: String,
}

impl CacheRefresh {
    pub fn new(cache: impl Into<String>) -> Self {
        Self {
            cache: cache.into(),
        }
    }
}

impl EventPayload for CacheRefresh {
    const EVENT_TYPE: &'static str = "CacheRefresh";
}

pub type CacheLoader<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// 可刷新的进程内缓存
///
/// 作为广播订阅者注册：收到同名的 `CacheRefresh` 时丢弃当前值，
/// 或在 `eager` 模式下立即重新加载。
pub struct RefreshableCache<T> {
    name: String,
    loader: CacheLoader<T>,
    eager: bool,
    value: RwLock<Option<Arc<T>>>,
}

impl<T> RefreshableCache<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, loader: CacheLoader<T>) -> Self {
        Self {
            name: name.into(),
            loader,
            eager: false,
            value: RwLock::new(None),
        }
    }

    /// 收到刷新通知后立即重新加载，而不是等到下一次读取
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前缓存值，不触发加载
    pub fn peek(&self) -> Option<Arc<T>> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 读取缓存，未命中时加载
    pub async fn get(&self) -> anyhow::Result<Arc<T>> {
        if let Some(value) = self.peek() {
            return Ok(value);
        }
        self.reload().await
    }

    pub fn invalidate(&self) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub async fn reload(&self) -> anyhow::Result<Arc<T>> {
        let value = Arc::new((self.loader)().await?);
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(value.clone());
        Ok(value)
    }
}

#[async_trait]
impl<T> EventSubscriber for RefreshableCache<T>
where
    T: Send + Sync + 'static,
{
    type Payload = CacheRefresh;

    fn subscriber_name(&self) -> &str {
        &self.name
    }

    async fn on_event(
        &self,
        _ctx: &ConsumeContext,
        event: &EventEnvelope<CacheRefresh>,
    ) -> anyhow::Result<()> {
        if event.payload().cache != self.name {
            return Ok(());
        }

        if self.eager {
            self.reload().await?;
            debug!(cache = %self.name, "cache reloaded");
        } else {
            self.invalidate();
            debug!(cache = %self.name, "cache invalidated");
        }
        Ok(())
    }
}
