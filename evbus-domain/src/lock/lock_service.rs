use crate::error::EvbusResult;
use async_trait::async_trait;
use std::time::Duration;

/// 一次成功获取锁后得到的令牌，释放时凭令牌校验持有者
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockToken {
    key: String,
    value: String,
}

impl LockToken {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// 锁服务：非阻塞获取 + 按令牌释放
///
/// 实现需支持秒级 TTL，并在大量调用方争抢同一 key 时保持正确。
/// 释放已过期或已被他人重新持有的锁为空操作。
#[async_trait]
pub trait LockService: Send + Sync {
    /// 尝试获取锁；被占用时返回 `None`（不是错误）
    async fn try_acquire(&self, key: &str, ttl: Duration) -> EvbusResult<Option<LockToken>>;

    async fn release(&self, token: LockToken) -> EvbusResult<()>;
}
