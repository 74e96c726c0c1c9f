use super::{LockService, LockToken};
use crate::error::EvbusResult;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};

struct Lease {
    value: String,
    expires_at: Instant,
}

/// 内存版锁服务
///
/// 以 `DashMap` 的 entry 原子性保证同一 key 的获取互斥；
/// 过期的租约视为空闲，可被下一个调用方直接接管。
#[derive(Default)]
pub struct InMemoryLockService {
    leases: DashMap<String, Lease>,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前是否有未过期的持有者
    pub fn is_held(&self, key: &str) -> bool {
        self.leases
            .get(key)
            .map(|lease| lease.expires_at > Instant::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> EvbusResult<Option<LockToken>> {
        let now = Instant::now();
        let value = uuid::Uuid::new_v4().to_string();

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return Ok(None);
                }
                occupied.insert(Lease {
                    value: value.clone(),
                    expires_at: now + ttl,
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Lease {
                    value: value.clone(),
                    expires_at: now + ttl,
                });
            }
        }

        Ok(Some(LockToken::new(key, value)))
    }

    async fn release(&self, token: LockToken) -> EvbusResult<()> {
        self.leases
            .remove_if(token.key(), |_, lease| lease.value == token.value());
        Ok(())
    }
}
