//! 锁服务（Lock Service）
//!
//! 具名、带 TTL、不可重入的互斥令牌。Outbox 投递器按记录加锁，
//! 以保证多实例并发时同一记录至多一个发送者。

mod lock_service;
#[cfg(feature = "inmemory")]
mod lock_inmemory;

pub use lock_service::{LockService, LockToken};
#[cfg(feature = "inmemory")]
pub use lock_inmemory::InMemoryLockService;
