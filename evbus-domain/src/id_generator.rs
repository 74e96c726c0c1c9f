//! 唯一标识生成器
//!
//! 以显式实例注入到需要生成事件 key / 链路 ID 的组件中，不使用进程级单例。
//!
use std::sync::Mutex;
use ulid::Generator;

/// 唯一标识生成器
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// 基于 ULID 的生成器：同一实例内保证单调递增
pub struct UlidGenerator {
    inner: Mutex<Generator>,
}

impl UlidGenerator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }
}

impl Default for UlidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for UlidGenerator {
    fn next_id(&self) -> String {
        let mut generator = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // 同一毫秒内随机位溢出时退化为非单调 ULID
        generator
            .generate()
            .unwrap_or_else(|_| ulid::Ulid::new())
            .to_string()
    }
}

/// 基于 UUID v4 的生成器
#[derive(Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
