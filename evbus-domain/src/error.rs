//! 事件总线统一错误定义
//!
//! 聚焦校验、序列化、Broker 传输、锁服务、Outbox 存储与订阅处理等最小必要集合，
//! 便于在各适配实现中统一转换为 `EvbusError`。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EvbusError {
    // --- 校验（编程错误，不重试） ---
    #[error("validation error: {reason}")]
    Validation { reason: String },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 基础设施 ---
    #[error("broker error: {reason}")]
    Broker { reason: String },
    #[error("lock service error: {reason}")]
    Lock { reason: String },
    #[error("outbox store error: {reason}")]
    OutboxStore { reason: String },

    // --- 订阅处理 ---
    #[error("subscriber error: subscriber={subscriber}, reason={reason}")]
    Subscriber { subscriber: String, reason: String },

    // --- 通用 ---
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl EvbusError {
    pub fn validation(reason: impl Into<String>) -> Self {
        EvbusError::Validation {
            reason: reason.into(),
        }
    }

    pub fn broker(reason: impl Into<String>) -> Self {
        EvbusError::Broker {
            reason: reason.into(),
        }
    }

    pub fn lock(reason: impl Into<String>) -> Self {
        EvbusError::Lock {
            reason: reason.into(),
        }
    }

    pub fn outbox_store(reason: impl Into<String>) -> Self {
        EvbusError::OutboxStore {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        EvbusError::Config {
            reason: reason.into(),
        }
    }

    /// 基础设施故障可重试；校验、序列化与类型不一致属于编程错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EvbusError::Broker { .. } | EvbusError::Lock { .. } | EvbusError::OutboxStore { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type EvbusResult<T> = Result<T, EvbusError>;

impl From<chrono::OutOfRangeError> for EvbusError {
    fn from(err: chrono::OutOfRangeError) -> Self {
        EvbusError::Validation {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(EvbusError::broker("connection reset").is_retryable());
        assert!(EvbusError::outbox_store("deadlock").is_retryable());
        assert!(EvbusError::lock("timeout").is_retryable());
        assert!(!EvbusError::validation("key is blank").is_retryable());
        assert!(
            !EvbusError::TypeMismatch {
                expected: "A".into(),
                found: "B".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn display_carries_reason() {
        let err = EvbusError::Subscriber {
            subscriber: "order-projector".into(),
            reason: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "subscriber error: subscriber=order-projector, reason=boom"
        );
    }
}
