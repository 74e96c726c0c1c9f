//! 发布路径
//!
//! - `ImmediatePublisher`：直接发送到 Broker，失败时同步退避重试，不留持久化记录；
//! - `TransactionalPublisher`：Broker 事务半消息 + Outbox 记录作为提交凭证。
//!
//! 事务内写 Outbox 的路径见 `outbox::OutboxWriter`。

mod immediate;
mod transactional;

pub use immediate::ImmediatePublisher;
pub use transactional::TransactionalPublisher;

use crate::error::{EvbusError, EvbusResult};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// 校验延迟投递时间：超出最远期限视为编程错误；已过去的时间按立即投递处理
pub(crate) fn normalize_deliver_at(
    deliver_at: Option<DateTime<Utc>>,
    horizon: Duration,
    now: DateTime<Utc>,
) -> EvbusResult<Option<DateTime<Utc>>> {
    let Some(at) = deliver_at else {
        return Ok(None);
    };
    if at <= now {
        return Ok(None);
    }
    let horizon = chrono::Duration::from_std(horizon)?;
    if at - now > horizon {
        return Err(EvbusError::validation(format!(
            "deliver time {at} exceeds the maximum delivery horizon"
        )));
    }
    Ok(Some(at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_at_bounds() {
        let now = Utc::now();
        let week = Duration::from_secs(7 * 24 * 3600);

        assert_eq!(normalize_deliver_at(None, week, now).unwrap(), None);
        assert_eq!(
            normalize_deliver_at(Some(now - chrono::Duration::seconds(5)), week, now).unwrap(),
            None
        );

        let tomorrow = now + chrono::Duration::days(1);
        assert_eq!(
            normalize_deliver_at(Some(tomorrow), week, now).unwrap(),
            Some(tomorrow)
        );

        let too_far = now + chrono::Duration::days(8);
        assert!(matches!(
            normalize_deliver_at(Some(too_far), week, now),
            Err(EvbusError::Validation { .. })
        ));
    }
}
