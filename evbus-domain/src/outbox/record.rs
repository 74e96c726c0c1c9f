use crate::envelope::EventEnvelope;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbox 记录状态
///
/// 只允许 WaitSend → SendSuccess / SendFailed / WaitSend，终态不可离开。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutboxStatus {
    WaitSend,
    SendSuccess,
    SendFailed,
}

impl OutboxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutboxStatus::WaitSend)
    }

    pub fn can_transition_to(&self, next: OutboxStatus) -> bool {
        matches!(self, OutboxStatus::WaitSend)
            && matches!(
                next,
                OutboxStatus::WaitSend | OutboxStatus::SendSuccess | OutboxStatus::SendFailed
            )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::WaitSend => "WAIT_SEND",
            OutboxStatus::SendSuccess => "SEND_SUCCESS",
            OutboxStatus::SendFailed => "SEND_FAILED",
        }
    }
}

/// 待插入的记录：信封 + 初始状态，主键与时间戳由存储层分配
#[derive(Debug, Clone, Builder)]
pub struct NewOutboxRecord {
    envelope: EventEnvelope<Value>,
    #[builder(default = OutboxStatus::WaitSend)]
    status: OutboxStatus,
    #[builder(default)]
    count: u32,
    start_deliver_time: Option<DateTime<Utc>>,
}

impl NewOutboxRecord {
    pub fn envelope(&self) -> &EventEnvelope<Value> {
        &self.envelope
    }

    pub fn status(&self) -> OutboxStatus {
        self.status
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn start_deliver_time(&self) -> Option<DateTime<Utc>> {
        self.start_deliver_time
    }

    /// 由存储层在提交时调用，生成持久化形态
    pub fn into_record(self, id: i64, now: DateTime<Utc>) -> OutboxRecord {
        OutboxRecord {
            id,
            envelope: self.envelope,
            status: self.status,
            count: self.count,
            start_deliver_time: self.start_deliver_time,
            create_time: now,
            update_time: now,
        }
    }
}

/// Outbox 持久化记录（信封的超集）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// 存储主键，与事件 key 无关
    id: i64,
    envelope: EventEnvelope<Value>,
    status: OutboxStatus,
    /// 已尝试发送次数
    count: u32,
    /// 延迟投递：在此时间之前不得投递
    start_deliver_time: Option<DateTime<Utc>>,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl OutboxRecord {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn event_key(&self) -> &str {
        self.envelope.key()
    }

    pub fn event_type(&self) -> &str {
        self.envelope.event_type()
    }

    pub fn envelope(&self) -> &EventEnvelope<Value> {
        &self.envelope
    }

    pub fn status(&self) -> OutboxStatus {
        self.status
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn start_deliver_time(&self) -> Option<DateTime<Utc>> {
        self.start_deliver_time
    }

    pub fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }

    pub fn update_time(&self) -> DateTime<Utc> {
        self.update_time
    }

    /// 应用一次投递结果（由存储层在条件更新命中后调用）
    pub fn apply_delivery(
        &mut self,
        status: OutboxStatus,
        count: u32,
        publish_time: Option<DateTime<Utc>>,
        update_time: DateTime<Utc>,
    ) {
        self.status = status;
        self.count = count;
        if let Some(at) = publish_time {
            self.envelope.set_publish_time(at);
        }
        self.update_time = update_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_never_transition() {
        use OutboxStatus::*;
        assert!(WaitSend.can_transition_to(SendSuccess));
        assert!(WaitSend.can_transition_to(SendFailed));
        assert!(WaitSend.can_transition_to(WaitSend));
        for terminal in [SendSuccess, SendFailed] {
            assert!(terminal.is_terminal());
            for next in [WaitSend, SendSuccess, SendFailed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn new_record_defaults_to_wait_send() {
        let envelope = EventEnvelope::builder()
            .key("evt-1")
            .event_type("OrderPaid")
            .payload(serde_json::json!({"order": 1}))
            .build();
        let record = NewOutboxRecord::builder()
            .envelope(envelope)
            .build()
            .into_record(7, Utc::now());

        assert_eq!(record.id(), 7);
        assert_eq!(record.status(), OutboxStatus::WaitSend);
        assert_eq!(record.count(), 0);
        assert_eq!(record.event_key(), "evt-1");
        assert_eq!(record.create_time(), record.update_time());
    }
}
