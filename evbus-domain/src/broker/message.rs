use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// 待发送到 Broker 的消息
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct OutboundMessage {
    #[builder(into)]
    topic: String,
    #[builder(into)]
    tag: String,
    #[builder(into)]
    key: String,
    body: Vec<u8>,
    /// 延迟投递时间，`None` 表示立即投递
    deliver_at: Option<DateTime<Utc>>,
}

impl OutboundMessage {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn deliver_at(&self) -> Option<DateTime<Utc>> {
        self.deliver_at
    }
}

/// 发送回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub msg_id: String,
    pub topic: String,
}

/// 从 Broker 收到的消息
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub msg_id: String,
    pub topic: String,
    pub tag: String,
    pub key: String,
    pub body: Vec<u8>,
    /// 已重投次数，首次投递为 0
    pub reconsume_times: u32,
}

/// 消费结果回执
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeAck {
    Commit,
    RetryLater,
}

/// 消费模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsumeMode {
    /// 集群消费：同一消费组内每条消息只投递给一个实例
    Clustering,
    /// 广播消费：每个订阅实例都会收到每条消息
    Broadcasting,
}

/// 事务回查结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionResolution {
    Commit,
    Rollback,
    Unknown,
}

/// tag 过滤表达式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    All,
    Tags(Vec<String>),
}

impl TagFilter {
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            TagFilter::All => true,
            TagFilter::Tags(tags) => tags.iter().any(|t| t == tag),
        }
    }

    /// 形如 `a || b || c` 的订阅表达式
    pub fn expression(&self) -> String {
        match self {
            TagFilter::All => "*".to_string(),
            TagFilter::Tags(tags) => tags.join(" || "),
        }
    }
}

/// 订阅参数
#[derive(Debug, Clone, Builder)]
pub struct Subscription {
    #[builder(into)]
    pub topic: String,
    pub filter: TagFilter,
    #[builder(into)]
    pub group_id: String,
    pub mode: ConsumeMode,
}

/// 一次投递：消息 + 回执通道
///
/// 未调用 `ack` 即被丢弃的投递按 `RetryLater` 处理。
#[derive(Debug)]
pub struct Delivery {
    message: InboundMessage,
    ack: Option<oneshot::Sender<ConsumeAck>>,
}

impl Delivery {
    pub fn new(message: InboundMessage, ack: oneshot::Sender<ConsumeAck>) -> Self {
        Self {
            message,
            ack: Some(ack),
        }
    }

    pub fn message(&self) -> &InboundMessage {
        &self.message
    }

    pub fn ack(mut self, ack: ConsumeAck) {
        if let Some(tx) = self.ack.take() {
            // Broker 侧已放弃等待时回执无处可送
            let _ = tx.send(ack);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_filter_matching() {
        let filter = TagFilter::Tags(vec!["p_OrderPaid".into(), "p_OrderShipped".into()]);
        assert!(filter.matches("p_OrderPaid"));
        assert!(!filter.matches("p_OrderCancelled"));
        assert!(TagFilter::All.matches("anything"));
        assert_eq!(filter.expression(), "p_OrderPaid || p_OrderShipped");
    }

    #[tokio::test]
    async fn dropped_delivery_reads_as_closed_channel() {
        let (tx, rx) = oneshot::channel();
        let delivery = Delivery::new(
            InboundMessage {
                msg_id: "m".into(),
                topic: "t".into(),
                tag: "x".into(),
                key: "k".into(),
                body: vec![],
                reconsume_times: 0,
            },
            tx,
        );
        drop(delivery);
        assert!(rx.await.is_err());
    }
}
