//! 路由规则
//!
//! 逻辑事件名与 Broker tag 之间的双向映射（部署前缀），以及默认 topic 的解析。
//!
use crate::config::EvbusConfig;
use crate::envelope::EventEnvelope;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct TagRouter {
    prefix: String,
    default_topic: String,
}

impl TagRouter {
    pub fn new(prefix: impl Into<String>, default_topic: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            default_topic: default_topic.into(),
        }
    }

    pub fn from_config(cfg: &EvbusConfig) -> Self {
        Self::new(cfg.tag_prefix.clone(), cfg.default_topic.clone())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    pub fn tag_for(&self, event_type: &str) -> String {
        format!("{}{}", self.prefix, event_type)
    }

    /// 剥离部署前缀得到事件名；前缀缺失时按原 tag 处理
    pub fn event_type_of<'a>(&self, tag: &'a str) -> &'a str {
        match tag.strip_prefix(self.prefix.as_str()) {
            Some(event_type) => event_type,
            None => {
                warn!(tag, prefix = %self.prefix, "tag without deployment prefix");
                tag
            }
        }
    }

    pub fn resolve_topic<'a>(&'a self, topic: &'a str) -> &'a str {
        if topic.trim().is_empty() {
            &self.default_topic
        } else {
            topic
        }
    }

    pub fn topic_for<'a, P>(&'a self, envelope: &'a EventEnvelope<P>) -> &'a str {
        self.resolve_topic(envelope.topic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trip_with_prefix() {
        let router = TagRouter::new("prod_", "orders");
        let tag = router.tag_for("OrderPaid");
        assert_eq!(tag, "prod_OrderPaid");
        assert_eq!(router.event_type_of(&tag), "OrderPaid");
    }

    #[test]
    fn foreign_tag_falls_back_to_raw() {
        let router = TagRouter::new("prod_", "orders");
        assert_eq!(router.event_type_of("OrderPaid"), "OrderPaid");
    }

    #[test]
    fn empty_topic_uses_default() {
        let router = TagRouter::new("", "orders");
        assert_eq!(router.resolve_topic(""), "orders");
        assert_eq!(router.resolve_topic("  "), "orders");
        assert_eq!(router.resolve_topic("payments"), "payments");
    }
}
