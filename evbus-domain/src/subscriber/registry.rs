use super::handler::{Erased, ErasedSubscriber, EventSubscriber};
use crate::broker::{ConsumeMode, TagFilter};
use crate::routing::TagRouter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// 订阅者注册表
///
/// 启动时按事件类型分组，组内保持注册顺序。一个注册表对应一种消费模型。
#[derive(Clone)]
pub struct SubscriberRegistry {
    mode: ConsumeMode,
    by_type: HashMap<String, Vec<Arc<dyn ErasedSubscriber>>>,
    /// 事件类型的首次注册顺序，用于生成稳定的订阅表达式
    event_types: Vec<String>,
}

impl SubscriberRegistry {
    pub fn new(mode: ConsumeMode) -> Self {
        Self {
            mode,
            by_type: HashMap::new(),
            event_types: Vec::new(),
        }
    }

    pub fn mode(&self) -> ConsumeMode {
        self.mode
    }

    pub fn register<S>(&mut self, subscriber: Arc<S>) -> &mut Self
    where
        S: EventSubscriber,
    {
        let erased: Arc<dyn ErasedSubscriber> = Arc::new(Erased::new(subscriber));

        for event_type in erased.event_types() {
            if !self.by_type.contains_key(&event_type) {
                self.event_types.push(event_type.clone());
            }
            let list = self.by_type.entry(event_type.clone()).or_default();

            // 同一事件类型的订阅者应当使用同一载荷类型，否则运行时会按类型不一致失败
            if let Some(first) = list.first() {
                if first.payload_type() != erased.payload_type() {
                    warn!(
                        event_type = %event_type,
                        subscriber = erased.name(),
                        expected = first.payload_type(),
                        found = erased.payload_type(),
                        "subscriber payload type disagrees with earlier registration"
                    );
                }
            }
            list.push(erased.clone());
        }
        self
    }

    /// 链式注册
    pub fn with<S>(mut self, subscriber: Arc<S>) -> Self
    where
        S: EventSubscriber,
    {
        self.register(subscriber);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.event_types.is_empty()
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.event_types.iter().map(String::as_str)
    }

    /// 某事件类型的订阅者名称，按注册顺序
    pub fn subscriber_names(&self, event_type: &str) -> Vec<&str> {
        self.matching(event_type).iter().map(|s| s.name()).collect()
    }

    pub(crate) fn matching(&self, event_type: &str) -> &[Arc<dyn ErasedSubscriber>] {
        self.by_type
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// 订阅的 tag 过滤条件（已映射部署前缀）
    pub fn tag_filter(&self, router: &TagRouter) -> TagFilter {
        TagFilter::Tags(self.event_types().map(|t| router.tag_for(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EventEnvelope, EventPayload};
    use crate::subscriber::ConsumeContext;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderPaid {
        order_id: String,
    }

    impl EventPayload for OrderPaid {
        const EVENT_TYPE: &'static str = "OrderPaid";
    }

    struct Named {
        name: &'static str,
        types: Vec<&'static str>,
    }

    #[async_trait]
    impl EventSubscriber for Named {
        type Payload = OrderPaid;

        fn subscriber_name(&self) -> &str {
            self.name
        }

        fn event_types(&self) -> Vec<String> {
            self.types.iter().map(|t| t.to_string()).collect()
        }

        async fn on_event(
            &self,
            _ctx: &ConsumeContext,
            _event: &EventEnvelope<OrderPaid>,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn groups_by_type_in_registration_order() {
        let registry = SubscriberRegistry::new(ConsumeMode::Clustering)
            .with(Arc::new(Named {
                name: "a",
                types: vec!["OrderPaid"],
            }))
            .with(Arc::new(Named {
                name: "b",
                types: vec!["OrderShipped", "OrderPaid"],
            }))
            .with(Arc::new(Named {
                name: "c",
                types: vec!["OrderPaid"],
            }));

        assert_eq!(registry.subscriber_names("OrderPaid"), vec!["a", "b", "c"]);
        assert_eq!(registry.subscriber_names("OrderShipped"), vec!["b"]);
        assert!(registry.subscriber_names("OrderCancelled").is_empty());
        assert_eq!(
            registry.event_types().collect::<Vec<_>>(),
            vec!["OrderPaid", "OrderShipped"]
        );
    }

    #[test]
    fn tag_filter_applies_prefix() {
        let registry = SubscriberRegistry::new(ConsumeMode::Broadcasting).with(Arc::new(Named {
            name: "a",
            types: vec!["OrderPaid", "OrderShipped"],
        }));
        let filter = registry.tag_filter(&TagRouter::new("prod_", "orders"));
        assert_eq!(filter.expression(), "prod_OrderPaid || prod_OrderShipped");
        assert_eq!(registry.mode(), ConsumeMode::Broadcasting);
    }
}
