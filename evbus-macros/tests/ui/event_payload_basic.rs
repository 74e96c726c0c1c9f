use evbus_domain::envelope::{EventEnvelope, EventPayload};
use evbus_macros::event_payload;

#[event_payload(event_type = "order.paid")]
#[derive(PartialEq)]
#[serde(rename_all = "camelCase")]
struct OrderPaid {
    order_id: String,
    amount_cents: i64,
}

fn main() {
    assert_eq!(OrderPaid::EVENT_TYPE, "order.paid");

    let paid = OrderPaid {
        order_id: "o-1".into(),
        amount_cents: 990,
    };
    let json = serde_json::to_value(&paid).unwrap();
    assert_eq!(json["amountCents"], 990);

    let envelope = EventEnvelope::new("evt-1", paid.clone());
    assert_eq!(envelope.event_type(), "order.paid");
    assert_eq!(envelope.payload(), &paid);
}
