use evbus_domain::envelope::EventPayload;
use evbus_macros::event_payload;

#[event_payload(event_type = "ShipmentChanged")]
enum ShipmentChanged {
    Dispatched { carrier: String },
    Delivered { signed_by: Option<String> },
}

fn main() {
    assert_eq!(ShipmentChanged::EVENT_TYPE, "ShipmentChanged");
    let value = ShipmentChanged::Dispatched {
        carrier: "acme".into(),
    };
    let text = serde_json::to_string(&value).unwrap();
    let back: ShipmentChanged = serde_json::from_str(&text).unwrap();
    assert!(matches!(back, ShipmentChanged::Dispatched { .. }));
    let _ = ShipmentChanged::Delivered { signed_by: None };
}
