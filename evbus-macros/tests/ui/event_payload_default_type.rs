use evbus_domain::envelope::EventPayload;
use evbus_macros::event_payload;

#[event_payload]
#[derive(Debug, Clone)]
struct StockReserved {
    sku: String,
    quantity: u32,
}

fn main() {
    assert_eq!(StockReserved::EVENT_TYPE, "StockReserved");
    let copy = StockReserved {
        sku: "sku-1".into(),
        quantity: 2,
    }
    .clone();
    let _ = format!("{copy:?}");
}
