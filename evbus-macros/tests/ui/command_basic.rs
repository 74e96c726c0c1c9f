use evbus_application::command::Command;
use evbus_domain::envelope::EventPayload;
use evbus_macros::command;

#[command(name = "CloseOrder")]
struct CloseOrder {
    order_id: String,
}

#[command]
struct ReopenOrder {
    order_id: String,
}

fn main() {
    assert_eq!(<CloseOrder as Command>::NAME, "CloseOrder");
    assert_eq!(<CloseOrder as EventPayload>::EVENT_TYPE, "CloseOrder");
    assert_eq!(<ReopenOrder as Command>::NAME, "ReopenOrder");

    let cmd = CloseOrder {
        order_id: "o-1".into(),
    };
    let _ = cmd.clone().order_id;
    let _ = ReopenOrder {
        order_id: "o-2".into(),
    };
}
