use proc_macro::TokenStream;

mod derive_utils;
mod payload;

/// 事件载荷宏
/// - 自动派生 `Debug, Clone, serde::Serialize, serde::Deserialize`（与已有派生去重合并）
/// - 自动实现 `::evbus_domain::envelope::EventPayload`，即载荷在注册时携带的事件类型标签
/// - 支持参数：`#[event_payload(event_type = "OrderPaid")]`，缺省为类型名
#[proc_macro_attribute]
pub fn event_payload(attr: TokenStream, item: TokenStream) -> TokenStream {
    payload::expand_event_payload(attr, item)
}

/// 命令宏
/// - 派生与 `#[event_payload]` 相同，事件类型即命令名称
/// - 额外实现 `::evbus_application::command::Command`
/// - 支持参数：`#[command(name = "CloseOrder")]`，缺省为类型名
#[proc_macro_attribute]
pub fn command(attr: TokenStream, item: TokenStream) -> TokenStream {
    payload::expand_command(attr, item)
}
