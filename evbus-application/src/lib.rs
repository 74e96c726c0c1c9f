//! 命令层（evbus-application）
//!
//! 以事件总线为载体异步执行业务命令：
//! - `OutboxCommandBus` 在业务事务内写入命令事件，`ImmediateCommandBus` 直接发送；
//! - `CommandSubscriber` 把 `CommandHandler` 适配为集群消费的订阅者；
//! - `AppContext` 显式贯穿每一次调用。
//!
pub mod command;
pub mod command_bus;
pub mod command_handler;
pub mod command_subscriber;
pub mod context;
pub mod error;

pub use command_bus::{CommandBus, ImmediateCommandBus, OutboxCommandBus};
pub use command_subscriber::CommandSubscriber;
