//! 事件信封（Event Envelope）
//!
//! 定义在线路上传输的事件单元 `EventEnvelope`、载荷需要实现的 `EventPayload`
//! （注册期类型标签），以及在发布/投递/消费之间显式传递的 `TraceContext`。

mod event_envelope;
mod event_payload;
mod trace_context;

pub use event_envelope::EventEnvelope;
pub use event_payload::EventPayload;
pub use trace_context::TraceContext;
