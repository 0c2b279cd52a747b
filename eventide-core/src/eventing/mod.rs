//! 事件子系统（eventing）
//!
//! 提供事件拉取与分发的基础抽象与运行时：
//! - `EventSource`：远端事件日志协议（拉取最新 ID / 拉取某 ID 之后的事件）；
//! - `EventHandler`：对事件进行消费处理，声明名称与过滤器；
//! - `EventFilter`：事件类型 → 属性列表的过滤规则；
//! - `Consumer`：包装处理器，维护检查点、backlog 与活跃状态；
//! - `EventEngine`：编排启动、拉取、顺序分发、持久化与重试。
//!
//! 该模块仅定义协议与引擎，不绑定具体传输实现。
//!
pub mod consumer;
pub mod engine;
pub mod filter;
pub mod handler;
pub mod source;
pub mod source_inmemory;

pub use consumer::{Admission, Consumer, Dispatch};
pub use engine::{EngineHandle, EngineState, EventEngine};
pub use filter::{AttributeFilter, EventFilter, WILDCARD};
pub use handler::{DispatchContext, EventHandler};
pub use source::EventSource;
pub use source_inmemory::InMemoryEventSource;
