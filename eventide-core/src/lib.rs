//! 有序事件日志的检查点消费引擎（eventide-core）
//!
//! 以“至少一次”语义持续拉取一个按 ID 单调递增的远端事件日志，
//! 并将每个事件扇出给一组相互独立的消费者：
//! - 事件模型（`event`）；
//! - 过滤、消费者与引擎（`eventing`）；
//! - 检查点与检查点日志（`persist`）；
//! - 配置（`config`）、错误（`error`）与日志初始化（`logging`）。
//!
//! 典型用法：
//! 1. 为业务逻辑实现 `EventHandler`，声明名称与过滤器；
//! 2. 为远端事件日志实现 `EventSource`；
//! 3. 通过 `EventEngine::builder()` 装配事件源、检查点日志、处理器与配置；
//! 4. 调用 `start()` 在后台运行，用返回的 `EngineHandle` 关闭并等待退出。
//!
pub mod config;
pub mod error;
pub mod event;
pub mod eventing;
pub mod logging;
pub mod persist;
