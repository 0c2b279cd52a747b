//! 事件源（EventSource）协议
//!
//! 远端事件日志的请求/响应接口，具体传输由上层实现并注入：
//! - `fetch_latest_id`：仅在冷启动（无任何日志状态）时使用；
//! - `fetch_events_since`：返回 `id > after_id` 的事件，按 ID 升序，可为空。
//!
//! 失败必须归入 `SourceError` 的三类之一，不允许“静默成功”。
//!
use crate::{error::SourceError, event::Event};
use async_trait::async_trait;

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_latest_id(&self) -> Result<u64, SourceError>;

    async fn fetch_events_since(&self, after_id: u64) -> Result<Vec<Event>, SourceError>;
}
