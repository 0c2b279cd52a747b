//! 内存版事件源（InMemoryEventSource）
//!
//! 满足 `EventSource` 协议的参考实现，典型用途：测试环境、示例与本地开发。
//! - `append`/`extend`：追加事件（调用方负责 ID 递增，允许空洞）；
//! - `fail_next`：为接下来的调用排队注入失败；
//! - `fetch_history`：记录每次 `fetch_events_since` 的 `after_id`，便于断言。
//!
//! 可选的 `batch_limit` 模拟服务端分页：每次最多返回若干条。

use crate::error::SourceError;
use crate::event::Event;
use crate::eventing::EventSource;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct State {
    events: Vec<Event>,
    failures: VecDeque<SourceError>,
    fetches: Vec<u64>,
    batch_limit: Option<usize>,
}

#[derive(Clone, Default)]
pub struct InMemoryEventSource {
    state: Arc<Mutex<State>>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_limit(self, limit: usize) -> Self {
        self.lock().batch_limit = Some(limit);
        self
    }

    pub fn append(&self, event: Event) {
        self.lock().events.push(event);
    }

    pub fn extend(&self, events: impl IntoIterator<Item = Event>) {
        self.lock().events.extend(events);
    }

    /// 下一次调用（任一操作）返回给定错误；可多次调用排队
    pub fn fail_next(&self, error: SourceError) {
        self.lock().failures.push_back(error);
    }

    /// 历次 `fetch_events_since` 的参数
    pub fn fetch_history(&self) -> Vec<u64> {
        self.lock().fetches.clone()
    }

    pub fn latest_id(&self) -> Option<u64> {
        self.lock().events.iter().map(Event::id).max()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn fetch_latest_id(&self) -> Result<u64, SourceError> {
        let mut state = self.lock();
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        Ok(state.events.iter().map(Event::id).max().unwrap_or(0))
    }

    async fn fetch_events_since(&self, after_id: u64) -> Result<Vec<Event>, SourceError> {
        let mut state = self.lock();
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        state.fetches.push(after_id);

        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| e.id() > after_id)
            .cloned()
            .collect();
        events.sort_by_key(Event::id);
        if let Some(limit) = state.batch_limit {
            events.truncate(limit);
        }
        Ok(events)
    }
}
