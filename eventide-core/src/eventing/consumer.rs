//! 消费者（Consumer）
//!
//! 每个注册的处理器对应一个消费者，独立维护：
//! - 过滤器：决定事件是否与自己相关；
//! - 检查点：按序处理到的最高 ID，以及因空洞而跳过、仍可补处理的 backlog；
//! - 活跃状态：处理器一旦失败即停用，直到进程重启。
//!
//! 对每个事件的决策顺序：不匹配 → 忽略（不调用处理器，但与成功处理一样推进检查点）；
//! 在 backlog 中 → 处理（补处理）；不大于已处理 ID → 跳过（过旧）；否则处理。
//!
use super::filter::EventFilter;
use super::handler::{DispatchContext, EventHandler};
use crate::error::ConsumerError;
use crate::event::Event;
use crate::persist::{Advance, BacklogPolicy, Checkpoint};
use chrono::{DateTime, Duration, Utc};
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// 事件准入决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Process,
    SkipTooOld,
    Ignore,
}

/// 一次分发的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// 正常处理并推进了检查点
    Processed,
    /// 补处理了 backlog 中的事件
    Recovered,
    SkippedTooOld,
    Ignored,
    /// 处理器失败，消费者已停用
    Failed,
}

pub struct Consumer {
    identity: String,
    handler: Arc<dyn EventHandler>,
    filter: EventFilter,
    checkpoint: Checkpoint,
    active: bool,
    backlog: BacklogPolicy,
}

impl Consumer {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            identity: handler.handler_name().to_string(),
            filter: handler.filter(),
            handler,
            checkpoint: Checkpoint::default(),
            active: true,
            backlog: BacklogPolicy::default(),
        }
    }

    pub fn with_backlog_ttl(mut self, ttl: Duration) -> Self {
        self.backlog.ttl = ttl;
        self
    }

    pub fn with_backlog_policy(mut self, policy: BacklogPolicy) -> Self {
        self.backlog = policy;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn last_processed_id(&self) -> Option<u64> {
        self.checkpoint.last_processed_id()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.filter.matches(event)
    }

    pub fn admit(&self, event: &Event) -> Admission {
        if !self.matches(event) {
            return Admission::Ignore;
        }
        if self.checkpoint.in_backlog(event.id()) {
            return Admission::Process;
        }
        match self.checkpoint.last_processed_id() {
            Some(last) if event.id() <= last => Admission::SkipTooOld,
            _ => Admission::Process,
        }
    }

    pub fn on_success(&mut self, id: u64) -> Advance {
        self.on_success_at(id, Utc::now())
    }

    pub fn on_success_at(&mut self, id: u64, now: DateTime<Utc>) -> Advance {
        let advance = self.checkpoint.record_success(id, now, &self.backlog);
        if let Advance::Advanced { skipped, dropped } = advance {
            if skipped > 0 {
                tracing::debug!(
                    consumer = %self.identity,
                    event_id = id,
                    skipped,
                    "event gap detected, skipped ids added to backlog"
                );
            }
            if dropped > 0 {
                tracing::warn!(
                    consumer = %self.identity,
                    event_id = id,
                    dropped,
                    max_span = self.backlog.max_span,
                    "event gap exceeds backlog span, giving up on the oldest ids"
                );
            }
        }
        advance
    }

    /// 处理器失败：停用消费者，检查点保持原样（事件既不算已处理也不进 backlog）
    pub fn on_failure(&mut self) {
        self.active = false;
    }

    pub fn next_needed_id(&mut self) -> Option<u64> {
        self.next_needed_id_at(Utc::now())
    }

    pub fn next_needed_id_at(&mut self, now: DateTime<Utc>) -> Option<u64> {
        for id in self.checkpoint.purge_expired(now) {
            tracing::warn!(
                consumer = %self.identity,
                event_id = id,
                "timeout elapsed on backlog event id, giving up on it"
            );
        }
        self.checkpoint.next_needed_id()
    }

    pub fn snapshot(&self) -> Result<Value, serde_json::Error> {
        self.checkpoint.snapshot()
    }

    pub fn restore(&mut self, state: &Value) -> Result<(), ConsumerError> {
        self.checkpoint = Checkpoint::restore(&self.identity, state)?;
        Ok(())
    }

    /// 以事件源最新 ID 作为已追平状态（冷启动，不回放历史）
    pub fn seed(&mut self, last_processed_id: u64) {
        self.checkpoint = Checkpoint::caught_up_at(last_processed_id);
    }

    /// 对单个事件执行准入判断、调用处理器并更新检查点
    pub async fn dispatch(&mut self, event: &Event) -> Dispatch {
        match self.admit(event) {
            Admission::Ignore => {
                tracing::trace!(
                    consumer = %self.identity,
                    event_type = event.event_type(),
                    "ignored event as it didn't match the filter"
                );
                self.on_success(event.id());
                return Dispatch::Ignored;
            }
            Admission::SkipTooOld => {
                tracing::debug!(
                    consumer = %self.identity,
                    event_id = event.id(),
                    last_processed_id = ?self.checkpoint.last_processed_id(),
                    "event is too old"
                );
                return Dispatch::SkippedTooOld;
            }
            Admission::Process => {}
        }

        tracing::debug!(consumer = %self.identity, event_id = event.id(), "dispatching event");
        let ctx = DispatchContext::for_event(&self.identity, event);
        let outcome = AssertUnwindSafe(self.handler.handle(&ctx, event))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => match self.on_success(event.id()) {
                Advance::Recovered => Dispatch::Recovered,
                Advance::Advanced { .. } | Advance::Stale => Dispatch::Processed,
            },
            Ok(Err(err)) => {
                tracing::error!(
                    consumer = %self.identity,
                    event_id = event.id(),
                    error = ?err,
                    "an error occurred processing an event, deactivating consumer"
                );
                self.on_failure();
                Dispatch::Failed
            }
            Err(panic) => {
                tracing::error!(
                    consumer = %self.identity,
                    event_id = event.id(),
                    panic = panic_message(panic.as_ref()),
                    "handler panicked, deactivating consumer"
                );
                self.on_failure();
                Dispatch::Failed
            }
        }
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("identity", &self.identity)
            .field("active", &self.active)
            .field("checkpoint", &self.checkpoint)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
