//! 事件处理器（EventHandler）
//!
//! 消费者的业务能力接口：名称（即检查点日志中的身份键）、过滤器与处理逻辑。
//! 处理器通过显式传入的 `DispatchContext` 获取本次分发的上下文，而不是读取全局状态。
//!
use super::filter::EventFilter;
use crate::event::Event;
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};

/// 单次分发的上下文
#[derive(Builder, Clone, Debug)]
pub struct DispatchContext {
    #[builder(into)]
    consumer: String,
    #[builder(into)]
    session_id: Option<String>,
    #[builder(default = Utc::now())]
    dispatched_at: DateTime<Utc>,
}

impl DispatchContext {
    /// 为某个消费者构建针对指定事件的上下文
    pub fn for_event(consumer: &str, event: &Event) -> Self {
        Self::builder()
            .consumer(consumer)
            .maybe_session_id(event.session_id())
            .build()
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// 事件所属会话，可用作关联 ID（例如回写事件源时标记来源会话）
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn dispatched_at(&self) -> DateTime<Utc> {
        self.dispatched_at
    }
}

/// 事件处理器
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称：跨重启稳定且唯一，用作检查点日志的键
    fn handler_name(&self) -> &str;

    /// 关心的事件；默认接收全部事件
    fn filter(&self) -> EventFilter {
        EventFilter::all()
    }

    /// 处理事件；返回错误将使该消费者在本进程生命周期内停用
    async fn handle(&self, ctx: &DispatchContext, event: &Event) -> anyhow::Result<()>;
}
