//! 事件记录器（EventRecorder）
//!
//! 一个现成的消费者：把收到的每个事件以格式化 JSON 写入目录，
//! 文件名为 `<event_type>_<id>.json`，用于为测试用例采集事件样本。
//!
use anyhow::Context;
use async_trait::async_trait;
use eventide_core::event::Event;
use eventide_core::eventing::{DispatchContext, EventFilter, EventHandler};
use std::path::{Path, PathBuf};

pub const DEFAULT_NAME: &str = "event-recorder";

#[derive(Debug, Clone)]
pub struct EventRecorder {
    name: String,
    dir: PathBuf,
    dump: bool,
}

impl EventRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            dir: dir.into(),
            dump: false,
        }
    }

    /// 自定义名称（同一引擎中注册多个记录器时需要区分身份）
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 同时在 debug 级别输出完整事件
    pub fn with_dump(mut self, dump: bool) -> Self {
        self.dump = dump;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 事件对应的记录文件路径
    pub fn path_for(&self, event: &Event) -> PathBuf {
        let event_type = event.event_type().replace(['/', '\\'], "_");
        self.dir.join(format!("{}_{}.json", event_type, event.id()))
    }
}

#[async_trait]
impl EventHandler for EventRecorder {
    fn handler_name(&self) -> &str {
        &self.name
    }

    fn filter(&self) -> EventFilter {
        EventFilter::all()
    }

    async fn handle(&self, _ctx: &DispatchContext, event: &Event) -> anyhow::Result<()> {
        let path = self.path_for(event);
        let body = serde_json::to_vec_pretty(event)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("cannot create record directory {}", self.dir.display()))?;
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("cannot write event record {}", path.display()))?;

        tracing::info!(path = %path.display(), "recorded event");
        if self.dump {
            tracing::debug!(event = %String::from_utf8_lossy(&body), "event content");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_type_and_id() {
        let recorder = EventRecorder::new("/tmp/records");
        let event = Event::builder().id(42).event_type("Task_Change").build();
        assert_eq!(
            recorder.path_for(&event),
            Path::new("/tmp/records/Task_Change_42.json")
        );

        let odd = Event::builder().id(7).event_type("a/b").build();
        assert_eq!(recorder.path_for(&odd), Path::new("/tmp/records/a_b_7.json"));
    }

    #[test]
    fn name_defaults_and_overrides() {
        let recorder = EventRecorder::new("x");
        assert_eq!(recorder.handler_name(), DEFAULT_NAME);
        assert!(recorder.filter().is_all());
        assert_eq!(recorder.with_name("fixtures").handler_name(), "fixtures");
    }
}
