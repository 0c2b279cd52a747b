use anyhow::Context;
use async_trait::async_trait;
use eventide_core::config::EngineConfig;
use eventide_core::event::Event;
use eventide_core::eventing::{
    DispatchContext, EventEngine, EventFilter, EventHandler, InMemoryEventSource,
};
use eventide_core::logging::init_tracing;
use eventide_recorder::EventRecorder;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const CONFIG_ENV: &str = "EVENTIDE_CONFIG";
const RECORD_DIR_ENV: &str = "EVENTIDE_RECORD_DIR";

/// 任务状态变为 done 时提示父级状态应随之更新
struct StatusFlip;

#[async_trait]
impl EventHandler for StatusFlip {
    fn handler_name(&self) -> &str {
        "status-flip"
    }

    fn filter(&self) -> EventFilter {
        EventFilter::all().with_type("Task_Change", ["status"])
    }

    async fn handle(&self, ctx: &DispatchContext, event: &Event) -> anyhow::Result<()> {
        let new_status = event
            .meta()
            .get("new")
            .and_then(|v| v.as_str())
            .context("status change without a new value")?;
        if new_status == "done" {
            tracing::info!(
                event_id = event.id(),
                session = ctx.session_id().unwrap_or("-"),
                entity = ?event.entity(),
                "task finished, parent status would be flipped"
            );
        }
        Ok(())
    }
}

fn load_config() -> anyhow::Result<EngineConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => EngineConfig::from_json_file(&path)
            .with_context(|| format!("cannot load config from {}", PathBuf::from(&path).display())),
        None => Ok(EngineConfig {
            poll_interval: Duration::from_secs(2),
            ..Default::default()
        }),
    }
}

fn synthetic_event(id: u64) -> Event {
    let (event_type, attribute, meta) = if id % 3 == 0 {
        ("Shot_New", None, json!({}))
    } else {
        let new = if id % 2 == 0 { "done" } else { "wip" };
        ("Task_Change", Some("status"), json!({"old": "ready", "new": new}))
    };
    Event::builder()
        .id(id)
        .event_type(event_type)
        .maybe_attribute_name(attribute)
        .meta(meta)
        .entity(json!({"type": "Task", "id": id * 10}))
        .session_id(format!("demo-session-{}", id / 5))
        .build()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let config = load_config()?;
    tracing::info!(?config, "starting eventide demo");

    let record_dir = std::env::var_os(RECORD_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("eventide-records"));

    let source = InMemoryEventSource::new();
    source.append(synthetic_event(1));

    let engine = EventEngine::builder()
        .source(Arc::new(source.clone()))
        .handlers(vec![
            Arc::new(EventRecorder::new(record_dir).with_dump(true)),
            Arc::new(StatusFlip),
        ])
        .config(config)
        .build()?;
    let handle = engine.start();

    // 模拟远端日志持续产生新事件
    let feeder = tokio::spawn(async move {
        let mut next = source.latest_id().unwrap_or(0) + 1;
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            source.append(synthetic_event(next));
            next += 1;
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    feeder.abort();
    handle.shutdown();

    let engine = handle.join().await?;
    for consumer in engine.consumers() {
        tracing::info!(
            consumer = consumer.identity(),
            last_processed_id = ?consumer.last_processed_id(),
            active = consumer.is_active(),
            "final consumer state"
        );
    }
    Ok(())
}
