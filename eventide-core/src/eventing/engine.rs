//! 事件引擎（EventEngine）
//!
//! 单任务、严格顺序的拉取循环：
//! - 启动：读取检查点日志恢复各消费者；无可用日志时以事件源最新 ID 冷启动（不回放历史）；
//! - 运行：取所有活跃消费者所需的最小 ID → 拉取一批事件 → 逐事件、按注册顺序分发给各消费者
//!   → 每个事件分发完成后整体保存检查点 → 休眠 → 循环；
//! - 事件源的瞬时失败无限重试（每累计若干次进入一次冷却），致命失败终止循环；
//! - 通过 `CancellationToken` 协作式关闭，只在批次之间（或等待期间）响应，不打断分发。
//!
use super::consumer::Consumer;
use super::{EventHandler, EventSource};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, JournalError, SourceError};
use crate::event::Event;
use crate::persist::{FileJournal, Journal, JournalRecord};
use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// 引擎生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Bootstrapping,
    Running,
    Terminated,
    Faulted,
}

pub struct EventEngine {
    source: Arc<dyn EventSource>,
    journal: Arc<dyn Journal>,
    consumers: Vec<Consumer>,
    config: EngineConfig,
    state: EngineState,
    token: CancellationToken,
}

#[bon::bon]
impl EventEngine {
    /// 构建引擎；处理器名称重复属于配置错误，在进入循环前即返回
    ///
    /// 未指定 `journal` 时使用配置中的 `journal_path` 构建文件日志。
    #[builder]
    pub fn new(
        source: Arc<dyn EventSource>,
        journal: Option<Arc<dyn Journal>>,
        handlers: Vec<Arc<dyn EventHandler>>,
        #[builder(default)] config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        let policy = config.backlog_policy()?;

        let mut seen = HashSet::with_capacity(handlers.len());
        let mut consumers = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let consumer = Consumer::new(handler).with_backlog_policy(policy);
            if !seen.insert(consumer.identity().to_string()) {
                return Err(EngineError::DuplicateConsumer {
                    identity: consumer.identity().to_string(),
                });
            }
            consumers.push(consumer);
        }

        let journal = journal
            .unwrap_or_else(|| Arc::new(FileJournal::from_path(config.journal_path.clone())));

        Ok(Self {
            source,
            journal,
            consumers,
            config,
            state: EngineState::Bootstrapping,
            token: CancellationToken::new(),
        })
    }
}

impl EventEngine {
    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn consumers(&self) -> &[Consumer] {
        &self.consumers
    }

    pub fn consumer(&self, identity: &str) -> Option<&Consumer> {
        self.consumers.iter().find(|c| c.identity() == identity)
    }

    /// 用于从外部请求关闭；`start` 返回的句柄持有同一个令牌
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 当前全部消费者的检查点快照
    pub fn checkpoints(&self) -> Result<JournalRecord, JournalError> {
        let mut record = JournalRecord::new();
        for consumer in &self.consumers {
            record.insert(consumer.identity(), consumer.snapshot()?)?;
        }
        Ok(record)
    }

    /// 恢复或建立各消费者的初始检查点
    pub async fn bootstrap(&mut self) -> EngineResult<()> {
        self.state = EngineState::Bootstrapping;

        if self.consumers.is_empty() {
            tracing::warn!("no consumers registered, nothing to bootstrap");
            return Ok(());
        }

        let restored = match self.journal.load()? {
            Some(record) => self.restore_from(&record),
            None => 0,
        };
        if restored > 0 {
            tracing::info!(
                restored,
                total = self.consumers.len(),
                "restored consumer state from event journal"
            );
            return Ok(());
        }

        let source = &self.source;
        let latest = self
            .with_retry("fetch_latest_id", move || source.fetch_latest_id())
            .await?;
        tracing::info!(
            last_event_id = latest,
            "no usable event journal, starting from the latest event id of the source"
        );

        // 视为各消费者已处理到最新 ID：冷启动只处理之后的新事件
        for consumer in &mut self.consumers {
            consumer.seed(latest);
        }
        self.persist()
    }

    fn restore_from(&mut self, record: &JournalRecord) -> usize {
        let mut restored = 0;
        for consumer in &mut self.consumers {
            let Some(state) = record.get(consumer.identity()) else {
                tracing::info!(
                    consumer = consumer.identity(),
                    "no journal entry for consumer, starting without checkpoint"
                );
                continue;
            };
            match consumer.restore(state) {
                Ok(()) => restored += 1,
                Err(err) => tracing::error!(error = %err, "discarding unusable journal entry"),
            }
        }

        for identity in record.identities() {
            if self.consumer(identity).is_none() {
                tracing::info!(
                    consumer = identity,
                    "journal entry belongs to an unregistered consumer and will be dropped"
                );
            }
        }
        restored
    }

    /// 活跃消费者所需的最小事件 ID
    fn next_fetch_id(&mut self) -> Option<u64> {
        let now = Utc::now();
        self.consumers
            .iter_mut()
            .filter(|c| c.is_active())
            .filter_map(|c| c.next_needed_id_at(now))
            .min()
    }

    /// 执行一次拉取与分发（不休眠），返回拉取到的事件数
    pub async fn poll_once(&mut self) -> EngineResult<usize> {
        let Some(fetch_from) = self.next_fetch_id() else {
            tracing::debug!("no active consumer needs events, skipping fetch");
            return Ok(0);
        };

        let source = &self.source;
        let after_id = fetch_from.saturating_sub(1);
        let mut events = self
            .with_retry("fetch_events_since", move || {
                source.fetch_events_since(after_id)
            })
            .await?;
        events.sort_by_key(Event::id);

        if !events.is_empty() {
            tracing::debug!(
                count = events.len(),
                after_id,
                "fetched events from the source"
            );
        }

        for event in &events {
            self.dispatch(event).await;
            self.persist()?;
        }
        Ok(events.len())
    }

    async fn dispatch(&mut self, event: &Event) {
        for consumer in &mut self.consumers {
            if !consumer.is_active() {
                tracing::trace!(consumer = consumer.identity(), "skipping inactive consumer");
                continue;
            }
            let span = tracing::debug_span!(
                "consumer",
                name = %consumer.identity(),
                event_id = event.id()
            );
            consumer.dispatch(event).instrument(span).await;
        }
    }

    /// 整体写入检查点；普通写入/编码失败只记录（内存状态仍然权威，下次保存会重试）
    fn persist(&self) -> EngineResult<()> {
        let saved = self.checkpoints().and_then(|record| {
            if record.is_empty() {
                tracing::warn!("no consumer state to save");
            }
            self.journal.save(&record)
        });

        match saved {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                tracing::error!(error = %err, "cannot write event journal, keeping state in memory");
                Ok(())
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut retry = ConnectionRetry::new(&self.config);
        loop {
            if self.token.is_cancelled() {
                return Err(EngineError::Interrupted);
            }

            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    if let Some(cooldown) = retry.record_failure(operation, &err) {
                        tokio::select! {
                            _ = self.token.cancelled() => return Err(EngineError::Interrupted),
                            _ = tokio::time::sleep(cooldown) => {}
                        }
                    }
                }
            }
        }
    }

    /// 主循环：启动 → 运行直至收到关闭信号；逃逸的错误以最高级别记录并终止
    pub async fn run(&mut self) -> EngineResult<()> {
        match self.run_loop().await {
            Ok(()) | Err(EngineError::Interrupted) => {
                self.state = EngineState::Terminated;
                tracing::info!("event processing loop shut down");
                Ok(())
            }
            Err(err) => {
                self.state = EngineState::Faulted;
                tracing::error!(error = %err, "unexpected error in main loop, terminating");
                Err(err)
            }
        }
    }

    async fn run_loop(&mut self) -> EngineResult<()> {
        self.bootstrap().await?;
        self.state = EngineState::Running;
        tracing::debug!("starting the event processing loop");

        let token = self.token.clone();
        while !token.is_cancelled() {
            self.poll_once().await?;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        Ok(())
    }

    /// 在 tokio 上启动引擎，返回可用于关闭/等待的句柄
    pub fn start(mut self) -> EngineHandle {
        let token = self.token.clone();
        let task = tokio::spawn(async move {
            let result = self.run().await;
            (self, result)
        });
        EngineHandle {
            token,
            task: Some(task),
        }
    }
}

impl std::fmt::Debug for EventEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEngine")
            .field("state", &self.state)
            .field("consumers", &self.consumers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// 连接重试计数：每次瞬时失败计数加一并告警；达到阈值时报错、清零并冷却
#[derive(Debug)]
struct ConnectionRetry {
    attempts: u32,
    limit: u32,
    cooldown: Duration,
}

impl ConnectionRetry {
    fn new(config: &EngineConfig) -> Self {
        Self {
            attempts: 0,
            limit: config.connection_retries.max(1),
            cooldown: config.retry_interval,
        }
    }

    /// 记录一次失败；需要冷却时返回冷却时长
    fn record_failure(&mut self, operation: &str, err: &SourceError) -> Option<Duration> {
        self.attempts += 1;
        let (attempt, of) = (self.attempts, self.limit);

        if self.attempts >= self.limit {
            tracing::error!(
                operation,
                attempt,
                of,
                error = %err,
                cooldown = ?self.cooldown,
                "unable to reach event source"
            );
            self.attempts = 0;
            return Some(self.cooldown);
        }

        match err {
            SourceError::Unexpected { .. } => {
                tracing::error!(operation, attempt, of, error = %err, "unable to reach event source")
            }
            _ => tracing::warn!(operation, attempt, of, error = %err, "unable to reach event source"),
        }
        None
    }
}

/// 引擎运行句柄：用于优雅关闭与等待任务结束
pub struct EngineHandle {
    token: CancellationToken,
    task: Option<JoinHandle<(EventEngine, EngineResult<()>)>>,
}

impl EngineHandle {
    /// 请求关闭；当前批次分发并保存完成后才会退出
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// 等待引擎退出，正常终止时交还引擎以便检查最终状态
    pub async fn join(mut self) -> EngineResult<EventEngine> {
        let Some(task) = self.task.take() else {
            return Err(EngineError::Task {
                reason: "engine task already joined".to_string(),
            });
        };

        match task.await {
            Ok((engine, Ok(()))) => Ok(engine),
            Ok((_, Err(err))) => Err(err),
            Err(join_err) => {
                tracing::error!(error = %join_err, "engine task aborted");
                Err(EngineError::Task {
                    reason: join_err.to_string(),
                })
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
