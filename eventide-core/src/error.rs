//! 统一错误定义
//!
//! 按关注点划分：事件源、检查点日志（journal）、消费者状态、配置与引擎。
//! 引擎只在致命场景下向外传播错误；可重试/可隔离的失败在内部消化并记录日志。
//!
use std::path::PathBuf;
use thiserror::Error;

/// 事件源错误（Source Adapter 协议约定的三类失败）
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// 网络/协议层失败（超时、连接重置、响应格式错误），可重试
    #[error("transient source error: {reason}")]
    Transient { reason: String },
    /// 不可恢复的环境错误，必须终止主循环
    #[error("fatal source error: {reason}")]
    Fatal { reason: String },
    /// 未归类的失败：按可重试处理，但以更高级别记录
    #[error("unexpected source error: {reason}")]
    Unexpected { reason: String },
}

impl SourceError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    pub fn unexpected(reason: impl Into<String>) -> Self {
        Self::Unexpected {
            reason: reason.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// 检查点日志错误
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("cannot read journal at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write journal at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("journal encoding error: {source}")]
    Encode {
        #[from]
        source: serde_json::Error,
    },
    #[error("duplicate consumer identity '{identity}' in journal")]
    DuplicateIdentity { identity: String },
}

impl JournalError {
    /// 读取失败与身份冲突为致命错误；写入/编码失败仅记录，下次保存时重试
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DuplicateIdentity { .. } | Self::Read { .. })
    }
}

/// 消费者状态错误
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("invalid checkpoint state: consumer={consumer}, reason={reason}")]
    InvalidState { consumer: String, reason: String },
}

/// 配置错误
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },
    #[error("invalid config value: field={field}, reason={reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// 引擎错误：只有会让主循环终止的情况才会出现在这里
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    // --- 启动期配置 ---
    #[error("duplicate consumer identity: {identity}")]
    DuplicateConsumer { identity: String },
    #[error(transparent)]
    Config(#[from] ConfigError),

    // --- 运行期 ---
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("engine task failed: {reason}")]
    Task { reason: String },

    /// 在重试/等待期间收到终止信号
    #[error("engine interrupted by shutdown request")]
    Interrupted,
}

/// 统一 Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
