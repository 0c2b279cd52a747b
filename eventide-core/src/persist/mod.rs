//! 持久化（persist）
//!
//! 消费进度的持久化模型与存储协议：
//! - 单个消费者的检查点（`Checkpoint`）及其推进、过期与快照/恢复规则；
//! - 整体写入的检查点日志（`Journal`），含本地文件与内存两种实现。
//!
mod checkpoint;
mod journal;
mod journal_inmemory;

pub use checkpoint::{
    Advance, BacklogPolicy, Checkpoint, DEFAULT_BACKLOG_TTL, DEFAULT_MAX_BACKLOG_SPAN,
};
pub use journal::{FileJournal, Journal, JournalRecord};
pub use journal_inmemory::InMemoryJournal;
