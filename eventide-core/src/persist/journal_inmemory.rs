//! 内存版检查点日志（InMemoryJournal）
//!
//! 满足 `Journal` 协议的轻量实现，用于测试、示例与本地开发：
//! 记录最近一次保存的内容与保存次数，可预置初始记录或模拟写入失败。

use super::journal::{Journal, JournalRecord};
use crate::error::JournalError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct InMemoryJournal {
    record: Arc<Mutex<Option<JournalRecord>>>,
    saves: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一条记录，模拟上次运行留下的日志
    pub fn seeded(record: JournalRecord) -> Self {
        let journal = Self::default();
        *journal.lock() = Some(record);
        journal
    }

    pub fn last_saved(&self) -> Option<JournalRecord> {
        self.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    /// 打开后所有写入都以 I/O 错误失败
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JournalRecord>> {
        // 内部状态仅为克隆数据，中毒后仍可安全使用
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Journal for InMemoryJournal {
    fn load(&self) -> Result<Option<JournalRecord>, JournalError> {
        Ok(self.lock().clone())
    }

    fn save(&self, record: &JournalRecord) -> Result<(), JournalError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(JournalError::Write {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::other("simulated write failure"),
            });
        }
        *self.lock() = Some(record.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
