//! 检查点日志（Journal）
//!
//! 以“消费者身份 → 检查点”的整体映射持久化消费进度：
//! - 每次都写入完整映射，从不增量更新；
//! - 读取时区分“不存在/损坏”（视为无日志）与“无法读取”（致命）；
//! - 写入采用临时文件 + rename，尽量保证进程崩溃时不留下半截文件。
//!
use crate::error::JournalError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// 检查点日志记录：身份 → 检查点快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalRecord {
    checkpoints: BTreeMap<String, Value>,
}

impl JournalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个消费者的快照；身份重复视为致命错误（存在覆盖他人进度的风险）
    pub fn insert(&mut self, identity: impl Into<String>, state: Value) -> Result<(), JournalError> {
        let identity = identity.into();
        if self.checkpoints.contains_key(&identity) {
            return Err(JournalError::DuplicateIdentity { identity });
        }
        self.checkpoints.insert(identity, state);
        Ok(())
    }

    pub fn get(&self, identity: &str) -> Option<&Value> {
        self.checkpoints.get(identity)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.checkpoints.keys().map(String::as_str)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, JournalError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, JournalError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// 检查点日志存储
pub trait Journal: Send + Sync {
    /// 读取日志；`Ok(None)` 表示无可用日志（未配置、不存在或已损坏）
    fn load(&self) -> Result<Option<JournalRecord>, JournalError>;

    /// 整体覆盖写入
    fn save(&self, record: &JournalRecord) -> Result<(), JournalError>;
}

/// 基于本地文件的检查点日志
#[derive(Debug, Clone, Default)]
pub struct FileJournal {
    path: Option<PathBuf>,
}

impl FileJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// 不落盘：`save` 为空操作，`load` 永远返回无日志
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn from_path(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Journal for FileJournal {
    fn load(&self) -> Result<Option<JournalRecord>, JournalError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(None);
        };

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(JournalError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        match JournalRecord::from_bytes(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "event journal is corrupt, ignoring it");
                Ok(None)
            }
        }
    }

    fn save(&self, record: &JournalRecord) -> Result<(), JournalError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let bytes = record.to_bytes()?;
        write_atomic(path, &bytes).map_err(|source| JournalError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let tmp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("journal"),
        nanos
    ));

    if let Err(e) = std::fs::write(&tmp_path, bytes) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{BacklogPolicy, Checkpoint};
    use chrono::Utc;

    fn sample_record() -> JournalRecord {
        let mut busy = Checkpoint::caught_up_at(10);
        busy.record_success(14, Utc::now(), &BacklogPolicy::default());

        let mut record = JournalRecord::new();
        record
            .insert("recorder", Checkpoint::caught_up_at(3).snapshot().unwrap())
            .unwrap();
        record.insert("flipper", busy.snapshot().unwrap()).unwrap();
        record
    }

    #[test]
    fn missing_file_is_no_journal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::new(dir.path().join("absent.json"));
        assert!(journal.load().unwrap().is_none());
    }

    #[test]
    fn disabled_journal_is_noop() {
        let journal = FileJournal::disabled();
        journal.save(&sample_record()).unwrap();
        assert!(journal.load().unwrap().is_none());
        assert!(journal.path().is_none());
    }

    #[test]
    fn save_then_load_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.json");
        let journal = FileJournal::new(&path);

        let record = sample_record();
        journal.save(&record).unwrap();
        let first = std::fs::read(&path).unwrap();

        let loaded = journal.load().unwrap().unwrap();
        assert_eq!(loaded, record);
        journal.save(&loaded).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);

        let cp = Checkpoint::restore("flipper", loaded.get("flipper").unwrap()).unwrap();
        assert_eq!(cp.last_processed_id(), Some(14));
        assert_eq!(cp.backlog().len(), 3);
    }

    #[test]
    fn corrupt_file_is_no_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.json");
        std::fs::write(&path, b"\x80\x04not json at all").unwrap();
        assert!(FileJournal::new(&path).load().unwrap().is_none());
    }

    #[test]
    fn valid_empty_journal_is_distinguished_from_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.json");
        std::fs::write(&path, b"{}").unwrap();
        let loaded = FileJournal::new(&path).load().unwrap();
        assert!(loaded.is_some_and(|r| r.is_empty()));
    }

    #[test]
    fn unwritable_destination_reports_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("journal.json");
        let err = FileJournal::new(&path).save(&sample_record()).unwrap_err();
        assert!(matches!(err, JournalError::Write { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut record = JournalRecord::new();
        record.insert("a", serde_json::json!(null)).unwrap();
        let err = record.insert("a", serde_json::json!(null)).unwrap_err();
        assert!(matches!(err, JournalError::DuplicateIdentity { .. }));
        assert!(err.is_fatal());
    }
}
