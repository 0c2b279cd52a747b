//! 引擎配置（EngineConfig）
//!
//! 所有取值由外部提供，运行期间视为常量。时长字段使用可读格式（如 `"60s"`、`"5m"`），
//! 从 JSON 加载时缺省字段取默认值。
//!
use crate::error::ConfigError;
use crate::persist::{BacklogPolicy, DEFAULT_MAX_BACKLOG_SPAN};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// 两次拉取之间的休眠间隔
    #[serde(with = "human_duration")]
    pub poll_interval: Duration,
    /// 连续失败多少次后进入冷却
    pub connection_retries: u32,
    /// 冷却时长
    #[serde(with = "human_duration")]
    pub retry_interval: Duration,
    /// backlog 条目的存活时间
    #[serde(with = "human_duration")]
    pub backlog_ttl: Duration,
    /// 单个空洞最多记录到 backlog 的 ID 数
    pub max_backlog_span: u64,
    /// 检查点日志路径；为空则不落盘
    pub journal_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            connection_retries: 5,
            retry_interval: Duration::from_secs(60),
            backlog_ttl: Duration::from_secs(5 * 60),
            max_backlog_span: DEFAULT_MAX_BACKLOG_SPAN,
            journal_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connection-retries",
                reason: "must be at least 1".to_string(),
            });
        }
        self.backlog_ttl_delta()?;
        Ok(())
    }

    pub fn backlog_policy(&self) -> Result<BacklogPolicy, ConfigError> {
        Ok(BacklogPolicy {
            ttl: self.backlog_ttl_delta()?,
            max_span: self.max_backlog_span,
        })
    }

    /// backlog 存活时间（chrono 表示，用于计算过期时刻）
    pub fn backlog_ttl_delta(&self) -> Result<chrono::Duration, ConfigError> {
        chrono::Duration::from_std(self.backlog_ttl).map_err(|e| ConfigError::InvalidValue {
            field: "backlog-ttl",
            reason: e.to_string(),
        })
    }
}

mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.poll_interval, Duration::from_secs(60));
        assert_eq!(c.connection_retries, 5);
        assert_eq!(c.retry_interval, Duration::from_secs(60));
        assert_eq!(c.backlog_ttl, Duration::from_secs(300));
        assert_eq!(c.max_backlog_span, 10_000);
        assert!(c.journal_path.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c = EngineConfig::from_json_str(
            r#"{"poll-interval": "2s", "backlog-ttl": "10m", "max-backlog-span": 500, "journal-path": "/var/lib/eventide/journal.json"}"#,
        )
        .unwrap();
        assert_eq!(c.poll_interval, Duration::from_secs(2));
        assert_eq!(c.backlog_ttl, Duration::from_secs(600));
        assert_eq!(c.connection_retries, 5);
        assert_eq!(c.backlog_policy().unwrap().max_span, 500);
        assert_eq!(
            c.journal_path.as_deref(),
            Some(Path::new("/var/lib/eventide/journal.json"))
        );
    }

    #[test]
    fn serialized_form_loads_back() {
        let c = EngineConfig {
            poll_interval: Duration::from_millis(1500),
            ..Default::default()
        };
        let raw = serde_json::to_string(&c).unwrap();
        assert_eq!(EngineConfig::from_json_str(&raw).unwrap(), c);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"connection-retries": 0}"#),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"poll-interval": "soon"}"#),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_json_file(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
