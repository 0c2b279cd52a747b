//! 消费者检查点（Checkpoint）
//!
//! 记录消费者按序处理到的最高事件 ID，以及发现空洞时被跳过、仍待补处理的 ID（backlog）。
//! backlog 中每个 ID 带有过期时间，过期后视为永久跳过。
//!
use crate::error::ConsumerError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// backlog 条目的默认存活时间
pub const DEFAULT_BACKLOG_TTL: Duration = Duration::minutes(5);
/// 单个空洞默认最多记录的 ID 数
pub const DEFAULT_MAX_BACKLOG_SPAN: u64 = 10_000;

/// backlog 规则：条目存活时间，以及一次空洞最多记录多少个 ID（超出部分直接放弃，只保留最靠近新事件的部分）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogPolicy {
    pub ttl: Duration,
    pub max_span: u64,
}

impl Default for BacklogPolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_BACKLOG_TTL,
            max_span: DEFAULT_MAX_BACKLOG_SPAN,
        }
    }
}

/// 一次成功处理对检查点的影响
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// 补处理了 backlog 中的 ID，`last_processed_id` 不变
    Recovered,
    /// 推进了 `last_processed_id`；`skipped` 为新加入 backlog 的 ID 数，`dropped` 为超出上限被放弃的 ID 数
    Advanced { skipped: u64, dropped: u64 },
    /// 不大于 `last_processed_id` 且不在 backlog 中，检查点不变
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    last_processed_id: Option<u64>,
    backlog: BTreeMap<u64, DateTime<Utc>>,
}

impl Checkpoint {
    /// 以给定 ID 作为“已追平”的初始状态（冷启动时使用事件源的最新 ID）
    pub fn caught_up_at(last_processed_id: u64) -> Self {
        Self {
            last_processed_id: Some(last_processed_id),
            backlog: BTreeMap::new(),
        }
    }

    pub fn last_processed_id(&self) -> Option<u64> {
        self.last_processed_id
    }

    pub fn backlog(&self) -> &BTreeMap<u64, DateTime<Utc>> {
        &self.backlog
    }

    pub fn in_backlog(&self, id: u64) -> bool {
        self.backlog.contains_key(&id)
    }

    pub fn record_success(
        &mut self,
        id: u64,
        now: DateTime<Utc>,
        policy: &BacklogPolicy,
    ) -> Advance {
        if self.backlog.remove(&id).is_some() {
            return Advance::Recovered;
        }

        let (mut skipped, mut dropped) = (0, 0);
        if let Some(last) = self.last_processed_id {
            if id <= last {
                return Advance::Stale;
            }
            let gap = id - last - 1;
            if gap > 0 {
                skipped = gap.min(policy.max_span);
                dropped = gap - skipped;
                let expires_at = now + policy.ttl;
                for missing in (id - skipped)..id {
                    self.backlog.insert(missing, expires_at);
                }
            }
        }
        self.last_processed_id = Some(id);
        Advance::Advanced { skipped, dropped }
    }

    /// 移除已过期的 backlog 条目，返回被移除的 ID
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> Vec<u64> {
        let expired: Vec<u64> = self
            .backlog
            .iter()
            .filter(|(_, expires_at)| **expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.backlog.remove(id);
        }
        expired
    }

    /// 下一个需要拉取的 ID（不做过期清理）
    pub fn next_needed_id(&self) -> Option<u64> {
        let frontier = self.last_processed_id.and_then(|last| last.checked_add(1));
        let oldest_pending = self.backlog.keys().next().copied();
        match (frontier, oldest_pending) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn snapshot(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// 从持久化形态恢复；形状不符或违反不变量时返回数据错误
    pub fn restore(consumer: &str, state: &Value) -> Result<Self, ConsumerError> {
        let invalid = |reason: String| ConsumerError::InvalidState {
            consumer: consumer.to_string(),
            reason,
        };

        let checkpoint = Self::deserialize(state).map_err(|e| invalid(e.to_string()))?;

        match (checkpoint.last_processed_id, checkpoint.backlog.keys().next_back()) {
            (None, Some(_)) => Err(invalid(
                "backlog present without last_processed_id".to_string(),
            )),
            (Some(last), Some(&newest)) if newest >= last => Err(invalid(format!(
                "backlog id {newest} is not below last_processed_id {last}"
            ))),
            _ => Ok(checkpoint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> BacklogPolicy {
        BacklogPolicy::default()
    }

    #[test]
    fn contiguous_run_advances_without_backlog() {
        let now = Utc::now();
        let mut cp = Checkpoint::caught_up_at(10);
        for id in 11..=15 {
            assert_eq!(
                cp.record_success(id, now, &ttl()),
                Advance::Advanced { skipped: 0, dropped: 0 }
            );
        }
        assert_eq!(cp.last_processed_id(), Some(15));
        assert!(cp.backlog().is_empty());
        assert_eq!(cp.next_needed_id(), Some(16));
    }

    #[test]
    fn gap_fills_backlog_with_future_expiry() {
        let now = Utc::now();
        let mut cp = Checkpoint::caught_up_at(100);
        assert_eq!(
            cp.record_success(105, now, &ttl()),
            Advance::Advanced { skipped: 4, dropped: 0 }
        );
        assert_eq!(cp.last_processed_id(), Some(105));
        assert_eq!(
            cp.backlog().keys().copied().collect::<Vec<_>>(),
            vec![101, 102, 103, 104]
        );
        assert!(cp.backlog().values().all(|exp| *exp > now));
        assert_eq!(cp.next_needed_id(), Some(101));
    }

    #[test]
    fn first_success_without_checkpoint_has_no_gap() {
        let mut cp = Checkpoint::default();
        assert_eq!(cp.next_needed_id(), None);
        cp.record_success(50, Utc::now(), &ttl());
        assert_eq!(cp.last_processed_id(), Some(50));
        assert!(cp.backlog().is_empty());
    }

    #[test]
    fn recovery_keeps_frontier() {
        let now = Utc::now();
        let mut cp = Checkpoint::caught_up_at(1);
        cp.record_success(4, now, &ttl());
        assert_eq!(cp.record_success(2, now, &ttl()), Advance::Recovered);
        assert_eq!(cp.last_processed_id(), Some(4));
        assert_eq!(cp.backlog().keys().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn ids_at_or_below_frontier_do_not_move_it_back() {
        let now = Utc::now();
        let mut cp = Checkpoint::caught_up_at(10);
        assert_eq!(cp.record_success(10, now, &ttl()), Advance::Stale);
        assert_eq!(cp.record_success(3, now, &ttl()), Advance::Stale);
        assert_eq!(cp.last_processed_id(), Some(10));
        assert!(cp.backlog().is_empty());
    }

    #[test]
    fn oversized_gap_keeps_only_the_newest_ids() {
        let now = Utc::now();
        let policy = BacklogPolicy {
            max_span: 3,
            ..Default::default()
        };
        let mut cp = Checkpoint::caught_up_at(0);
        assert_eq!(
            cp.record_success(1_000_000_000, now, &policy),
            Advance::Advanced {
                skipped: 3,
                dropped: 999_999_996
            }
        );
        assert_eq!(
            cp.backlog().keys().copied().collect::<Vec<_>>(),
            vec![999_999_997, 999_999_998, 999_999_999]
        );

        let none = BacklogPolicy {
            max_span: 0,
            ..Default::default()
        };
        let mut cp = Checkpoint::caught_up_at(0);
        cp.record_success(5, now, &none);
        assert!(cp.backlog().is_empty());
        assert_eq!(cp.next_needed_id(), Some(6));
    }

    #[test]
    fn frontier_at_max_id_does_not_overflow() {
        let now = Utc::now();
        let cp = Checkpoint::caught_up_at(u64::MAX);
        assert_eq!(cp.next_needed_id(), None);

        let mut cp = Checkpoint::caught_up_at(u64::MAX - 3);
        cp.record_success(u64::MAX, now, &ttl());
        assert_eq!(cp.record_success(u64::MAX, now, &ttl()), Advance::Stale);
        assert_eq!(cp.next_needed_id(), Some(u64::MAX - 2));
    }

    #[test]
    fn purge_drops_only_elapsed_entries() {
        let now = Utc::now();
        let mut cp = Checkpoint::caught_up_at(0);
        cp.record_success(3, now, &ttl());
        let expired = cp.purge_expired(now + Duration::minutes(6));
        assert_eq!(expired, vec![1, 2]);
        assert!(cp.backlog().is_empty());
        assert_eq!(cp.next_needed_id(), Some(4));
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let mut cp = Checkpoint::caught_up_at(7);
        cp.record_success(10, Utc::now(), &ttl());
        let snap = cp.snapshot().unwrap();
        let back = Checkpoint::restore("c", &snap).unwrap();
        assert_eq!(back, cp);
    }

    #[test]
    fn restore_rejects_foreign_shapes() {
        let bad = [
            serde_json::json!(42),
            serde_json::json!("checkpoint"),
            serde_json::json!({"last_processed_id": "x", "backlog": {}}),
            serde_json::json!({"last_processed_id": 3}),
            serde_json::json!({"last_processed_id": 3, "backlog": {}, "extra": true}),
            serde_json::json!({"last_processed_id": null, "backlog": {"1": "2030-01-01T00:00:00Z"}}),
            serde_json::json!({"last_processed_id": 3, "backlog": {"5": "2030-01-01T00:00:00Z"}}),
        ];
        for state in bad {
            let err = Checkpoint::restore("c", &state).unwrap_err();
            assert!(matches!(err, ConsumerError::InvalidState { .. }), "{state}");
        }
    }
}
