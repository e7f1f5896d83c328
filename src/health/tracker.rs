//! 健康状态跟踪器
//!
//! 维护单个目标的连续成功/失败计数，并按滞回阈值计算健康状态。
//! 每个目标只有一个写入者：处理该目标最新探测结果的任务。

use crate::config::Thresholds;
use crate::health::result::{HealthState, ProbeOutcome, ProbeResult, TransitionEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 目标健康状态跟踪器
#[derive(Debug, Clone)]
pub struct HealthTracker {
    target: String,
    thresholds: Thresholds,
    state: Option<HealthState>,
    consecutive_failures: u32,
    consecutive_successes: u32,
    total_checks: u64,
    last_check: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_transition: Option<DateTime<Utc>>,
    last_outcome: Option<ProbeOutcome>,
    last_message: Option<String>,
    last_latency_ms: Option<u64>,
}

/// 跟踪器状态快照，用于状态接口
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// 目标名称
    pub target: String,
    /// 当前健康状态，尚未分类时为空
    pub state: Option<HealthState>,
    /// 连续失败次数
    pub consecutive_failures: u32,
    /// 连续成功次数
    pub consecutive_successes: u32,
    /// 总检测次数
    pub total_checks: u64,
    /// 最后检测时间
    pub last_check: Option<DateTime<Utc>>,
    /// 最后成功时间
    pub last_success: Option<DateTime<Utc>>,
    /// 最后状态迁移时间
    pub last_transition: Option<DateTime<Utc>>,
    /// 最后一次探测结果
    pub last_outcome: Option<ProbeOutcome>,
    /// 最后一次诊断信息
    pub last_message: Option<String>,
    /// 最后一次探测耗时（毫秒）
    pub last_latency_ms: Option<u64>,
}

impl HealthTracker {
    /// 创建新的跟踪器，计数从零开始
    pub fn new(target: impl Into<String>, thresholds: Thresholds) -> Self {
        Self {
            target: target.into(),
            thresholds,
            state: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_checks: 0,
            last_check: None,
            last_success: None,
            last_transition: None,
            last_outcome: None,
            last_message: None,
            last_latency_ms: None,
        }
    }

    /// 目标名称
    pub fn target(&self) -> &str {
        &self.target
    }

    /// 当前健康状态
    pub fn state(&self) -> Option<HealthState> {
        self.state
    }

    /// 连续失败次数
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// 连续成功次数
    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    /// 记录一次探测结果
    ///
    /// # 参数
    /// * `result` - 探测结果
    ///
    /// # 返回
    /// * `Option<TransitionEvent>` - 状态发生变化时返回迁移事件
    pub fn record(&mut self, result: &ProbeResult) -> Option<TransitionEvent> {
        if result.outcome.is_success() {
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);
            self.consecutive_failures = 0;
            self.last_success = Some(result.timestamp);
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.consecutive_successes = 0;
        }

        self.total_checks += 1;
        self.last_check = Some(result.timestamp);
        self.last_outcome = Some(result.outcome);
        self.last_message = result.message.clone();
        self.last_latency_ms = Some(result.latency_ms());

        let candidate = self.next_state();
        if candidate == self.state {
            return None;
        }

        let previous = self.state;
        self.state = candidate;
        let current = candidate?;

        // 首次分类为健康时不产生事件
        if previous.is_none() && current == HealthState::Healthy {
            return None;
        }

        self.last_transition = Some(result.timestamp);
        Some(TransitionEvent::new(previous, current, result.clone()))
    }

    fn next_state(&self) -> Option<HealthState> {
        let t = &self.thresholds;
        let failures = self.consecutive_failures;
        let successes = self.consecutive_successes;

        let next = match self.state {
            None => {
                if failures >= t.hard_failure {
                    HealthState::Failed
                } else if failures >= t.soft_failure {
                    HealthState::Degraded
                } else {
                    HealthState::Healthy
                }
            }
            Some(HealthState::Healthy) => {
                if failures >= t.soft_failure {
                    HealthState::Degraded
                } else {
                    HealthState::Healthy
                }
            }
            Some(HealthState::Degraded) => {
                if failures >= t.hard_failure {
                    HealthState::Failed
                } else if successes >= t.recovery {
                    HealthState::Healthy
                } else {
                    HealthState::Degraded
                }
            }
            Some(HealthState::Failed) => {
                if successes >= t.recovery {
                    HealthState::Healthy
                } else {
                    HealthState::Failed
                }
            }
        };

        Some(next)
    }

    /// 获取当前快照
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            target: self.target.clone(),
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            total_checks: self.total_checks,
            last_check: self.last_check,
            last_success: self.last_success,
            last_transition: self.last_transition,
            last_outcome: self.last_outcome,
            last_message: self.last_message.clone(),
            last_latency_ms: self.last_latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> HealthTracker {
        HealthTracker::new("api", Thresholds::new(3, 5, 2))
    }

    fn fail() -> ProbeResult {
        ProbeResult::failure("api", "connection refused")
    }

    fn ok() -> ProbeResult {
        ProbeResult::success("api")
    }

    #[test]
    fn test_initial_success_is_silent() {
        let mut tracker = tracker();
        assert!(tracker.record(&ok()).is_none());
        assert_eq!(tracker.state(), Some(HealthState::Healthy));
    }

    #[test]
    fn test_initial_failure_below_soft_classifies_healthy() {
        let mut tracker = tracker();
        assert!(tracker.record(&fail()).is_none());
        assert_eq!(tracker.state(), Some(HealthState::Healthy));
        assert_eq!(tracker.consecutive_failures(), 1);
    }

    #[test]
    fn test_initial_classification_can_be_failed() {
        let mut tracker = HealthTracker::new("api", Thresholds::new(1, 1, 1));
        let event = tracker.record(&fail()).unwrap();
        assert_eq!(event.previous, None);
        assert_eq!(event.current, HealthState::Failed);
    }

    #[test]
    fn test_counters_reset_on_opposite_outcome() {
        let mut tracker = tracker();
        tracker.record(&fail());
        tracker.record(&fail());
        tracker.record(&ok());
        assert_eq!(tracker.consecutive_failures(), 0);
        assert_eq!(tracker.consecutive_successes(), 1);

        tracker.record(&fail());
        assert_eq!(tracker.consecutive_failures(), 1);
        assert_eq!(tracker.consecutive_successes(), 0);
    }

    #[test]
    fn test_degraded_recovers_without_failing() {
        let mut tracker = tracker();
        tracker.record(&ok());
        for _ in 0..3 {
            tracker.record(&fail());
        }
        assert_eq!(tracker.state(), Some(HealthState::Degraded));

        assert!(tracker.record(&ok()).is_none());
        let event = tracker.record(&ok()).unwrap();
        assert_eq!(event.previous, Some(HealthState::Degraded));
        assert_eq!(event.current, HealthState::Healthy);
    }

    #[test]
    fn test_error_and_timeout_count_as_failures() {
        let mut tracker = tracker();
        tracker.record(&ok());
        tracker.record(&ProbeResult::error("api", "bad pid file"));
        tracker.record(&ProbeResult::timeout("api", "探测超时"));
        let event = tracker
            .record(&ProbeResult::error("api", "bad pid file"))
            .unwrap();

        assert_eq!(event.current, HealthState::Degraded);
        assert_eq!(event.trigger.message.as_deref(), Some("bad pid file"));
        assert_eq!(event.trigger.outcome, ProbeOutcome::Error);
    }

    #[test]
    fn test_snapshot_tracks_timestamps() {
        let mut tracker = tracker();
        tracker.record(&ok());
        let snapshot = tracker.snapshot();

        assert_eq!(snapshot.total_checks, 1);
        assert!(snapshot.last_check.is_some());
        assert!(snapshot.last_success.is_some());
        assert!(snapshot.last_transition.is_none());
        assert_eq!(snapshot.last_outcome, Some(ProbeOutcome::Success));
    }
}
