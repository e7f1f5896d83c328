//! 目标注册表
//!
//! 由 Supervisor 持有的显式集合，只能通过按名称访问的同步方法读写。
//! 每个条目独占自己的跟踪器和调度状态。

use crate::action::ActionSender;
use crate::config::TargetConfig;
use crate::error::ConfigError;
use crate::health::tracker::HealthTracker;
use crate::probe::Probe;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// 单次调度允许的最长间隔
pub const MAX_SCHEDULE_INTERVAL: Duration =
    Duration::from_secs(crate::config::MAX_INTERVAL_SECONDS);

/// 调度状态
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    /// 下次到期时间
    pub next_due: Instant,
    /// 是否有在途探测
    pub in_flight: bool,
    /// 在途探测的结果是否尚未记账
    pub awaiting_result: bool,
}

/// 注册表中的目标条目
pub struct TargetEntry {
    /// 目标名称
    pub name: String,
    /// 目标配置
    pub config: TargetConfig,
    /// 探测实例
    pub probe: Arc<dyn Probe>,
    /// 迁移时执行的动作
    pub actions: Vec<Arc<dyn ActionSender>>,
    /// 检测间隔
    pub interval: Duration,
    /// 探测超时
    pub timeout: Duration,
    /// 健康跟踪器，只由处理该目标探测结果的任务写入
    pub tracker: tokio::sync::Mutex<HealthTracker>,
    /// 按迁移顺序串行化同一目标的分发
    pub dispatch_lock: Arc<tokio::sync::Mutex<()>>,
    schedule: Mutex<Schedule>,
}

impl std::fmt::Debug for TargetEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetEntry")
            .field("name", &self.name)
            .field("probe", &self.probe.kind())
            .field("actions", &self.actions.len())
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TargetEntry {
    /// 创建新的条目，首次检测立即到期
    pub fn new(
        config: TargetConfig,
        probe: Arc<dyn Probe>,
        actions: Vec<Arc<dyn ActionSender>>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        let tracker = HealthTracker::new(config.name.clone(), config.thresholds);
        Self {
            name: config.name.clone(),
            config,
            probe,
            actions,
            interval,
            timeout,
            tracker: tokio::sync::Mutex::new(tracker),
            dispatch_lock: Arc::new(tokio::sync::Mutex::new(())),
            schedule: Mutex::new(Schedule {
                next_due: Instant::now(),
                in_flight: false,
                awaiting_result: false,
            }),
        }
    }

    fn schedule(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 当前调度状态
    pub fn schedule_snapshot(&self) -> Schedule {
        *self.schedule()
    }

    /// 是否有在途探测
    pub fn is_in_flight(&self) -> bool {
        self.schedule().in_flight
    }

    /// 若已到期且没有在途探测，则占用在途标记
    pub fn try_claim(&self, now: Instant) -> bool {
        let mut schedule = self.schedule();
        if schedule.in_flight || schedule.next_due > now {
            return false;
        }
        schedule.in_flight = true;
        schedule.awaiting_result = true;
        true
    }

    /// 放弃占用（例如并发上限已满）
    pub fn release_claim(&self) {
        let mut schedule = self.schedule();
        schedule.in_flight = false;
        schedule.awaiting_result = false;
    }

    /// 取走在途探测的记账权
    ///
    /// 探测任务和强制放弃流程都通过它争用同一次探测的记账，
    /// 只有返回 true 的一方写入跟踪器。
    pub fn take_pending_result(&self) -> bool {
        let mut schedule = self.schedule();
        std::mem::replace(&mut schedule.awaiting_result, false)
    }

    /// 探测完成：下次检测从本次完成时刻开始计时
    ///
    /// 间隔过大导致时间溢出时，退回到最大调度间隔
    pub fn complete(&self, completed_at: Instant) {
        let next_due = completed_at
            .checked_add(self.interval)
            .or_else(|| completed_at.checked_add(MAX_SCHEDULE_INTERVAL))
            .unwrap_or(completed_at);
        let mut schedule = self.schedule();
        schedule.next_due = next_due;
        schedule.in_flight = false;
        schedule.awaiting_result = false;
    }
}

/// 目标注册表
#[derive(Debug, Default)]
pub struct TargetRegistry {
    entries: RwLock<HashMap<String, Arc<TargetEntry>>>,
}

impl TargetRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册目标，名称重复时返回错误
    pub async fn register(&self, entry: TargetEntry) -> Result<Arc<TargetEntry>, ConfigError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.name) {
            return Err(ConfigError::DuplicateTarget(entry.name));
        }
        let entry = Arc::new(entry);
        entries.insert(entry.name.clone(), entry.clone());
        Ok(entry)
    }

    /// 注销目标
    pub async fn deregister(&self, name: &str) -> Option<Arc<TargetEntry>> {
        self.entries.write().await.remove(name)
    }

    /// 所有条目的快照
    pub async fn snapshot(&self) -> Vec<Arc<TargetEntry>> {
        self.entries.read().await.values().cloned().collect()
    }

    /// 所有目标名称（排序）
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// 条目数
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// 条目是否仍是该名称下的当前注册（注销后重新注册的条目视为不同）
    pub async fn is_current(&self, entry: &Arc<TargetEntry>) -> bool {
        self.entries
            .read()
            .await
            .get(&entry.name)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProbeSpec, Thresholds};
    use crate::error::ProbeError;
    use crate::health::cancel::CancelToken;
    use crate::probe::ProbeReport;
    use async_trait::async_trait;

    struct NoopProbe;

    #[async_trait]
    impl Probe for NoopProbe {
        fn kind(&self) -> &'static str {
            "noop"
        }

        fn describe(&self) -> String {
            "noop".to_string()
        }

        async fn check(&self, _cancel: &CancelToken) -> Result<ProbeReport, ProbeError> {
            Ok(ProbeReport::healthy())
        }
    }

    fn entry(name: &str) -> TargetEntry {
        let config = TargetConfig {
            name: name.to_string(),
            description: None,
            enabled: true,
            probe: ProbeSpec::Tcp {
                address: "127.0.0.1:1".to_string(),
            },
            interval_seconds: Some(1),
            timeout_seconds: Some(1),
            thresholds: Thresholds::default(),
            actions: vec![],
        };
        TargetEntry::new(
            config,
            Arc::new(NoopProbe),
            vec![],
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let registry = TargetRegistry::new();
        registry.register(entry("api")).await.unwrap();

        let err = registry.register(entry("api")).await.unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTarget(name) if name == "api"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_reregistered_entry_is_distinct() {
        let registry = TargetRegistry::new();
        let first = registry.register(entry("api")).await.unwrap();
        assert!(registry.is_current(&first).await);

        registry.deregister("api").await.unwrap();
        assert!(!registry.is_current(&first).await);

        let second = registry.register(entry("api")).await.unwrap();
        assert!(!registry.is_current(&first).await);
        assert!(registry.is_current(&second).await);
    }

    #[test]
    fn test_claim_and_complete() {
        let entry = entry("api");
        let now = Instant::now();

        assert!(entry.try_claim(now));
        assert!(!entry.try_claim(now));

        entry.complete(now);
        assert!(!entry.is_in_flight());
        assert!(!entry.try_claim(now));
        assert!(entry.try_claim(now + Duration::from_secs(1)));

        entry.release_claim();
        assert!(!entry.is_in_flight());
    }

    #[test]
    fn test_pending_result_is_taken_once() {
        let entry = entry("api");
        let now = Instant::now();

        assert!(entry.try_claim(now));
        assert!(entry.schedule_snapshot().awaiting_result);

        assert!(entry.take_pending_result());
        let schedule = entry.schedule_snapshot();
        assert!(schedule.in_flight);
        assert!(!schedule.awaiting_result);
        assert!(!entry.take_pending_result());

        entry.complete(now);
        assert!(!entry.is_in_flight());
    }

    #[test]
    fn test_complete_with_huge_interval_does_not_overflow() {
        let mut entry = entry("api");
        entry.interval = Duration::MAX;
        let now = Instant::now();

        assert!(entry.try_claim(now));
        entry.complete(now);

        let schedule = entry.schedule_snapshot();
        assert!(!schedule.in_flight);
        assert!(schedule.next_due > now);
        assert!(!entry.try_claim(now + Duration::from_secs(3600)));
    }
}
