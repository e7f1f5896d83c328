//! 运行状态管理模块
//!
//! 维护供外部监督者查询的只读状态快照：每个目标的健康状态、
//! 计数器和动作分发情况，以及 watchdog 自身的生命周期和存活信息。

use crate::action::ActionOutcome;
use crate::health::result::{HealthState, ProbeOutcome};
use crate::health::tracker::TrackerSnapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// 存活判定窗口的下限
const MIN_LIVENESS_WINDOW: Duration = Duration::from_secs(5);

/// Watchdog 生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// 加载配置、注册目标，尚未发起探测
    Starting,
    /// 调度循环运行中
    Running,
    /// 停止派发，等待在途探测
    Stopping,
    /// 已停止
    Stopped,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Starting => write!(f, "启动中"),
            Lifecycle::Running => write!(f, "运行中"),
            Lifecycle::Stopping => write!(f, "停止中"),
            Lifecycle::Stopped => write!(f, "已停止"),
        }
    }
}

/// 单个目标的运行状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStatus {
    /// 目标名称
    pub name: String,
    /// 目标描述
    pub description: Option<String>,
    /// 探测类型
    pub probe: String,
    /// 探测对象
    pub endpoint: String,
    /// 检测间隔（秒）
    pub interval_seconds: u64,
    /// 探测超时（秒）
    pub timeout_seconds: u64,
    /// 当前健康状态
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
    /// 动作分发失败次数
    pub dispatch_failures: u64,
    /// 最后一次分发错误
    pub last_dispatch_error: Option<String>,
    /// 最后一次分发时间
    pub last_dispatch: Option<DateTime<Utc>>,
}

/// 新注册目标的描述信息
#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub name: String,
    pub description: Option<String>,
    pub probe: String,
    pub endpoint: String,
    pub interval: Duration,
    pub timeout: Duration,
}

/// 通知统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationStats {
    /// 总分发事件数
    pub total_events: u64,
    /// 总动作执行次数
    pub total_sent: u64,
    /// 成功次数
    pub successful_sent: u64,
    /// 失败次数
    pub failed_sent: u64,
    /// 最后通知时间
    pub last_notification_time: Option<DateTime<Utc>>,
}

/// 存活状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liveness {
    /// 是否存活
    pub alive: bool,
    /// 当前生命周期
    pub lifecycle: Lifecycle,
    /// 最后一次调度节拍
    pub last_tick: Option<DateTime<Utc>>,
    /// 不存活的原因
    pub reason: Option<String>,
}

/// 完整状态报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// 生命周期
    pub lifecycle: Lifecycle,
    /// 是否存活
    pub alive: bool,
    /// 启动时间
    pub start_time: DateTime<Utc>,
    /// 运行时长（秒）
    pub uptime_seconds: i64,
    /// 最后一次调度节拍
    pub last_tick: Option<DateTime<Utc>>,
    /// 因并发上限被推迟的探测次数
    pub deferred_probes: u64,
    /// 目标总数
    pub total_targets: usize,
    /// 健康目标数
    pub healthy_targets: usize,
    /// 降级目标数
    pub degraded_targets: usize,
    /// 故障目标数
    pub failed_targets: usize,
    /// 尚未分类的目标数
    pub unknown_targets: usize,
    /// 通知统计
    pub notifications: NotificationStats,
    /// 目标详细状态（按名称排序）
    pub targets: Vec<TargetStatus>,
}

impl StatusReport {
    /// 一行摘要，用于周期性日志
    pub fn summary(&self) -> String {
        format!(
            "状态: {} | 目标 {} (健康 {}, 降级 {}, 故障 {}, 未知 {}) | 通知 {}/{} 失败 {} | 推迟探测 {}",
            self.lifecycle,
            self.total_targets,
            self.healthy_targets,
            self.degraded_targets,
            self.failed_targets,
            self.unknown_targets,
            self.notifications.successful_sent,
            self.notifications.total_sent,
            self.notifications.failed_sent,
            self.deferred_probes
        )
    }
}

#[derive(Debug)]
struct LifecycleState {
    lifecycle: Lifecycle,
    running_since: Option<Instant>,
    last_tick: Option<(Instant, DateTime<Utc>)>,
}

/// 状态管理器
#[derive(Debug)]
pub struct StatusManager {
    /// 目标状态映射
    targets: RwLock<HashMap<String, TargetStatus>>,
    /// 生命周期与节拍
    lifecycle: RwLock<LifecycleState>,
    /// 通知统计
    notifications: RwLock<NotificationStats>,
    /// 推迟的探测次数
    deferred_probes: AtomicU64,
    /// 启动时间
    start_time: DateTime<Utc>,
    /// 存活判定窗口
    liveness_window: Duration,
}

impl StatusManager {
    /// 创建新的状态管理器
    ///
    /// # 参数
    /// * `tick_interval` - 调度节拍间隔，存活窗口为 max(5 × 节拍, 5s)
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            lifecycle: RwLock::new(LifecycleState {
                lifecycle: Lifecycle::Starting,
                running_since: None,
                last_tick: None,
            }),
            notifications: RwLock::new(NotificationStats::default()),
            deferred_probes: AtomicU64::new(0),
            start_time: Utc::now(),
            liveness_window: (tick_interval * 5).max(MIN_LIVENESS_WINDOW),
        }
    }

    /// 添加目标（初始状态）
    pub async fn add_target(&self, info: TargetInfo) {
        let status = TargetStatus {
            name: info.name.clone(),
            description: info.description,
            probe: info.probe,
            endpoint: info.endpoint,
            interval_seconds: info.interval.as_secs(),
            timeout_seconds: info.timeout.as_secs(),
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
            dispatch_failures: 0,
            last_dispatch_error: None,
            last_dispatch: None,
        };
        self.targets.write().await.insert(info.name, status);
    }

    /// 移除目标
    pub async fn remove_target(&self, name: &str) {
        self.targets.write().await.remove(name);
    }

    /// 用跟踪器快照更新目标状态
    pub async fn update_target(&self, snapshot: &TrackerSnapshot) {
        let mut targets = self.targets.write().await;
        if let Some(status) = targets.get_mut(&snapshot.target) {
            status.state = snapshot.state;
            status.consecutive_failures = snapshot.consecutive_failures;
            status.consecutive_successes = snapshot.consecutive_successes;
            status.total_checks = snapshot.total_checks;
            status.last_check = snapshot.last_check;
            status.last_success = snapshot.last_success;
            status.last_transition = snapshot.last_transition;
            status.last_outcome = snapshot.last_outcome;
            status.last_message = snapshot.last_message.clone();
            status.last_latency_ms = snapshot.last_latency_ms;
        }
    }

    /// 记录一次动作分发结果
    pub async fn record_dispatch(&self, outcome: &ActionOutcome) {
        let failed = outcome.failed_count() as u64;
        let total = outcome.results.len() as u64;
        let now = Utc::now();

        {
            let mut stats = self.notifications.write().await;
            stats.total_events += 1;
            stats.total_sent += total;
            stats.successful_sent += total - failed;
            stats.failed_sent += failed;
            stats.last_notification_time = Some(now);
        }

        let mut targets = self.targets.write().await;
        if let Some(status) = targets.get_mut(&outcome.target) {
            status.last_dispatch = Some(now);
            if failed > 0 {
                status.dispatch_failures += failed;
                status.last_dispatch_error = outcome.first_error().map(str::to_string);
            }
        }
    }

    /// 记录推迟的探测
    pub fn record_deferred(&self, count: u64) {
        self.deferred_probes.fetch_add(count, Ordering::Relaxed);
    }

    /// 记录一次调度节拍
    pub async fn mark_tick(&self) {
        let mut state = self.lifecycle.write().await;
        state.last_tick = Some((Instant::now(), Utc::now()));
    }

    /// 设置生命周期
    pub async fn set_lifecycle(&self, lifecycle: Lifecycle) {
        let mut state = self.lifecycle.write().await;
        if lifecycle == Lifecycle::Running && state.running_since.is_none() {
            state.running_since = Some(Instant::now());
        }
        state.lifecycle = lifecycle;
    }

    /// 当前生命周期
    pub async fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.read().await.lifecycle
    }

    /// 存活查询
    pub async fn liveness(&self) -> Liveness {
        let state = self.lifecycle.read().await;
        let last_tick = state.last_tick.map(|(_, at)| at);

        let reason = match state.lifecycle {
            Lifecycle::Starting => None,
            Lifecycle::Running => {
                let reference = state
                    .last_tick
                    .map(|(instant, _)| instant)
                    .or(state.running_since);
                match reference {
                    Some(at) if at.elapsed() > self.liveness_window => Some(format!(
                        "调度循环已 {}ms 没有节拍",
                        at.elapsed().as_millis()
                    )),
                    _ => None,
                }
            }
            other => Some(format!("watchdog {}", other)),
        };

        Liveness {
            alive: reason.is_none(),
            lifecycle: state.lifecycle,
            last_tick,
            reason,
        }
    }

    /// 获取特定目标状态
    pub async fn target(&self, name: &str) -> Option<TargetStatus> {
        self.targets.read().await.get(name).cloned()
    }

    /// 获取完整状态报告
    pub async fn report(&self) -> StatusReport {
        let liveness = self.liveness().await;
        let notifications = self.notifications.read().await.clone();

        let mut targets: Vec<TargetStatus> = self.targets.read().await.values().cloned().collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));

        let count = |state: Option<HealthState>| targets.iter().filter(|t| t.state == state).count();

        StatusReport {
            lifecycle: liveness.lifecycle,
            alive: liveness.alive,
            start_time: self.start_time,
            uptime_seconds: (Utc::now() - self.start_time).num_seconds(),
            last_tick: liveness.last_tick,
            deferred_probes: self.deferred_probes.load(Ordering::Relaxed),
            total_targets: targets.len(),
            healthy_targets: count(Some(HealthState::Healthy)),
            degraded_targets: count(Some(HealthState::Degraded)),
            failed_targets: count(Some(HealthState::Failed)),
            unknown_targets: count(None),
            notifications,
            targets,
        }
    }

    /// 保存状态到文件
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let report = self.report().await;
        let json_data = serde_json::to_string_pretty(&report).context("序列化状态数据失败")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("创建状态文件目录失败")?;
        }

        // 先写临时文件再重命名，读取方不会看到写了一半的文件
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json_data)
            .await
            .context("写入状态文件失败")?;
        tokio::fs::rename(&tmp, path)
            .await
            .context("替换状态文件失败")?;
        Ok(())
    }

    /// 从文件加载状态
    pub async fn load_from_file(path: &Path) -> Result<StatusReport> {
        let json_data = tokio::fs::read_to_string(path)
            .await
            .context("读取状态文件失败")?;
        let report: StatusReport = serde_json::from_str(&json_data).context("解析状态文件失败")?;
        Ok(report)
    }
}
