//! 探测调度器
//!
//! 按固定节拍扫描注册表，为到期且没有在途探测的目标派发探测任务。
//! 全局信号量限制同时在途的探测数，许可不足时推迟到下一个节拍，
//! 不做无界排队。下一次检测从上一次完成时刻开始计时。

use crate::action::ActionDispatcher;
use crate::config::GlobalConfig;
use crate::health::cancel::{CancelSource, CancelToken};
use crate::health::registry::{TargetEntry, TargetRegistry};
use crate::health::result::ProbeResult;
use crate::probe::run_probe;
use crate::status::{Lifecycle, StatusManager};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// 取消信号发出后等待探测收尾的时间
const CANCEL_EPSILON: Duration = Duration::from_millis(200);

/// 调度器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// 节拍间隔
    pub tick_interval: Duration,
    /// 最大并发探测数
    pub max_concurrent: usize,
    /// 优雅关闭等待时间
    pub grace_period: Duration,
}

impl SchedulerConfig {
    /// 从全局配置构建
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            tick_interval: global.tick_interval(),
            max_concurrent: global.max_concurrent_probes,
            grace_period: global.grace_period(),
        }
    }
}

/// 调度循环退出时的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// 在途探测是否在优雅期限内全部完成
    pub drained: bool,
    /// 被强制放弃的目标
    pub abandoned: Vec<String>,
}

/// 探测调度器
pub struct ProbeScheduler {
    registry: Arc<TargetRegistry>,
    dispatcher: ActionDispatcher,
    status: Arc<StatusManager>,
    semaphore: Arc<Semaphore>,
    config: SchedulerConfig,
    cancel: CancelSource,
}

impl ProbeScheduler {
    /// 创建新的调度器
    ///
    /// # 参数
    /// * `registry` - 目标注册表
    /// * `dispatcher` - 动作分发器
    /// * `status` - 状态管理器
    /// * `config` - 调度器配置
    pub fn new(
        registry: Arc<TargetRegistry>,
        dispatcher: ActionDispatcher,
        status: Arc<StatusManager>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            status,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
            cancel: CancelSource::new(),
        }
    }

    /// 调度器配置
    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// 运行调度循环，直到收到停止信号
    ///
    /// 停止后不再派发新探测；在途探测最多等待优雅期限，
    /// 随后发出取消信号并强制放弃，放弃的探测按超时记账。
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> ShutdownReport {
        info!(
            "启动探测调度器，节拍 {:?}，并发上限 {}",
            self.config.tick_interval, self.config.max_concurrent
        );

        let mut tasks = JoinSet::new();
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::log_join_error(joined);
                }
                _ = ticker.tick() => {
                    if !self.tick(&mut tasks, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.drain(tasks).await
    }

    /// 执行一次调度节拍，返回 false 表示已收到停止信号
    async fn tick(&self, tasks: &mut JoinSet<()>, shutdown: &mut broadcast::Receiver<()>) -> bool {
        self.status.mark_tick().await;

        let now = Instant::now();
        let mut due: Vec<(Instant, Arc<TargetEntry>)> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter_map(|entry| {
                let schedule = entry.schedule_snapshot();
                (!schedule.in_flight && schedule.next_due <= now).then_some((schedule.next_due, entry))
            })
            .collect();
        // 等待最久的目标优先获得许可
        due.sort_by_key(|(next_due, _)| *next_due);

        let mut deferred = 0u64;
        for (_, entry) in due {
            if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
                return false;
            }
            if !entry.try_claim(now) {
                continue;
            }
            match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => {
                    debug!("派发探测: {} [{}]", entry.name, entry.probe.kind());
                    tasks.spawn(Self::probe_task(
                        entry,
                        permit,
                        self.registry.clone(),
                        self.dispatcher.clone(),
                        self.status.clone(),
                        self.cancel.token(),
                    ));
                }
                Err(_) => {
                    entry.release_claim();
                    deferred += 1;
                }
            }
        }

        if deferred > 0 {
            debug!("并发上限已满，{} 个到期探测推迟到下一个节拍", deferred);
            self.status.record_deferred(deferred);
        }

        true
    }

    /// 单个目标的探测任务
    async fn probe_task(
        entry: Arc<TargetEntry>,
        permit: OwnedSemaphorePermit,
        registry: Arc<TargetRegistry>,
        dispatcher: ActionDispatcher,
        status: Arc<StatusManager>,
        cancel: CancelToken,
    ) {
        let _guard = ClaimGuard(entry.clone());

        let result = run_probe(&entry.name, entry.probe.as_ref(), entry.timeout, &cancel).await;

        if !entry.take_pending_result() {
            // 已在关闭时按强制放弃记账
            debug!("丢弃已被强制放弃的探测结果: {}", entry.name);
            return;
        }

        let (event, snapshot) = {
            let mut tracker = entry.tracker.lock().await;
            let event = tracker.record(&result);
            (event, tracker.snapshot())
        };
        // 并发名额只覆盖探测本身，状态更新和分发不占用名额
        drop(permit);

        let current = registry.is_current(&entry).await;
        if current {
            status.update_target(&snapshot).await;
        }

        let Some(event) = event else {
            entry.complete(Instant::now());
            return;
        };

        // 先占用分发锁再释放在途标记，保证同一目标的分发顺序与迁移顺序一致
        let dispatch_guard = entry.dispatch_lock.clone().lock_owned().await;
        entry.complete(Instant::now());

        info!(
            "目标状态变化: {} {} → {} ({})",
            event.target,
            event.previous_label(),
            event.current.as_str(),
            event.trigger.message.as_deref().unwrap_or("-")
        );

        if cancel.is_cancelled() {
            info!("关闭期间被取消的探测只记录不分发: {}", event.target);
        } else if !current {
            debug!("目标已注销，丢弃迁移事件: {}", event.target);
        } else {
            dispatcher.dispatch(&event, &entry.actions).await;
        }

        drop(dispatch_guard);
    }

    /// 等待在途探测，超过优雅期限后取消并强制放弃
    async fn drain(&self, mut tasks: JoinSet<()>) -> ShutdownReport {
        self.status.set_lifecycle(Lifecycle::Stopping).await;

        if tasks.is_empty() {
            info!("探测调度器已停止，无在途探测");
            return ShutdownReport {
                drained: true,
                abandoned: Vec::new(),
            };
        }

        info!(
            "探测调度器停止派发，等待 {} 个在途探测（最长 {:?}）",
            tasks.len(),
            self.config.grace_period
        );

        let drained = tokio::time::timeout(self.config.grace_period, async {
            while let Some(joined) = tasks.join_next().await {
                Self::log_join_error(joined);
            }
        })
        .await
        .is_ok();

        if drained {
            info!("所有在途探测已完成");
            return ShutdownReport {
                drained: true,
                abandoned: Vec::new(),
            };
        }

        warn!("优雅期限已到，取消 {} 个在途探测", tasks.len());
        self.cancel.cancel();
        let _ = tokio::time::timeout(CANCEL_EPSILON, async {
            while let Some(joined) = tasks.join_next().await {
                Self::log_join_error(joined);
            }
        })
        .await;

        // 丢弃 JoinSet 会中止剩余任务，阻塞中的任务不再等待
        drop(tasks);

        let abandoned = self.record_abandoned().await;
        ShutdownReport {
            drained: false,
            abandoned,
        }
    }

    /// 被强制放弃的探测按超时记账，迁移只记录日志不分发
    async fn record_abandoned(&self) -> Vec<String> {
        let mut abandoned = Vec::new();

        for entry in self.registry.snapshot().await {
            if !entry.is_in_flight() {
                continue;
            }
            if !entry.take_pending_result() {
                // 结果已记账，任务在等待分发时被中止
                entry.complete(Instant::now());
                continue;
            }

            let result = ProbeResult::timeout(&entry.name, "探测在优雅期限内未完成，已强制放弃")
                .with_latency(self.config.grace_period);
            let (event, snapshot) = {
                let mut tracker = entry.tracker.lock().await;
                let event = tracker.record(&result);
                (event, tracker.snapshot())
            };
            self.status.update_target(&snapshot).await;
            entry.complete(Instant::now());

            if let Some(event) = event {
                warn!(
                    "强制放弃的探测导致状态变化（不分发）: {} {} → {}",
                    event.target,
                    event.previous_label(),
                    event.current.as_str()
                );
            }

            warn!("已强制放弃探测: {}", entry.name);
            abandoned.push(entry.name.clone());
        }

        abandoned.sort();
        abandoned
    }

    fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("探测任务异常退出: {}", e);
            }
        }
    }
}

/// 探测任务异常退出时释放在途标记，避免目标永久卡住
struct ClaimGuard(Arc<TargetEntry>);

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.complete(Instant::now());
        }
    }
}
