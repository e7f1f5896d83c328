//! Watchdog 监督者
//!
//! 负责组件装配和生命周期管理：按配置注册目标，启动状态接口、
//! 周期性状态汇报和探测调度器，收到停止信号后有序关闭。

use crate::action::{ActionDispatcher, ActionFactory};
use crate::config::{validate_config, validate_target, Config, TargetConfig};
use crate::error::{ConfigError, Result, WatchdogError};
use crate::health::{
    ProbeScheduler, SchedulerConfig, ShutdownReport, TargetEntry, TargetRegistry,
};
use crate::probe::{Probe, ProbeFactory};
use crate::signal_handler::setup_signal_handlers;
use crate::status::{Lifecycle, Liveness, StatusManager, StatusReport, TargetInfo};
use crate::web::StatusServer;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Watchdog 实例
pub struct Watchdog {
    config: Config,
    registry: Arc<TargetRegistry>,
    status: Arc<StatusManager>,
    dispatcher: ActionDispatcher,
    probes: ProbeFactory,
    actions: ActionFactory,
    shutdown_tx: broadcast::Sender<()>,
    /// 调度器使用的关闭接收器，创建时即订阅，run 之前发出的停止信号也不会丢失
    shutdown_rx: Mutex<Option<broadcast::Receiver<()>>>,
}

impl Watchdog {
    /// 根据配置创建实例并注册所有启用的目标
    ///
    /// # 参数
    /// * `config` - 已加载的配置
    ///
    /// # 返回
    /// * `Result<Self>` - 任何目标无法注册时返回配置错误
    pub async fn from_config(config: Config) -> Result<Self> {
        validate_config(&config).map_err(ConfigError::ValidationError)?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let status = Arc::new(StatusManager::new(config.global.tick_interval()));

        let watchdog = Self {
            registry: Arc::new(TargetRegistry::new()),
            dispatcher: ActionDispatcher::new(status.clone()),
            status,
            probes: ProbeFactory::new()?,
            actions: ActionFactory::new()?,
            shutdown_tx,
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
            config,
        };

        for target in watchdog.config.targets.clone() {
            if !target.enabled {
                info!("目标已禁用，跳过: {}", target.name);
                continue;
            }
            watchdog.register(target).await?;
        }

        info!("已注册 {} 个监控目标", watchdog.registry.len().await);
        Ok(watchdog)
    }

    /// 当前配置
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 注册目标，按配置构建探测
    pub async fn register(&self, target: TargetConfig) -> Result<()> {
        validate_target(&target).map_err(ConfigError::ValidationError)?;

        if self.config.global.resolve_targets_on_start {
            self.probes.resolve(&target.name, &target.probe).await?;
        }

        let probe = self.probes.build(&target.probe)?;
        self.register_with_probe(target, probe).await
    }

    /// 使用给定的探测实例注册目标
    ///
    /// 目标没有配置动作时使用全局默认动作。重新注册同名目标前必须先注销，
    /// 新条目的计数器从零开始。
    pub async fn register_with_probe(
        &self,
        target: TargetConfig,
        probe: Arc<dyn Probe>,
    ) -> Result<()> {
        let action_configs = if target.actions.is_empty() {
            &self.config.global.default_actions
        } else {
            &target.actions
        };
        let actions = self.actions.build_all(action_configs)?;

        let interval = target.interval(&self.config.global);
        let timeout = target.timeout(&self.config.global);
        let info = TargetInfo {
            name: target.name.clone(),
            description: target.description.clone(),
            probe: probe.kind().to_string(),
            endpoint: probe.describe(),
            interval,
            timeout,
        };

        let entry = TargetEntry::new(target, probe, actions, interval, timeout);
        let entry = self.registry.register(entry).await?;
        self.status.add_target(info).await;

        debug!("目标已注册: {:?}", entry);
        Ok(())
    }

    /// 注销目标，返回目标是否存在
    ///
    /// 在途探测会继续完成，但其结果不再更新状态或触发动作。
    pub async fn deregister(&self, name: &str) -> bool {
        let removed = self.registry.deregister(name).await.is_some();
        if removed {
            self.status.remove_target(name).await;
            info!("目标已注销: {}", name);
        }
        removed
    }

    /// 运行调度循环，直到收到停止信号
    ///
    /// 只能调用一次。状态接口无法监听时返回配置错误。
    pub async fn run(&self) -> Result<ShutdownReport> {
        let shutdown_rx = self
            .shutdown_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| WatchdogError::Other(anyhow::anyhow!("watchdog 已经运行过")))?;

        let web_handle = self.start_status_server().await?;
        let reporter_handle = self.start_reporter();

        let scheduler = ProbeScheduler::new(
            self.registry.clone(),
            self.dispatcher.clone(),
            self.status.clone(),
            SchedulerConfig::from_global(&self.config.global),
        );

        self.status.set_lifecycle(Lifecycle::Running).await;
        info!("{} v{} 已启动", crate::APP_NAME, crate::VERSION);

        let report = scheduler.run(shutdown_rx).await;

        // 调度器可能因关闭通道断开而退出，确保后台任务也收到信号
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = web_handle {
            if let Err(e) = handle.await {
                error!("状态接口停止时出错: {}", e);
            }
        }
        if let Err(e) = reporter_handle.await {
            error!("状态汇报任务停止时出错: {}", e);
        }

        self.status.set_lifecycle(Lifecycle::Stopped).await;
        self.save_status_file().await;

        if report.drained {
            info!("watchdog 已停止");
        } else {
            warn!("watchdog 已停止，强制放弃的探测: {:?}", report.abandoned);
        }
        Ok(report)
    }

    /// 安装 SIGINT/SIGTERM 处理后运行
    pub async fn run_until_signal(&self) -> Result<ShutdownReport> {
        let listener = setup_signal_handlers(self.shutdown_tx.clone())?;
        let report = self.run().await;
        listener.close();
        report
    }

    /// 发出停止信号
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            debug!("没有正在监听的关闭接收器");
        }
    }

    /// 存活查询
    pub async fn liveness(&self) -> Liveness {
        self.status.liveness().await
    }

    /// 完整状态报告
    pub async fn status_report(&self) -> StatusReport {
        self.status.report().await
    }

    /// 状态管理器
    pub fn status_manager(&self) -> Arc<StatusManager> {
        self.status.clone()
    }

    /// 目标注册表
    pub fn registry(&self) -> Arc<TargetRegistry> {
        self.registry.clone()
    }

    /// 启动状态接口（如果启用）
    async fn start_status_server(&self) -> Result<Option<JoinHandle<()>>> {
        let status_config = &self.config.global.status;
        if !status_config.enabled {
            debug!("状态接口已禁用");
            return Ok(None);
        }

        let server = StatusServer::new(status_config.clone(), self.status.clone());
        let listener = server.bind().await?;
        let shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            if let Err(e) = server.serve(listener, shutdown_rx).await {
                error!("状态接口运行失败: {}", e);
            }
        });
        Ok(Some(handle))
    }

    /// 启动周期性状态汇报：写状态文件并输出摘要日志
    fn start_reporter(&self) -> JoinHandle<()> {
        let status = self.status.clone();
        let status_file = self.config.global.status.status_file.clone();
        let period = Duration::from_secs(self.config.global.status.report_interval_seconds.max(1));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let report = status.report().await;
                        info!("{}", report.summary());
                        if let Some(path) = &status_file {
                            if let Err(e) = status.save_to_file(path).await {
                                warn!("保存状态文件失败: {:#}", e);
                            }
                        }
                    }
                }
            }
        })
    }

    async fn save_status_file(&self) {
        if let Some(path) = &self.config.global.status.status_file {
            if let Err(e) = self.status.save_to_file(path).await {
                warn!("保存状态文件失败: {:#}", e);
            }
        }
    }
}
