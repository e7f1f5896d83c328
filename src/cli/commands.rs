//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑。命令返回进程退出码，
//! 配置错误以错误形式返回，由 main 映射为退出码 2。

use crate::action::{ActionDispatcher, ActionFactory, ActionOutcome};
use crate::cli::args::{Args, Commands, OutputFormat, SimulatedState};
use crate::config::{load_config, validate_config, Config, ConfigSource, GlobalConfig};
use crate::error::{ConfigError, Result};
use crate::health::{CancelToken, ProbeResult, TransitionEvent};
use crate::logging::{LogConfig, LoggingSystem};
use crate::probe::{run_probe, ProbeFactory};
use crate::status::{Liveness, StatusManager, StatusReport};
use crate::supervisor::Watchdog;
use anyhow::Context;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// 成功退出码
pub const EXIT_OK: i32 = 0;
/// 检测未通过或运行时错误
pub const EXIT_FAILURE: i32 = 1;
/// 配置错误
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令，返回进程退出码
    async fn execute(&self, args: &Args) -> Result<i32>;
}

/// 根据子命令选择处理器
pub fn command_for(command: &Commands) -> Box<dyn Command> {
    match command {
        Commands::Run => Box::new(RunCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Validate => Box::new(ValidateCommand),
        Commands::Status { .. } => Box::new(StatusCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::TestAction { .. } => Box::new(TestActionCommand),
    }
}

/// 初始化日志系统
///
/// 命令行参数优先，未指定时使用配置文件中的日志级别和格式。
///
/// # 参数
/// * `args` - 命令行参数
/// * `global` - 已加载配置的全局部分（可选）
pub fn setup_logging(args: &Args, global: Option<&GlobalConfig>) -> anyhow::Result<()> {
    let level = match (args.log_level, global) {
        (Some(level), _) => level.to_string(),
        (None, Some(global)) => global.log_level.clone(),
        (None, None) => "info".to_string(),
    };
    let json_format = args.log_json || global.is_some_and(|g| g.log_format == "json");

    let mut config = LogConfig::from_settings(&level, json_format)?
        .with_module_level("hyper", log::LevelFilter::Warn)
        .with_module_level("reqwest", log::LevelFilter::Warn);
    config.file_path = args.log_file.clone();
    LoggingSystem::setup_logging(config).context("初始化日志系统失败")
}

/// 加载配置并应用命令行覆盖
async fn load_with_overrides(args: &Args) -> Result<(Config, ConfigSource)> {
    let (mut config, source) = load_config(args.config.as_deref()).await?;
    args.run.apply(&mut config);
    validate_config(&config).map_err(ConfigError::ValidationError)?;
    Ok((config, source))
}

/// 运行命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        let (config, source) = load_with_overrides(args).await?;

        setup_logging(args, Some(&config.global))?;
        info!("{} v{} 启动，配置来源: {}", crate::APP_NAME, crate::VERSION, source);

        let watchdog = Watchdog::from_config(config).await?;
        let report = watchdog.run_until_signal().await?;

        if !report.abandoned.is_empty() {
            info!("强制放弃的探测: {}", report.abandoned.join(", "));
        }
        Ok(EXIT_OK)
    }
}

/// 一次性检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Check { target, format } = args.command() {
            self.perform_check(args, target.as_deref(), format).await
        } else {
            Ok(EXIT_OK)
        }
    }
}

impl CheckCommand {
    /// 探测目标并输出结果，任何探测未成功时返回 1
    async fn perform_check(
        &self,
        args: &Args,
        target_name: Option<&str>,
        format: OutputFormat,
    ) -> Result<i32> {
        let (config, _) = load_with_overrides(args).await?;
        let factory = ProbeFactory::new()?;

        let targets: Vec<_> = config
            .targets
            .iter()
            .filter(|t| match target_name {
                Some(name) => t.name == name,
                None => t.enabled,
            })
            .collect();

        if targets.is_empty() {
            match target_name {
                Some(name) => eprintln!("未找到名为 '{name}' 的目标"),
                None => eprintln!("未找到任何启用的目标"),
            }
            return Ok(EXIT_FAILURE);
        }

        let mut checks = Vec::with_capacity(targets.len());
        for target in targets {
            let probe = factory.build(&target.probe)?;
            let timeout = target.timeout(&config.global);
            let name = target.name.clone();
            checks.push(async move {
                run_probe(&name, probe.as_ref(), timeout, &CancelToken::never()).await
            });
        }
        let results = futures::future::join_all(checks).await;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
            OutputFormat::Text => print_check_results(&results),
        }

        let all_ok = results.iter().all(|r| r.outcome.is_success());
        Ok(if all_ok { EXIT_OK } else { EXIT_FAILURE })
    }
}

fn print_check_results(results: &[ProbeResult]) {
    for result in results {
        let icon = if result.outcome.is_success() { "✓" } else { "✗" };
        println!(
            "{} {} - {} - {}ms",
            icon,
            result.target,
            result.outcome,
            result.latency_ms()
        );
        if let Some(message) = &result.message {
            println!("  {message}");
        }
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        let (config, source) = load_config(args.config.as_deref()).await?;

        let enabled = config.targets.iter().filter(|t| t.enabled).count();
        println!("✓ 配置验证通过: {}", source);
        println!(
            "✓ 找到 {} 个目标（{} 个启用）",
            config.targets.len(),
            enabled
        );
        for target in &config.targets {
            println!(
                "  - {} [{}] 间隔 {}s 超时 {}s{}",
                target.name,
                target.probe.kind(),
                target.interval(&config.global).as_secs(),
                target.timeout(&config.global).as_secs(),
                if target.enabled { "" } else { "（已禁用）" }
            );
        }
        Ok(EXIT_OK)
    }
}

/// 状态查询命令
pub struct StatusCommand;

#[async_trait]
impl Command for StatusCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Status { url, file, format } = args.command() {
            match file {
                Some(path) => self.read_status_file(&path, format).await,
                None => self.query_status(&url, format).await,
            }
        } else {
            Ok(EXIT_OK)
        }
    }
}

impl StatusCommand {
    /// 查询运行中实例，不存活时返回 1
    async fn query_status(&self, base_url: &str, format: OutputFormat) -> Result<i32> {
        let base_url = base_url.trim_end_matches('/');
        let client = reqwest::Client::new();

        let liveness: Liveness = client
            .get(format!("{}/healthz", base_url))
            .send()
            .await
            .with_context(|| format!("无法连接状态接口: {}", base_url))?
            .json()
            .await
            .context("解析存活状态失败")?;

        let report: StatusReport = client
            .get(format!("{}/status", base_url))
            .send()
            .await
            .with_context(|| format!("无法连接状态接口: {}", base_url))?
            .json()
            .await
            .context("解析状态报告失败")?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "liveness": liveness,
                    "status": report,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => print_status(&liveness, &report),
        }

        Ok(if liveness.alive { EXIT_OK } else { EXIT_FAILURE })
    }

    /// 读取运行实例定期保存的状态文件
    async fn read_status_file(&self, path: &Path, format: OutputFormat) -> Result<i32> {
        let report = StatusManager::load_from_file(path)
            .await
            .with_context(|| format!("无法读取状态文件: {}", path.display()))?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => {
                println!("状态文件: {}", path.display());
                let liveness = Liveness {
                    alive: report.alive,
                    lifecycle: report.lifecycle,
                    last_tick: report.last_tick,
                    reason: None,
                };
                print_status(&liveness, &report);
            }
        }

        Ok(if report.alive { EXIT_OK } else { EXIT_FAILURE })
    }
}

fn print_status(liveness: &Liveness, report: &StatusReport) {
    let alive = if liveness.alive { "✅ 存活" } else { "❌ 不存活" };
    println!("{} ({})", alive, liveness.lifecycle);
    if let Some(reason) = &liveness.reason {
        println!("  原因: {reason}");
    }
    println!("{}", report.summary());
    println!();

    println!(
        "{:<24} {:<8} {:<8} {:<8} {:<10} {:<30}",
        "目标", "类型", "状态", "连续失败", "耗时", "最后信息"
    );
    println!("{}", "-".repeat(92));
    for target in &report.targets {
        let state = target
            .state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "未知".to_string());
        let latency = target
            .last_latency_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "{:<24} {:<8} {:<8} {:<8} {:<10} {:<30}",
            target.name,
            target.probe,
            state,
            target.consecutive_failures,
            latency,
            target.last_message.as_deref().unwrap_or("")
        );
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Init { path, force } = args.command() {
            self.create_config_file(&path, force).await
        } else {
            Ok(EXIT_OK)
        }
    }
}

impl InitCommand {
    /// 示例配置
    pub fn sample_config() -> &'static str {
        include_str!("../../watchdog.example.toml")
    }

    /// 写入示例配置，文件已存在且未指定 --force 时返回 1
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<i32> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(EXIT_FAILURE);
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, Self::sample_config()).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加您的监控目标");
        Ok(EXIT_OK)
    }
}

/// 动作测试命令
pub struct TestActionCommand;

#[async_trait]
impl Command for TestActionCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::TestAction { target, state } = args.command() {
            self.test_action(args, &target, state).await
        } else {
            Ok(EXIT_OK)
        }
    }
}

impl TestActionCommand {
    /// 构造模拟事件并通过目标的动作分发，任何动作失败时返回 1
    async fn test_action(&self, args: &Args, target_name: &str, state: SimulatedState) -> Result<i32> {
        let (config, _) = load_with_overrides(args).await?;
        let Some(target) = config.targets.iter().find(|t| t.name == target_name) else {
            eprintln!("未找到名为 '{target_name}' 的目标");
            return Ok(EXIT_FAILURE);
        };

        let action_configs = if target.actions.is_empty() {
            &config.global.default_actions
        } else {
            &target.actions
        };
        let actions = ActionFactory::new()?.build_all(action_configs)?;

        let event = simulated_event(target_name, state);
        let status = Arc::new(StatusManager::new(config.global.tick_interval()));
        let outcome = ActionDispatcher::new(status).dispatch(&event, &actions).await;

        print_action_outcome(&outcome);
        Ok(if outcome.all_succeeded() { EXIT_OK } else { EXIT_FAILURE })
    }
}

/// 构造模拟的迁移事件
pub fn simulated_event(target: &str, state: SimulatedState) -> TransitionEvent {
    let (previous, current) = state.transition();
    let trigger = if current.needs_alert() {
        ProbeResult::failure(target, "手动触发的测试事件")
    } else {
        ProbeResult::success(target).with_message("手动触发的测试事件")
    };
    TransitionEvent::new(Some(previous), current, trigger)
}

fn print_action_outcome(outcome: &ActionOutcome) {
    println!("测试事件 {} → {}", outcome.event_id, outcome.target);
    for result in &outcome.results {
        match &result.error {
            None => println!("✓ {} ({}ms)", result.kind, result.duration_ms),
            Some(error) => println!("✗ {} ({}ms): {}", result.kind, result.duration_ms, error),
        }
    }
    if outcome.results.is_empty() {
        println!("目标没有配置任何动作");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLoader, TomlConfigLoader};
    use crate::health::HealthState;
    use clap::Parser;

    #[tokio::test]
    async fn test_sample_config_is_valid() {
        let loader = TomlConfigLoader::default();
        let config = loader
            .load_from_string(InitCommand::sample_config())
            .await
            .unwrap();
        assert!(!config.targets.is_empty());
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("watchdog.toml");
        let path_arg = path.to_string_lossy().to_string();

        let args = Args::try_parse_from(["watchdog", "init", path_arg.as_str()]).unwrap();
        assert_eq!(InitCommand.execute(&args).await.unwrap(), EXIT_OK);
        assert!(path.exists());

        assert_eq!(InitCommand.execute(&args).await.unwrap(), EXIT_FAILURE);

        let args =
            Args::try_parse_from(["watchdog", "init", path_arg.as_str(), "--force"]).unwrap();
        assert_eq!(InitCommand.execute(&args).await.unwrap(), EXIT_OK);
    }

    #[tokio::test]
    async fn test_status_reads_saved_file() {
        use crate::status::Lifecycle;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let path_arg = path.to_string_lossy().to_string();
        let args =
            Args::try_parse_from(["watchdog", "status", "--file", path_arg.as_str()]).unwrap();

        let manager = StatusManager::new(Duration::from_secs(1));
        manager.save_to_file(&path).await.unwrap();
        assert_eq!(StatusCommand.execute(&args).await.unwrap(), EXIT_OK);

        manager.set_lifecycle(Lifecycle::Stopped).await;
        manager.save_to_file(&path).await.unwrap();
        assert_eq!(StatusCommand.execute(&args).await.unwrap(), EXIT_FAILURE);

        std::fs::remove_file(&path).unwrap();
        assert!(StatusCommand.execute(&args).await.is_err());
    }

    #[tokio::test]
    async fn test_validate_reports_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        std::fs::write(&path, "[global]\n").unwrap();
        let path_arg = path.to_string_lossy().to_string();

        let args =
            Args::try_parse_from(["watchdog", "--config", path_arg.as_str(), "validate"]).unwrap();
        let err = ValidateCommand.execute(&args).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_simulated_event() {
        let event = simulated_event("api", SimulatedState::Failed);
        assert_eq!(event.previous, Some(HealthState::Degraded));
        assert_eq!(event.current, HealthState::Failed);
        assert!(!event.trigger.outcome.is_success());

        let event = simulated_event("api", SimulatedState::Healthy);
        assert!(event.is_recovery());
        assert!(event.trigger.outcome.is_success());
    }
}
