//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::config::Config;
use crate::health::HealthState;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Watchdog - 目标监控守护进程
#[derive(Parser, Debug, Clone)]
#[command(
    name = "watchdog",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "配置文件路径",
        env = "WATCHDOG_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，未指定时使用配置文件中的 log_level
    #[arg(
        short,
        long,
        global = true,
        value_enum,
        help = "日志级别",
        env = "WATCHDOG_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 输出JSON格式日志
    #[arg(long, global = true, help = "输出JSON格式日志", env = "WATCHDOG_LOG_JSON")]
    pub log_json: bool,

    /// 日志文件路径，设置后日志写入文件而不是控制台
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "日志文件路径",
        env = "WATCHDOG_LOG_FILE"
    )]
    pub log_file: Option<PathBuf>,

    /// 运行参数覆盖
    #[command(flatten)]
    pub run: RunArgs,

    /// 子命令，默认为 run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 运行参数覆盖，优先于配置文件
#[derive(ClapArgs, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// 最大并发探测数
    #[arg(
        long,
        global = true,
        value_name = "COUNT",
        help = "最大并发探测数",
        env = "WATCHDOG_MAX_CONCURRENT"
    )]
    pub max_concurrent: Option<usize>,

    /// 优雅关闭等待时间（秒）
    #[arg(
        long,
        global = true,
        value_name = "SECONDS",
        help = "优雅关闭等待时间（秒）",
        env = "WATCHDOG_GRACE_PERIOD"
    )]
    pub grace_period: Option<u64>,

    /// 状态接口端口
    #[arg(
        long,
        global = true,
        value_name = "PORT",
        help = "状态接口端口",
        env = "WATCHDOG_STATUS_PORT"
    )]
    pub status_port: Option<u16>,
}

impl RunArgs {
    /// 把覆盖项应用到配置
    pub fn apply(&self, config: &mut Config) {
        if let Some(max_concurrent) = self.max_concurrent {
            config.global.max_concurrent_probes = max_concurrent;
        }
        if let Some(grace_period) = self.grace_period {
            config.global.grace_period_seconds = grace_period;
        }
        if let Some(port) = self.status_port {
            config.global.status.port = port;
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// 启动监控（默认命令）
    Run,

    /// 对目标执行一次性探测，不做状态跟踪
    Check {
        /// 目标名称（可选，不指定则探测所有启用的目标）
        #[arg(value_name = "TARGET", help = "目标名称")]
        target: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件
    Validate,

    /// 查询运行中实例的状态
    Status {
        /// 状态接口地址
        #[arg(
            long,
            value_name = "URL",
            default_value = "http://127.0.0.1:9090",
            help = "状态接口地址"
        )]
        url: String,

        /// 读取已保存的状态文件，而不是查询状态接口
        #[arg(long, value_name = "FILE", help = "读取已保存的状态文件")]
        file: Option<PathBuf>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 生成示例配置文件
    Init {
        /// 配置文件路径
        #[arg(value_name = "FILE", default_value = "watchdog.toml", help = "配置文件路径")]
        path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 通过目标的动作分发一条模拟的状态迁移事件
    TestAction {
        /// 目标名称
        #[arg(value_name = "TARGET", help = "目标名称")]
        target: String,

        /// 模拟迁移到的状态
        #[arg(long, value_enum, default_value = "failed", help = "模拟迁移到的状态")]
        state: SimulatedState,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

/// test-action 模拟的目标状态
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulatedState {
    Healthy,
    Degraded,
    Failed,
}

impl SimulatedState {
    /// 模拟迁移的前后状态
    pub fn transition(self) -> (HealthState, HealthState) {
        match self {
            SimulatedState::Healthy => (HealthState::Failed, HealthState::Healthy),
            SimulatedState::Degraded => (HealthState::Healthy, HealthState::Degraded),
            SimulatedState::Failed => (HealthState::Degraded, HealthState::Failed),
        }
    }
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 要执行的命令，未指定时为 run
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let args = Args::try_parse_from(["watchdog"]).unwrap();
        assert_eq!(args.command(), Commands::Run);
        assert_eq!(args.log_level, None);
    }

    #[test]
    fn test_run_overrides() {
        let args = Args::try_parse_from([
            "watchdog",
            "run",
            "--max-concurrent",
            "4",
            "--grace-period",
            "3",
            "--status-port",
            "9191",
        ])
        .unwrap();

        let mut config = Config {
            global: Default::default(),
            targets: vec![],
        };
        args.run.apply(&mut config);
        assert_eq!(config.global.max_concurrent_probes, 4);
        assert_eq!(config.global.grace_period_seconds, 3);
        assert_eq!(config.global.status.port, 9191);
    }

    #[test]
    fn test_status_from_file() {
        let args =
            Args::try_parse_from(["watchdog", "status", "--file", "/var/lib/watchdog/status.json"])
                .unwrap();
        assert_eq!(
            args.command(),
            Commands::Status {
                url: "http://127.0.0.1:9090".to_string(),
                file: Some(PathBuf::from("/var/lib/watchdog/status.json")),
                format: OutputFormat::Text,
            }
        );
    }

    #[test]
    fn test_check_and_test_action() {
        let args =
            Args::try_parse_from(["watchdog", "--log-level", "debug", "check", "api", "-f", "json"])
                .unwrap();
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert_eq!(
            args.command(),
            Commands::Check {
                target: Some("api".to_string()),
                format: OutputFormat::Json,
            }
        );

        let args = Args::try_parse_from(["watchdog", "test-action", "api", "--state", "degraded"])
            .unwrap();
        assert_eq!(
            args.command(),
            Commands::TestAction {
                target: "api".to_string(),
                state: SimulatedState::Degraded,
            }
        );
    }

    #[test]
    fn test_simulated_transitions() {
        assert_eq!(
            SimulatedState::Healthy.transition(),
            (HealthState::Failed, HealthState::Healthy)
        );
        assert_eq!(
            SimulatedState::Failed.transition(),
            (HealthState::Degraded, HealthState::Failed)
        );
    }
}
