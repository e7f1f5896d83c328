//! 日志系统模块
//!
//! 提供结构化日志配置和初始化。`log` 记录通过 LogTracer 桥接到 tracing，
//! JSON 模式下所有记录（包括状态迁移）都是机器可读的。

use log::LevelFilter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer};

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 当前配置
    current_config: Option<LogConfig>,
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径（可选，设置后不输出到控制台）
    pub file_path: Option<PathBuf>,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// 根据级别字符串和格式创建配置
    ///
    /// # 参数
    /// * `level` - 日志级别（debug/info/warn/error）
    /// * `json_format` - 是否输出JSON
    pub fn from_settings(level: &str, json_format: bool) -> anyhow::Result<Self> {
        let level = LevelFilter::from_str(level)
            .map_err(|_| anyhow::anyhow!("无效的日志级别: {}", level))?;
        Ok(Self {
            level,
            json_format,
            ..Default::default()
        })
    }

    /// 设置模块级别
    pub fn with_module_level(mut self, module: impl Into<String>, level: LevelFilter) -> Self {
        self.module_levels.insert(module.into(), level);
        self
    }
}

/// 日志系统管理器
pub struct LoggingSystem;

impl LoggingSystem {
    /// 初始化日志系统，重复调用时保留第一次的配置
    ///
    /// # 参数
    /// * `config` - 日志配置
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<()> {
        let state_mutex =
            GLOBAL_LOGGING_STATE.get_or_init(|| Mutex::new(GlobalLoggingState::default()));
        let mut state = state_mutex.lock().unwrap_or_else(PoisonError::into_inner);

        if state.initialized {
            tracing::debug!("日志系统已经初始化过了");
            return Ok(());
        }

        Self::init_log_tracer()?;
        Self::init_tracing_subscriber(&config)?;

        state.initialized = true;
        state.current_config = Some(config);
        Ok(())
    }

    /// 初始化 LogTracer（log crate 到 tracing 的桥接）
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        let result = LOG_TRACER_INIT.get_or_init(|| LogTracer::init().map_err(|e| e.to_string()));

        result
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    /// 初始化 tracing subscriber
    fn init_tracing_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let mut env_filter = EnvFilter::from_default_env().add_directive(
            Self::level_to_string(config.level)
                .parse()
                .map_err(|e| anyhow::anyhow!("无效的日志级别指令: {}", e))?,
        );

        for (module, level) in &config.module_levels {
            let directive = format!("{}={}", module, Self::level_to_string(*level))
                .parse()
                .map_err(|e| anyhow::anyhow!("无效的模块日志指令 {}: {}", module, e))?;
            env_filter = env_filter.add_directive(directive);
        }

        let fmt_layer = match &config.file_path {
            Some(file_path) => {
                let file = std::fs::File::create(file_path)
                    .map_err(|e| anyhow::anyhow!("创建日志文件失败: {}", e))?;
                let layer = fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_timer(fmt::time::ChronoUtc::rfc_3339());
                if config.json_format {
                    layer.json().boxed()
                } else {
                    layer.boxed()
                }
            }
            None if config.json_format => fmt::layer()
                .json()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_target(true)
                .boxed(),
            None => fmt::layer()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_target(true)
                .boxed(),
        };

        match registry().with(env_filter).with(fmt_layer).try_init() {
            Ok(()) => {
                tracing::info!("日志系统初始化完成");
                tracing::debug!("日志配置: {:?}", config);
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("a global default trace dispatcher has already been set") {
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("tracing subscriber初始化失败: {}", error_msg))
                }
            }
        }
    }

    /// 将 log::LevelFilter 转换为字符串
    fn level_to_string(level: LevelFilter) -> &'static str {
        match level {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        }
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        GLOBAL_LOGGING_STATE
            .get()
            .map(|state| state.lock().unwrap_or_else(PoisonError::into_inner).initialized)
            .unwrap_or(false)
    }

    /// 获取当前日志配置（如果已初始化）
    pub fn current_config() -> Option<LogConfig> {
        GLOBAL_LOGGING_STATE.get().and_then(|state| {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .current_config
                .clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_from_settings() {
        let config = LogConfig::from_settings("debug", true).unwrap();
        assert_eq!(config.level, LevelFilter::Debug);
        assert!(config.json_format);

        assert!(LogConfig::from_settings("loud", false).is_err());
    }

    #[test]
    fn test_module_levels() {
        let config = LogConfig::default().with_module_level("hyper", LevelFilter::Warn);
        assert_eq!(config.module_levels.get("hyper"), Some(&LevelFilter::Warn));
    }

    #[test]
    fn test_setup_logging_is_idempotent() {
        let config = LogConfig::default().with_module_level("reqwest", LevelFilter::Warn);
        assert!(LoggingSystem::setup_logging(config.clone()).is_ok());
        assert!(LoggingSystem::setup_logging(config).is_ok());
        assert!(LoggingSystem::is_initialized());
        assert!(LoggingSystem::current_config().is_some());
    }
}
