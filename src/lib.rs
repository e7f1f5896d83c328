//! Watchdog - 权限最小化的目标监控守护进程
//!
//! 按配置周期性探测一组目标（HTTP、TCP、存活文件、进程、队列深度），
//! 把探测结果折叠为带阈值的健康状态机，并在状态迁移时执行动作：
//! - 结构化日志
//! - Webhook 通知（通用事件、钉钉、飞书）
//! - 本地命令
//!
//! 自身的存活和状态通过 HTTP 接口和状态文件提供给外部监督者。

pub mod action;
pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod probe;
pub mod signal_handler;
pub mod status;
pub mod supervisor;
pub mod web;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, TargetConfig};
pub use error::{WatchdogError, Result};
pub use health::{HealthState, HealthTracker, ProbeOutcome, ProbeResult, TransitionEvent};
pub use supervisor::Watchdog;

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
