//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构，包含全局配置和目标列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 监控目标列表
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 默认检测间隔（秒）
    #[serde(default = "default_interval")]
    pub default_interval_seconds: u64,
    /// 默认探测超时（秒）
    #[serde(default = "default_timeout")]
    pub default_timeout_seconds: u64,
    /// 调度器节拍间隔（毫秒）
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// 最大并发探测数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_probes: usize,
    /// 优雅关闭等待时间（秒）
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 日志格式（text 或 json）
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// 启动时是否解析目标地址
    #[serde(default = "default_resolve_targets")]
    pub resolve_targets_on_start: bool,
    /// 未配置动作的目标使用的默认动作
    #[serde(default = "default_actions")]
    pub default_actions: Vec<ActionConfig>,
    /// 状态接口配置
    #[serde(default)]
    pub status: StatusConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_interval_seconds: default_interval(),
            default_timeout_seconds: default_timeout(),
            tick_interval_ms: default_tick_interval(),
            max_concurrent_probes: default_max_concurrent(),
            grace_period_seconds: default_grace_period(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            resolve_targets_on_start: default_resolve_targets(),
            default_actions: default_actions(),
            status: StatusConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// 调度器节拍间隔
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// 优雅关闭等待时间
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}

/// 状态接口配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusConfig {
    /// 是否启用HTTP状态接口
    #[serde(default = "default_status_enabled")]
    pub enabled: bool,
    /// 绑定地址
    #[serde(default = "default_status_bind_address")]
    pub bind_address: String,
    /// 监听端口
    #[serde(default = "default_status_port")]
    pub port: u16,
    /// 状态快照文件（可选）
    pub status_file: Option<PathBuf>,
    /// 状态汇报间隔（秒）
    #[serde(default = "default_report_interval")]
    pub report_interval_seconds: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: default_status_enabled(),
            bind_address: default_status_bind_address(),
            port: default_status_port(),
            status_file: None,
            report_interval_seconds: default_report_interval(),
        }
    }
}

impl StatusConfig {
    /// 获取监听地址
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| format!("无效的状态接口地址 {}:{}: {}", self.bind_address, self.port, e))
    }
}

/// 监控目标配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// 目标名称（唯一标识）
    pub name: String,
    /// 目标描述
    pub description: Option<String>,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 探测描述
    pub probe: ProbeSpec,
    /// 目标特定的检测间隔（秒）
    pub interval_seconds: Option<u64>,
    /// 目标特定的探测超时（秒）
    pub timeout_seconds: Option<u64>,
    /// 状态迁移阈值
    #[serde(default)]
    pub thresholds: Thresholds,
    /// 状态迁移时执行的动作
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl TargetConfig {
    /// 生效的检测间隔
    pub fn interval(&self, global: &GlobalConfig) -> Duration {
        Duration::from_secs(
            self.interval_seconds
                .unwrap_or(global.default_interval_seconds),
        )
    }

    /// 生效的探测超时
    pub fn timeout(&self, global: &GlobalConfig) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(global.default_timeout_seconds))
    }
}

/// 健康状态迁移阈值
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thresholds {
    /// 连续失败达到该值时 Healthy → Degraded
    #[serde(default = "default_soft_failure")]
    pub soft_failure: u32,
    /// 连续失败达到该值时 Degraded → Failed
    #[serde(default = "default_hard_failure")]
    pub hard_failure: u32,
    /// 连续成功达到该值时恢复为 Healthy
    #[serde(default = "default_recovery")]
    pub recovery: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            soft_failure: default_soft_failure(),
            hard_failure: default_hard_failure(),
            recovery: default_recovery(),
        }
    }
}

impl Thresholds {
    /// 创建阈值
    pub fn new(soft_failure: u32, hard_failure: u32, recovery: u32) -> Self {
        Self {
            soft_failure,
            hard_failure,
            recovery,
        }
    }

    /// 校验阈值关系
    pub fn validate(&self) -> Result<(), String> {
        if self.soft_failure == 0 {
            return Err("soft_failure 不能为0".to_string());
        }
        if self.hard_failure < self.soft_failure {
            return Err(format!(
                "hard_failure ({}) 不能小于 soft_failure ({})",
                self.hard_failure, self.soft_failure
            ));
        }
        if self.recovery == 0 {
            return Err("recovery 不能为0".to_string());
        }
        Ok(())
    }
}

/// 探测描述，按 kind 区分探测类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeSpec {
    /// HTTP可达性检测
    Http(HttpProbeSpec),
    /// TCP可达性检测
    Tcp {
        /// host:port
        address: String,
    },
    /// 存活文件检测
    File {
        /// 存活文件路径
        path: PathBuf,
        /// 最大允许的文件年龄（秒）
        max_age_seconds: u64,
    },
    /// 进程存活检测（基于PID文件）
    Process {
        /// PID文件路径
        pid_file: PathBuf,
    },
    /// 队列深度检测
    Queue {
        /// 允许的最大深度
        max_depth: u64,
        /// 深度来源
        source: QueueSource,
    },
}

impl ProbeSpec {
    /// 探测类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeSpec::Http(_) => "http",
            ProbeSpec::Tcp { .. } => "tcp",
            ProbeSpec::File { .. } => "file",
            ProbeSpec::Process { .. } => "process",
            ProbeSpec::Queue { .. } => "queue",
        }
    }
}

/// HTTP探测参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpProbeSpec {
    /// 请求URL
    pub url: String,
    /// HTTP方法
    #[serde(default = "default_method")]
    pub method: String,
    /// 期望的状态码列表
    #[serde(default = "default_expected_status_codes")]
    pub expected_status_codes: Vec<u16>,
    /// 请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 请求体（用于POST/PUT请求）
    pub body: Option<serde_json::Value>,
}

/// 队列深度来源
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueSource {
    /// 从HTTP JSON接口读取深度
    Http {
        /// 接口URL
        url: String,
        /// JSON Pointer，例如 /queue/depth
        pointer: String,
    },
    /// 统计目录中的条目数
    Directory {
        /// 目录路径
        path: PathBuf,
    },
}

/// 动作配置，按 kind 区分动作类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionConfig {
    /// 写入结构化日志
    Log(LogActionConfig),
    /// POST JSON 到 webhook
    Webhook(WebhookActionConfig),
    /// 执行命令
    Exec(ExecActionConfig),
}

impl ActionConfig {
    /// 动作类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            ActionConfig::Log(_) => "log",
            ActionConfig::Webhook(_) => "webhook",
            ActionConfig::Exec(_) => "exec",
        }
    }
}

/// 日志动作配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogActionConfig {
    /// 日志级别，缺省时降级/故障用 warn，恢复用 info
    pub level: Option<String>,
    /// 自定义消息模板
    pub template: Option<String>,
}

/// Webhook 消息格式
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookFormat {
    /// 直接发送迁移事件JSON
    #[default]
    Event,
    /// 钉钉文本消息
    Dingtalk,
    /// 飞书卡片消息
    Feishu,
}

/// Webhook 动作配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookActionConfig {
    /// webhook URL
    pub url: String,
    /// 消息格式
    #[serde(default)]
    pub format: WebhookFormat,
    /// 签名密钥（可选）
    pub secret: Option<String>,
    /// 额外请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 请求超时（秒）
    #[serde(default = "default_action_timeout")]
    pub timeout_seconds: u64,
    /// 自定义消息模板
    pub template: Option<String>,
}

/// 命令动作配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecActionConfig {
    /// 可执行文件
    pub command: String,
    /// 命令参数
    #[serde(default)]
    pub args: Vec<String>,
    /// 额外环境变量
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// 执行超时（秒）
    #[serde(default = "default_exec_timeout")]
    pub timeout_seconds: u64,
}

/// 间隔、超时和期限类配置允许的最大秒数（7天）
pub const MAX_INTERVAL_SECONDS: u64 = 7 * 24 * 60 * 60;

fn check_seconds(label: &str, seconds: u64) -> Result<(), String> {
    if seconds == 0 {
        return Err(format!("{}不能为0", label));
    }
    if seconds > MAX_INTERVAL_SECONDS {
        return Err(format!(
            "{} {} 秒超过上限 {} 秒",
            label, seconds, MAX_INTERVAL_SECONDS
        ));
    }
    Ok(())
}

// 默认值函数
fn default_interval() -> u64 {
    30
}
fn default_timeout() -> u64 {
    10
}
fn default_tick_interval() -> u64 {
    250
}
fn default_max_concurrent() -> usize {
    16
}
fn default_grace_period() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_resolve_targets() -> bool {
    true
}
fn default_actions() -> Vec<ActionConfig> {
    vec![ActionConfig::Log(LogActionConfig::default())]
}
fn default_status_enabled() -> bool {
    true
}
fn default_status_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_status_port() -> u16 {
    9090
}
fn default_report_interval() -> u64 {
    30
}
fn default_enabled() -> bool {
    true
}
fn default_soft_failure() -> u32 {
    3
}
fn default_hard_failure() -> u32 {
    5
}
fn default_recovery() -> u32 {
    2
}
fn default_method() -> String {
    "GET".to_string()
}
fn default_expected_status_codes() -> Vec<u16> {
    vec![200]
}
fn default_action_timeout() -> u64 {
    10
}
fn default_exec_timeout() -> u64 {
    30
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    let global = &config.global;

    check_seconds("默认检测间隔", global.default_interval_seconds)?;
    check_seconds("默认探测超时", global.default_timeout_seconds)?;

    if global.tick_interval_ms == 0 {
        return Err("调度器节拍间隔不能为0".to_string());
    }
    if global.tick_interval_ms / 1000 > MAX_INTERVAL_SECONDS {
        return Err(format!(
            "调度器节拍间隔 {}ms 超过上限 {} 秒",
            global.tick_interval_ms, MAX_INTERVAL_SECONDS
        ));
    }

    if global.grace_period_seconds > MAX_INTERVAL_SECONDS {
        return Err(format!(
            "优雅停止期限 {} 秒超过上限 {} 秒",
            global.grace_period_seconds, MAX_INTERVAL_SECONDS
        ));
    }

    if global.max_concurrent_probes == 0 {
        return Err("最大并发探测数不能为0".to_string());
    }

    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            global.log_level, valid_log_levels
        ));
    }

    let valid_log_formats = ["text", "json"];
    if !valid_log_formats.contains(&global.log_format.as_str()) {
        return Err(format!(
            "无效的日志格式: {}，支持的格式: {:?}",
            global.log_format, valid_log_formats
        ));
    }

    if global.status.enabled {
        global.status.socket_addr()?;
    }

    for action in &global.default_actions {
        validate_action("默认动作", action)?;
    }

    if config.targets.is_empty() {
        return Err("至少需要配置一个监控目标".to_string());
    }

    let mut seen = std::collections::HashSet::new();
    for target in &config.targets {
        validate_target(target)?;
        if !seen.insert(target.name.as_str()) {
            return Err(format!("目标名称重复: {}", target.name));
        }
    }

    Ok(())
}

/// 验证单个目标配置
pub fn validate_target(target: &TargetConfig) -> Result<(), String> {
    if target.name.trim().is_empty() {
        return Err("目标名称不能为空".to_string());
    }

    if let Some(interval) = target.interval_seconds {
        check_seconds(&format!("目标 {} 的检测间隔", target.name), interval)?;
    }

    if let Some(timeout) = target.timeout_seconds {
        check_seconds(&format!("目标 {} 的探测超时", target.name), timeout)?;
    }

    target
        .thresholds
        .validate()
        .map_err(|e| format!("目标 {} 的阈值无效: {}", target.name, e))?;

    validate_probe(&target.name, &target.probe)?;

    for action in &target.actions {
        validate_action(&target.name, action)?;
    }

    Ok(())
}

fn validate_probe(name: &str, probe: &ProbeSpec) -> Result<(), String> {
    match probe {
        ProbeSpec::Http(http) => {
            validate_http_url(name, &http.url)?;

            if http.expected_status_codes.is_empty() {
                return Err(format!("目标 {} 必须指定期望的状态码", name));
            }
            for &code in &http.expected_status_codes {
                if !(100..=599).contains(&code) {
                    return Err(format!("目标 {} 的状态码 {} 无效", name, code));
                }
            }

            let valid_methods = ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];
            if !valid_methods.contains(&http.method.to_uppercase().as_str()) {
                return Err(format!(
                    "目标 {} 的HTTP方法 {} 无效，支持的方法: {:?}",
                    name, http.method, valid_methods
                ));
            }
        }
        ProbeSpec::Tcp { address } => {
            let valid = address
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(format!("目标 {} 的TCP地址格式无效，应为 host:port", name));
            }
        }
        ProbeSpec::File {
            path,
            max_age_seconds,
        } => {
            if path.as_os_str().is_empty() {
                return Err(format!("目标 {} 的存活文件路径不能为空", name));
            }
            if *max_age_seconds == 0 {
                return Err(format!("目标 {} 的 max_age_seconds 不能为0", name));
            }
        }
        ProbeSpec::Process { pid_file } => {
            if pid_file.as_os_str().is_empty() {
                return Err(format!("目标 {} 的PID文件路径不能为空", name));
            }
        }
        ProbeSpec::Queue { source, .. } => match source {
            QueueSource::Http { url, pointer } => {
                validate_http_url(name, url)?;
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    return Err(format!("目标 {} 的 JSON Pointer 必须以 / 开头", name));
                }
            }
            QueueSource::Directory { path } => {
                if path.as_os_str().is_empty() {
                    return Err(format!("目标 {} 的队列目录不能为空", name));
                }
            }
        },
    }

    Ok(())
}

fn validate_http_url(name: &str, url: &str) -> Result<(), String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!("目标 {} 的URL格式无效", name));
    }
    reqwest::Url::parse(url).map_err(|e| format!("目标 {} 的URL无法解析: {}", name, e))?;
    Ok(())
}

fn validate_action(owner: &str, action: &ActionConfig) -> Result<(), String> {
    match action {
        ActionConfig::Log(log) => {
            if let Some(level) = &log.level {
                let valid_levels = ["trace", "debug", "info", "warn", "error"];
                if !valid_levels.contains(&level.as_str()) {
                    return Err(format!("{} 的日志动作级别 {} 无效", owner, level));
                }
            }
        }
        ActionConfig::Webhook(webhook) => {
            if !webhook.url.starts_with("http://") && !webhook.url.starts_with("https://") {
                return Err(format!("{} 的webhook URL格式无效", owner));
            }
            reqwest::Url::parse(&webhook.url)
                .map_err(|e| format!("{} 的webhook URL无法解析: {}", owner, e))?;
            check_seconds(&format!("{} 的webhook超时", owner), webhook.timeout_seconds)?;
        }
        ActionConfig::Exec(exec) => {
            if exec.command.trim().is_empty() {
                return Err(format!("{} 的exec命令不能为空", owner));
            }
            check_seconds(&format!("{} 的exec超时", owner), exec.timeout_seconds)?;
        }
    }
    Ok(())
}
