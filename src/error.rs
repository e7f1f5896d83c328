//! 错误处理模块
//!
//! 定义应用程序的统一错误类型。只有配置错误是致命的，
//! 其余错误都在各自组件边界被吸收并转化为状态或日志信号。

use thiserror::Error;

/// Watchdog 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum WatchdogError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探测机制错误
    #[error("探测错误: {0}")]
    Probe(#[from] ProbeError),

    /// 动作分发错误
    #[error("动作分发错误: {0}")]
    Dispatch(#[from] DispatchError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl WatchdogError {
    /// 是否为致命错误（进程必须以非零退出码结束）
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatchdogError::Config(_))
    }
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },

    /// 目标地址无法解析
    #[error("目标 {target} 的地址无法解析: {address}")]
    UnresolvableTarget { target: String, address: String },

    /// 目标名称重复
    #[error("目标已注册: {0}")]
    DuplicateTarget(String),
}

/// 探测机制错误类型（探测本身执行失败，而非目标不健康）
#[derive(Error, Debug)]
pub enum ProbeError {
    /// 探测参数无效
    #[error("探测参数无效: {0}")]
    InvalidParameters(String),

    /// HTTP请求错误
    #[error("HTTP请求失败: {0}")]
    Request(#[from] reqwest::Error),

    /// IO错误
    #[error("探测IO失败: {0}")]
    Io(#[from] std::io::Error),

    /// 响应格式不符合预期
    #[error("响应格式错误: {0}")]
    MalformedResponse(String),

    /// 当前平台不支持
    #[error("当前平台不支持: {0}")]
    Unsupported(String),
}

/// 动作分发错误类型
#[derive(Error, Debug)]
pub enum DispatchError {
    /// 发送失败
    #[error("通知发送失败: {0}")]
    SendError(String),

    /// 远端返回非成功状态码
    #[error("远端返回错误状态: {status}")]
    HttpStatus { status: u16 },

    /// 命令执行失败
    #[error("命令执行失败: {command} (退出码: {code:?})")]
    CommandFailed { command: String, code: Option<i32> },

    /// 动作执行超时
    #[error("动作执行超时 ({0} 秒)")]
    Timeout(u64),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// IO错误
    #[error("动作IO失败: {0}")]
    Io(#[from] std::io::Error),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, WatchdogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        let config_error: WatchdogError = ConfigError::ValidationError("x".to_string()).into();
        assert!(config_error.is_fatal());

        let probe_error: WatchdogError = ProbeError::InvalidParameters("x".to_string()).into();
        assert!(!probe_error.is_fatal());

        let dispatch_error: WatchdogError = DispatchError::Timeout(5).into();
        assert!(!dispatch_error.is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let error = ConfigError::UnresolvableTarget {
            target: "db".to_string(),
            address: "nowhere:5432".to_string(),
        };
        assert!(error.to_string().contains("nowhere:5432"));

        let error = DispatchError::CommandFailed {
            command: "restart.sh".to_string(),
            code: Some(3),
        };
        assert!(error.to_string().contains("restart.sh"));
    }
}
