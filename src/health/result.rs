//! 探测结果数据结构
//!
//! 定义探测结果、健康状态和状态迁移事件

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// 单次探测的结果类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// 探测通过
    Success,
    /// 目标不健康
    Failure,
    /// 探测超时或被取消
    Timeout,
    /// 探测机制本身出错（例如参数错误）
    Error,
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProbeOutcome::Success => "success",
            ProbeOutcome::Failure => "failure",
            ProbeOutcome::Timeout => "timeout",
            ProbeOutcome::Error => "error",
        };
        f.write_str(s)
    }
}

impl ProbeOutcome {
    /// 是否计为成功
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success)
    }
}

/// 目标健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// 健康
    Healthy,
    /// 降级（失败路径上的中间告警状态）
    Degraded,
    /// 故障
    Failed,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "健康"),
            HealthState::Degraded => write!(f, "降级"),
            HealthState::Failed => write!(f, "故障"),
        }
    }
}

impl HealthState {
    /// 英文标识，用于环境变量和日志字段
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Failed => "failed",
        }
    }

    /// 判断状态是否需要告警
    pub fn needs_alert(&self) -> bool {
        matches!(self, HealthState::Degraded | HealthState::Failed)
    }
}

impl std::str::FromStr for HealthState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "healthy" => Ok(HealthState::Healthy),
            "degraded" => Ok(HealthState::Degraded),
            "failed" => Ok(HealthState::Failed),
            other => Err(format!("未知的健康状态: {}", other)),
        }
    }
}

/// 探测结果，每次探测产生一次
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// 结果ID
    pub id: Uuid,
    /// 目标名称
    pub target: String,
    /// 结果类型
    pub outcome: ProbeOutcome,
    /// 探测耗时
    #[serde(with = "duration_serde", rename = "latency_ms")]
    pub latency: Duration,
    /// 诊断信息
    pub message: Option<String>,
    /// 探测时间戳
    pub timestamp: DateTime<Utc>,
    /// 额外的元数据
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ProbeResult {
    /// 创建新的探测结果
    ///
    /// # 参数
    /// * `target` - 目标名称
    /// * `outcome` - 结果类型
    ///
    /// # 返回
    /// * `Self` - 探测结果实例
    pub fn new(target: impl Into<String>, outcome: ProbeOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            outcome,
            latency: Duration::ZERO,
            message: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// 成功结果
    pub fn success(target: impl Into<String>) -> Self {
        Self::new(target, ProbeOutcome::Success)
    }

    /// 失败结果
    pub fn failure(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(target, ProbeOutcome::Failure).with_message(message)
    }

    /// 超时结果
    pub fn timeout(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(target, ProbeOutcome::Timeout).with_message(message)
    }

    /// 探测机制错误结果
    pub fn error(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(target, ProbeOutcome::Error).with_message(message)
    }

    /// 设置探测耗时
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 设置诊断信息
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// 获取耗时（毫秒）
    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }
}

/// 状态迁移事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// 事件ID
    pub id: Uuid,
    /// 目标名称
    pub target: String,
    /// 迁移前的状态，首次分类时为空
    pub previous: Option<HealthState>,
    /// 迁移后的状态
    pub current: HealthState,
    /// 迁移时间
    pub timestamp: DateTime<Utc>,
    /// 触发迁移的探测结果
    pub trigger: ProbeResult,
}

impl TransitionEvent {
    /// 创建迁移事件
    pub fn new(previous: Option<HealthState>, current: HealthState, trigger: ProbeResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: trigger.target.clone(),
            previous,
            current,
            timestamp: Utc::now(),
            trigger,
        }
    }

    /// 是否为恢复事件
    pub fn is_recovery(&self) -> bool {
        self.current == HealthState::Healthy
    }

    /// 迁移前状态的文本表示
    pub fn previous_label(&self) -> &'static str {
        self.previous.map(|s| s.as_str()).unwrap_or("none")
    }

    /// 转换为JSON字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Duration序列化模块
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_result_builder() {
        let result = ProbeResult::failure("api", "HTTP 503 Service Unavailable")
            .with_latency(Duration::from_millis(120))
            .with_metadata("status_code", serde_json::json!(503));

        assert_eq!(result.target, "api");
        assert_eq!(result.outcome, ProbeOutcome::Failure);
        assert_eq!(result.latency_ms(), 120);
        assert_eq!(result.message.as_deref(), Some("HTTP 503 Service Unavailable"));
        assert_eq!(result.metadata["status_code"], 503);
    }

    #[test]
    fn test_probe_result_serialization() {
        let result = ProbeResult::timeout("db", "探测超时").with_latency(Duration::from_secs(5));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["outcome"], "timeout");
        assert_eq!(json["latency_ms"], 5000);
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_health_state_display_and_parse() {
        assert_eq!(HealthState::Degraded.to_string(), "降级");
        assert_eq!(HealthState::Failed.as_str(), "failed");
        assert_eq!("Healthy".parse::<HealthState>().unwrap(), HealthState::Healthy);
        assert!("broken".parse::<HealthState>().is_err());
        assert!(HealthState::Failed.needs_alert());
        assert!(!HealthState::Healthy.needs_alert());
    }

    #[test]
    fn test_transition_event() {
        let trigger = ProbeResult::success("api");
        let event = TransitionEvent::new(Some(HealthState::Failed), HealthState::Healthy, trigger);

        assert_eq!(event.target, "api");
        assert!(event.is_recovery());
        assert_eq!(event.previous_label(), "failed");

        let initial = TransitionEvent::new(None, HealthState::Degraded, ProbeResult::error("api", "x"));
        assert_eq!(initial.previous_label(), "none");
        assert!(initial.to_json().unwrap().contains("\"degraded\""));
    }
}
