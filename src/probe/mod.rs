//! 目标探测模块
//!
//! 所有探测类型实现同一个 [`Probe`] 接口，调度器只通过该接口调用探测，
//! 不关心具体实现。超时和取消由 [`run_probe`] 统一处理。

pub mod file;
pub mod http;
pub mod process;
pub mod queue;
pub mod tcp;

pub use file::FileProbe;
pub use http::HttpProbe;
pub use process::ProcessProbe;
pub use queue::QueueProbe;
pub use tcp::TcpProbe;

use crate::config::{ProbeSpec, QueueSource};
use crate::error::{ConfigError, ProbeError};
use crate::health::cancel::CancelToken;
use crate::health::result::{ProbeOutcome, ProbeResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// 探测接口
#[async_trait]
pub trait Probe: Send + Sync {
    /// 探测类型名称
    fn kind(&self) -> &'static str;

    /// 探测对象的简短描述（URL、地址或路径）
    fn describe(&self) -> String;

    /// 执行一次探测
    ///
    /// # 参数
    /// * `cancel` - 取消令牌，在 I/O 边界检查
    ///
    /// # 返回
    /// * `Ok(ProbeReport)` - 探测完成（目标可能健康也可能不健康）
    /// * `Err(ProbeError)` - 探测机制本身失败
    async fn check(&self, cancel: &CancelToken) -> Result<ProbeReport, ProbeError>;
}

/// 探测实现返回的原始报告
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    /// 目标是否健康
    pub healthy: bool,
    /// 诊断信息
    pub message: Option<String>,
    /// 额外的元数据
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ProbeReport {
    /// 健康报告
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// 不健康报告
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
            metadata: HashMap::new(),
        }
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// 在超时和取消约束下执行一次探测
///
/// 超时或取消时确定地返回 `timeout` 结果，不会挂起调用方。
pub async fn run_probe(
    target: &str,
    probe: &dyn Probe,
    timeout: Duration,
    cancel: &CancelToken,
) -> ProbeResult {
    let start = Instant::now();
    let mut cancelled = cancel.clone();

    let result = tokio::select! {
        biased;
        _ = cancelled.cancelled() => {
            ProbeResult::timeout(target, "探测已取消")
        }
        checked = tokio::time::timeout(timeout, probe.check(cancel)) => match checked {
            Ok(Ok(report)) => {
                let outcome = if report.healthy {
                    ProbeOutcome::Success
                } else {
                    ProbeOutcome::Failure
                };
                let mut result = ProbeResult::new(target, outcome);
                result.message = report.message;
                result.metadata = report.metadata;
                result
            }
            Ok(Err(e)) => ProbeResult::error(target, e.to_string()),
            Err(_) => ProbeResult::timeout(
                target,
                format!("探测超时 ({}ms)", timeout.as_millis()),
            ),
        }
    };

    let result = result.with_latency(start.elapsed());
    debug!(
        "探测完成: {} [{}] {} ({}ms)",
        target,
        probe.kind(),
        result.outcome,
        result.latency_ms()
    );
    result
}

/// 根据配置构建探测实例
#[derive(Debug, Clone)]
pub struct ProbeFactory {
    client: reqwest::Client,
}

impl ProbeFactory {
    /// 创建探测工厂，所有 HTTP 类探测共享一个客户端
    pub fn new() -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("无法创建HTTP客户端: {}", e)))?;
        Ok(Self { client })
    }

    /// 构建探测实例
    pub fn build(&self, spec: &ProbeSpec) -> Result<Arc<dyn Probe>, ConfigError> {
        let probe: Arc<dyn Probe> = match spec {
            ProbeSpec::Http(http) => Arc::new(HttpProbe::new(self.client.clone(), http.clone())),
            ProbeSpec::Tcp { address } => Arc::new(TcpProbe::new(address.clone())),
            ProbeSpec::File {
                path,
                max_age_seconds,
            } => Arc::new(FileProbe::new(
                path.clone(),
                Duration::from_secs(*max_age_seconds),
            )),
            ProbeSpec::Process { pid_file } => Arc::new(ProcessProbe::new(pid_file.clone())),
            ProbeSpec::Queue { max_depth, source } => Arc::new(QueueProbe::new(
                self.client.clone(),
                source.clone(),
                *max_depth,
            )),
        };
        Ok(probe)
    }

    /// 启动时解析目标地址，无法解析时返回配置错误
    pub async fn resolve(&self, target: &str, spec: &ProbeSpec) -> Result<(), ConfigError> {
        let address = match spec {
            ProbeSpec::Http(http) => Some(host_port_of(target, &http.url)?),
            ProbeSpec::Queue {
                source: QueueSource::Http { url, .. },
                ..
            } => Some(host_port_of(target, url)?),
            ProbeSpec::Tcp { address } => Some(address.clone()),
            _ => None,
        };

        let Some(address) = address else {
            return Ok(());
        };

        let unresolvable = || ConfigError::UnresolvableTarget {
            target: target.to_string(),
            address: address.clone(),
        };

        let mut addrs = tokio::net::lookup_host(address.as_str())
            .await
            .map_err(|_| unresolvable())?;
        if addrs.next().is_none() {
            return Err(unresolvable());
        }

        debug!("目标地址解析成功: {} -> {}", target, address);
        Ok(())
    }
}

fn host_port_of(target: &str, url: &str) -> Result<String, ConfigError> {
    let unresolvable = || ConfigError::UnresolvableTarget {
        target: target.to_string(),
        address: url.to_string(),
    };
    let parsed = reqwest::Url::parse(url).map_err(|_| unresolvable())?;
    let host = parsed.host_str().ok_or_else(unresolvable)?;
    let port = parsed.port_or_known_default().ok_or_else(unresolvable)?;
    // IPv6 字面量需要方括号
    if host.contains(':') && !host.starts_with('[') {
        Ok(format!("[{}]:{}", host, port))
    } else {
        Ok(format!("{}:{}", host, port))
    }
}
