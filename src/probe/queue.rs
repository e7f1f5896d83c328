//! 队列深度探测
//!
//! 深度来自HTTP JSON接口中的某个字段，或者是spool目录中的条目数。
//! 深度不超过上限即为健康。

use crate::config::QueueSource;
use crate::error::ProbeError;
use crate::health::cancel::CancelToken;
use crate::probe::http::format_request_error;
use crate::probe::{Probe, ProbeReport};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;

/// 队列深度探测实现
pub struct QueueProbe {
    client: Client,
    source: QueueSource,
    max_depth: u64,
}

/// 读取深度的中间结果
enum Depth {
    Known(u64),
    Unreachable(String),
}

impl QueueProbe {
    pub fn new(client: Client, source: QueueSource, max_depth: u64) -> Self {
        Self {
            client,
            source,
            max_depth,
        }
    }

    async fn read_http_depth(&self, url: &str, pointer: &str) -> Result<Depth, ProbeError> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Ok(Depth::Unreachable(format_request_error(&e))),
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(Depth::Unreachable(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProbeError::MalformedResponse(format!("响应不是有效的JSON: {}", e)))?;

        let value = body.pointer(pointer).ok_or_else(|| {
            ProbeError::MalformedResponse(format!("JSON Pointer {} 不存在", pointer))
        })?;

        let depth = value
            .as_u64()
            .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .ok_or_else(|| {
                ProbeError::MalformedResponse(format!("JSON Pointer {} 的值不是数字: {}", pointer, value))
            })?;

        Ok(Depth::Known(depth))
    }

    async fn read_directory_depth(path: &Path, cancel: &CancelToken) -> Result<Depth, ProbeError> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut depth = 0u64;
        while let Some(_entry) = entries.next_entry().await? {
            if cancel.is_cancelled() {
                return Err(ProbeError::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "探测已取消",
                )));
            }
            depth += 1;
        }
        Ok(Depth::Known(depth))
    }
}

#[async_trait]
impl Probe for QueueProbe {
    fn kind(&self) -> &'static str {
        "queue"
    }

    fn describe(&self) -> String {
        match &self.source {
            QueueSource::Http { url, pointer } => format!("{}#{}", url, pointer),
            QueueSource::Directory { path } => path.display().to_string(),
        }
    }

    async fn check(&self, cancel: &CancelToken) -> Result<ProbeReport, ProbeError> {
        let depth = match &self.source {
            QueueSource::Http { url, pointer } => self.read_http_depth(url, pointer).await?,
            QueueSource::Directory { path } => Self::read_directory_depth(path, cancel).await?,
        };

        let depth = match depth {
            Depth::Known(depth) => depth,
            Depth::Unreachable(message) => {
                return Ok(ProbeReport::unhealthy(format!("队列深度接口不可达: {}", message)))
            }
        };

        let report = if depth > self.max_depth {
            ProbeReport::unhealthy(format!("队列深度 {} 超过上限 {}", depth, self.max_depth))
        } else {
            ProbeReport::healthy()
        };

        Ok(report
            .with_metadata("depth", serde_json::json!(depth))
            .with_metadata("max_depth", serde_json::json!(self.max_depth)))
    }
}
