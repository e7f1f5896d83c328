//! HTTP可达性探测
//!
//! 支持多种HTTP方法、自定义请求头和JSON请求体，按期望状态码判定健康

use crate::config::HttpProbeSpec;
use crate::error::ProbeError;
use crate::health::cancel::CancelToken;
use crate::probe::{Probe, ProbeReport};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::str::FromStr;

/// HTTP探测实现
pub struct HttpProbe {
    client: Client,
    spec: HttpProbeSpec,
}

impl HttpProbe {
    /// 创建新的HTTP探测
    pub fn new(client: Client, spec: HttpProbeSpec) -> Self {
        Self { client, spec }
    }

    /// 构建HTTP请求
    fn build_request(&self) -> Result<reqwest::RequestBuilder, ProbeError> {
        let method = Method::from_str(&self.spec.method.to_uppercase())
            .map_err(|_| ProbeError::InvalidParameters(format!("无效的HTTP方法: {}", self.spec.method)))?;

        let mut request = self.client.request(method, &self.spec.url);

        for (key, value) in &self.spec.headers {
            request = request.header(key, value);
        }

        if let Some(body) = &self.spec.body {
            request = request.json(body);
        }

        Ok(request)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn describe(&self) -> String {
        format!("{} {}", self.spec.method.to_uppercase(), self.spec.url)
    }

    async fn check(&self, _cancel: &CancelToken) -> Result<ProbeReport, ProbeError> {
        let request = self.build_request()?;

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Ok(ProbeReport::unhealthy(format_request_error(&e))),
        };

        let status = response.status();
        let status_code = status.as_u16();

        let mut report = if self.spec.expected_status_codes.contains(&status_code) {
            ProbeReport::healthy()
        } else {
            ProbeReport::unhealthy(format!(
                "HTTP {} {}",
                status_code,
                status.canonical_reason().unwrap_or("Unknown")
            ))
        };
        report = report.with_metadata("status_code", serde_json::json!(status_code));

        if let Some(server) = response
            .headers()
            .get("server")
            .and_then(|v| v.to_str().ok())
        {
            report = report.with_metadata("server", serde_json::json!(server));
        }

        Ok(report)
    }
}

/// 格式化请求错误信息，使其更加清晰易读
pub(crate) fn format_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        let error_str = format!("{:?}", error);
        if error_str.contains("dns") || error_str.contains("DNS") {
            "DNS resolution failed".to_string()
        } else if error_str.contains("certificate") || error_str.contains("tls") {
            "SSL/TLS certificate error".to_string()
        } else {
            "Connection refused".to_string()
        }
    } else if let Some(status) = error.status() {
        format!(
            "HTTP {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        )
    } else if error.is_decode() {
        "Response decode error".to_string()
    } else if error.is_request() {
        "Invalid request".to_string()
    } else {
        format!("Request failed: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn spec(url: String, method: &str) -> HttpProbeSpec {
        HttpProbeSpec {
            url,
            method: method.to_string(),
            expected_status_codes: vec![200],
            headers: HashMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_http_probe_healthy() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("server", "mock")
            .create_async()
            .await;

        let probe = HttpProbe::new(Client::new(), spec(format!("{}/health", server.url()), "get"));
        let report = probe.check(&CancelToken::never()).await.unwrap();

        mock.assert_async().await;
        assert!(report.healthy);
        assert_eq!(report.metadata["status_code"], 200);
        assert_eq!(report.metadata["server"], "mock");
    }

    #[tokio::test]
    async fn test_http_probe_unexpected_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(503)
            .create_async()
            .await;

        let probe = HttpProbe::new(Client::new(), spec(format!("{}/health", server.url()), "GET"));
        let report = probe.check(&CancelToken::never()).await.unwrap();

        assert!(!report.healthy);
        assert_eq!(report.message.as_deref(), Some("HTTP 503 Service Unavailable"));
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused_is_unhealthy() {
        let probe = HttpProbe::new(Client::new(), spec("http://127.0.0.1:1/health".to_string(), "GET"));
        let report = probe.check(&CancelToken::never()).await.unwrap();

        assert!(!report.healthy);
        assert!(report.message.is_some());
    }

    #[tokio::test]
    async fn test_http_probe_invalid_method_is_probe_error() {
        let probe = HttpProbe::new(Client::new(), spec("http://127.0.0.1:1/".to_string(), "BAD METHOD"));
        let err = probe.check(&CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, ProbeError::InvalidParameters(_)));
    }
}
